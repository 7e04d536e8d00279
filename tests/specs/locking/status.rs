//! Status listing specs

use crate::prelude::*;
use crate::prelude::assert_eq;

#[tokio::test]
async fn idle_coordinator_lists_nothing() {
    let coordinator = Coordinator::start().await;

    assert_eq!(coordinator.status().await, Vec::<String>::new());
}

#[tokio::test]
async fn lists_holder_then_waiters_by_address() {
    let coordinator = Coordinator::start().await;
    let mut a = coordinator.connect().await;
    let mut b = coordinator.connect().await;

    a.send("lock X").await;
    a.expect("ok X").await;
    b.send("lock X").await;
    b.expect("wait X").await;

    assert_eq!(
        coordinator.status().await,
        vec![
            "Resource: X (2 connections waiting)".to_string(),
            format!("{}, {}", a.addr(), b.addr()),
        ]
    );
}

#[tokio::test]
async fn lists_resources_in_creation_order_and_skips_empty_queues() {
    let coordinator = Coordinator::start().await;
    let mut a = coordinator.connect().await;
    let mut b = coordinator.connect().await;
    let mut c = coordinator.connect().await;

    a.send("lock first").await;
    a.expect("ok first").await;
    b.send("lock second").await;
    b.expect("ok second").await;
    c.send("lock third").await;
    c.expect("ok third").await;

    b.send("unlock").await;
    b.expect("released second").await;
    eventually(|| coordinator.queue_len("second") == 0).await;

    assert_eq!(
        coordinator.status().await,
        vec![
            "Resource: first (1 connections waiting)".to_string(),
            a.addr().to_string(),
            "Resource: third (1 connections waiting)".to_string(),
            c.addr().to_string(),
        ]
    );
}

#[tokio::test]
async fn status_does_not_disturb_queues() {
    let coordinator = Coordinator::start().await;
    let mut a = coordinator.connect().await;

    a.send("lock X").await;
    a.expect("ok X").await;

    coordinator.status().await;
    coordinator.status().await;

    assert_eq!(coordinator.queue_len("X"), 1);
    a.expect_silent().await;
}

#[tokio::test]
async fn client_parses_status() {
    let coordinator = Coordinator::start().await;
    let mut a = coordinator.connect().await;
    let mut b = coordinator.connect().await;

    a.send("lock db").await;
    a.expect("ok db").await;
    b.send("lock db").await;
    b.expect("wait db").await;

    let entries = coordinator.client().status().await.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "db");
    assert_eq!(entries[0].holder(), Some(a.addr()));
    assert_eq!(entries[0].waiters, vec![a.addr().to_string(), b.addr().to_string()]);
}
