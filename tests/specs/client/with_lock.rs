//! Client `with_lock` specs against a live coordinator

use std::sync::{Arc, Mutex};

use crate::prelude::*;
use crate::prelude::assert_eq;

#[tokio::test]
async fn runs_work_and_leaves_no_trace() {
    let coordinator = Coordinator::start().await;
    let client = coordinator.client();

    let value = client
        .with_lock("db", Duration::from_secs(5), || async { "done" })
        .await
        .unwrap();

    assert_eq!(value, "done");
    eventually(|| coordinator.queue_len("db") == 0).await;
}

#[tokio::test]
async fn waits_for_a_raw_holder() {
    let coordinator = Coordinator::start().await;
    let mut holder = coordinator.connect().await;
    holder.send("lock db").await;
    holder.expect("ok db").await;

    let client = coordinator.client();
    let work = tokio::spawn(async move {
        client
            .with_lock("db", Duration::from_secs(5), || async { "ran" })
            .await
    });

    eventually(|| coordinator.queue_len("db") == 2).await;
    assert!(!work.is_finished());

    holder.send("unlock").await;
    holder.expect("released db").await;

    assert_eq!(work.await.unwrap().unwrap(), "ran");
}

#[tokio::test]
async fn concurrent_work_on_one_resource_never_overlaps() {
    let coordinator = Coordinator::start().await;
    let inside = Arc::new(Mutex::new(0usize));
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut tasks = Vec::new();
    for n in 0..5 {
        let client = coordinator.client();
        let inside = Arc::clone(&inside);
        let order = Arc::clone(&order);
        tasks.push(tokio::spawn(async move {
            client
                .with_lock("shared", Duration::from_secs(10), || async move {
                    {
                        let mut count = inside.lock().unwrap();
                        *count += 1;
                        assert_eq!(*count, 1, "two holders at once");
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    order.lock().unwrap().push(n);
                    *inside.lock().unwrap() -= 1;
                })
                .await
        }));
    }

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(order.lock().unwrap().len(), 5);
    eventually(|| coordinator.queue_len("shared") == 0).await;
}

#[tokio::test]
async fn work_timeout_releases_the_lock() {
    let coordinator = Coordinator::start().await;
    let client = coordinator.client();

    let err = client
        .with_lock("db", Duration::from_millis(50), || {
            tokio::time::sleep(Duration::from_secs(30))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::WorkTimeout { .. }));

    let mut next = coordinator.connect().await;
    next.send("lock db").await;
    next.expect("ok db").await;
}

#[tokio::test]
async fn empty_resource_needs_no_coordinator() {
    let coordinator = Coordinator::start().await;
    let client = coordinator.client();
    coordinator.stop().await;

    let value = client
        .with_lock("", Duration::from_secs(5), || async { 7 })
        .await
        .unwrap();

    assert_eq!(value, 7);
}

#[tokio::test]
async fn unreachable_coordinator_is_an_io_error() {
    let coordinator = Coordinator::start().await;
    let client = coordinator.client();
    coordinator.stop().await;

    let err = client
        .with_lock("db", Duration::from_secs(5), || async {})
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Io(_)));
}
