//! Line protocol specs
//!
//! Malformed or unexpected requests are answered with an error and the
//! connection is closed.

use crate::prelude::*;

#[tokio::test]
async fn unknown_command_is_rejected_and_closed() {
    let coordinator = Coordinator::start().await;
    let mut a = coordinator.connect().await;

    a.send("foo bar").await;
    a.expect("err: unknown message").await;
    a.expect_closed().await;
}

#[tokio::test]
async fn lock_without_resource_is_rejected() {
    let coordinator = Coordinator::start().await;
    let mut a = coordinator.connect().await;

    a.send("lock").await;
    a.expect("err: unknown message").await;
    a.expect_closed().await;
}

#[tokio::test]
async fn rejected_holder_releases_its_lock() {
    let coordinator = Coordinator::start().await;
    let mut a = coordinator.connect().await;
    let mut b = coordinator.connect().await;

    a.send("lock X").await;
    a.expect("ok X").await;
    b.send("lock X").await;
    b.expect("wait X").await;

    a.send("nonsense").await;
    a.expect("err: unknown message").await;

    b.expect("ok X").await;
}

#[tokio::test]
async fn second_resource_on_one_connection_is_rejected() {
    let coordinator = Coordinator::start().await;
    let mut a = coordinator.connect().await;

    a.send("lock X").await;
    a.expect("ok X").await;
    a.send("lock Y").await;
    a.expect("err: already queued for X").await;
    a.expect_closed().await;

    eventually(|| coordinator.queue_len("X") == 0).await;
    assert!(coordinator.registry().get("Y").is_none());
}

#[tokio::test]
async fn blank_lines_are_ignored() {
    let coordinator = Coordinator::start().await;
    let mut a = coordinator.connect().await;

    a.send_raw("\n\n  \nlock X\n").await;
    a.expect("ok X").await;
}

#[tokio::test]
async fn surrounding_whitespace_and_crlf_are_tolerated() {
    let coordinator = Coordinator::start().await;
    let mut a = coordinator.connect().await;

    a.send_raw("  lock   X \r\n").await;
    a.expect("ok X").await;
}

#[tokio::test]
async fn commands_in_one_packet_are_handled_in_order() {
    let coordinator = Coordinator::start().await;
    let mut a = coordinator.connect().await;

    a.send_raw("lock X\nunlock\nlock Y\n").await;

    a.expect("ok X").await;
    a.expect("released X").await;
    a.expect_closed().await;
    assert!(coordinator.registry().get("Y").is_none());
}
