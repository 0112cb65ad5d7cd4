// tests/integration/multiplexer_test.rs

//! End-to-end tests of the backend worker against a scripted fake backend.

use super::test_helpers::{FakeBackend, STEP_TIMEOUT, TestProxy};
use searchmux::core::{ConnectionState, MuxError, ResultRow, SearchOutcome, SnippetOutcome};
use std::time::Duration;

#[tokio::test]
async fn test_commands_wait_for_greeting() {
    let backend = FakeBackend::bind().await;
    let proxy = TestProxy::start(backend.config());
    let mut conn = backend.accept().await;
    proxy.wait_for_state(ConnectionState::HandshakePending).await;

    let client = proxy.client.clone();
    let search = tokio::spawn(async move { client.search("needle").await });

    conn.expect_silence(Duration::from_millis(100)).await;
    conn.send("Welcome to the search server").await;
    assert_eq!(conn.expect_command().await, "search needle");
    conn.send_lines(&["OK:1", "[0] hay/stack.txt | matches=1"]).await;

    let outcome = search.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        SearchOutcome::Results(vec![ResultRow::Parsed {
            index: 0,
            path: "hay/stack.txt".to_string(),
            matches: 1
        }])
    );
    proxy.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_requests_are_single_flight() {
    let backend = FakeBackend::bind().await;
    let proxy = TestProxy::start(backend.config());
    let mut conn = backend.accept_ready().await;
    proxy.wait_for_state(ConnectionState::Ready).await;

    let mut tasks = Vec::new();
    for word in ["alpha", "beta", "gamma", "delta"] {
        let client = proxy.client.clone();
        tasks.push(tokio::spawn(async move {
            (word, client.search(word).await)
        }));
    }

    for _ in 0..4 {
        let command = conn.expect_command().await;
        let word = command
            .strip_prefix("search ")
            .expect("Unexpected command")
            .to_string();
        // No second command may arrive while this one is unanswered.
        conn.expect_silence(Duration::from_millis(50)).await;
        conn.send_lines(&["OK:1", &format!("[0] {word}.txt | matches=2")])
            .await;
    }

    for task in tasks {
        let (word, outcome) = task.await.unwrap();
        assert_eq!(
            outcome.unwrap(),
            SearchOutcome::Results(vec![ResultRow::Parsed {
                index: 0,
                path: format!("{word}.txt"),
                matches: 2
            }])
        );
    }
    proxy.shutdown().await;
}

#[tokio::test]
async fn test_response_split_across_segments() {
    let backend = FakeBackend::bind().await;
    let proxy = TestProxy::start(backend.config());
    let mut conn = backend.accept_ready().await;

    let client = proxy.client.clone();
    let lookup = tokio::spawn(async move { client.get_snippets(4).await });
    assert_eq!(conn.expect_command().await, "getsnippet 4");

    for chunk in [&b"SNIPPETS_"[..], b"FOUND:2\r", b"\nfirst sn", b"ippet;second\n"] {
        conn.send_raw(chunk).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(
        lookup.await.unwrap().unwrap(),
        SnippetOutcome::Snippets(vec!["first snippet".to_string(), "second".to_string()])
    );
    proxy.shutdown().await;
}

#[tokio::test]
async fn test_not_found_snippets_are_empty() {
    let backend = FakeBackend::bind().await;
    let proxy = TestProxy::start(backend.config());
    let mut conn = backend.accept_ready().await;

    let client = proxy.client.clone();
    let lookup = tokio::spawn(async move { client.get_snippets(1).await });
    assert_eq!(conn.expect_command().await, "getsnippet 1");
    conn.send("NOT_FOUND").await;

    assert_eq!(
        lookup.await.unwrap().unwrap(),
        SnippetOutcome::Snippets(vec![])
    );
    proxy.shutdown().await;
}

#[tokio::test]
async fn test_backend_error_does_not_affect_next_command() {
    let backend = FakeBackend::bind().await;
    let proxy = TestProxy::start(backend.config());
    let mut conn = backend.accept_ready().await;
    proxy.wait_for_state(ConnectionState::Ready).await;

    let client = proxy.client.clone();
    let first = tokio::spawn(async move { client.get_snippets(99).await });
    assert_eq!(conn.expect_command().await, "getsnippet 99");

    let client = proxy.client.clone();
    let second = tokio::spawn(async move { client.search("ok").await });
    conn.send("ERROR_INVALID_INDEX").await;

    assert_eq!(
        first.await.unwrap(),
        Err(MuxError::Backend("ERROR_INVALID_INDEX".to_string()))
    );
    assert_eq!(conn.expect_command().await, "search ok");
    conn.send("OK:0").await;
    assert_eq!(second.await.unwrap().unwrap(), SearchOutcome::Results(vec![]));
    proxy.shutdown().await;
}

#[tokio::test]
async fn test_busy_greeting_answers_busy_until_welcome() {
    let backend = FakeBackend::bind().await;
    let proxy = TestProxy::start(backend.config());
    let mut conn = backend.accept().await;
    conn.send("SERVER_BUSY").await;
    proxy.wait_for_state(ConnectionState::Busy).await;

    assert_eq!(proxy.client.search("x").await.unwrap(), SearchOutcome::Busy);
    assert_eq!(
        proxy.client.get_snippets(0).await.unwrap(),
        SnippetOutcome::Busy
    );
    conn.expect_silence(Duration::from_millis(50)).await;

    conn.send("Welcome, a slot is now free").await;
    proxy.wait_for_state(ConnectionState::Ready).await;

    let client = proxy.client.clone();
    let search = tokio::spawn(async move { client.search("y").await });
    assert_eq!(conn.expect_command().await, "search y");
    conn.send("SERVER_BUSY").await;
    assert_eq!(search.await.unwrap().unwrap(), SearchOutcome::Busy);
    proxy.shutdown().await;
}

#[tokio::test]
async fn test_connection_loss_fails_outstanding_and_reconnects() {
    let backend = FakeBackend::bind().await;
    let proxy = TestProxy::start(backend.config());
    let mut conn = backend.accept_ready().await;

    let client = proxy.client.clone();
    let doomed = tokio::spawn(async move { client.search("lost").await });
    assert_eq!(conn.expect_command().await, "search lost");
    drop(conn);

    let err = doomed.await.unwrap().unwrap_err();
    assert!(err.is_connection_failure(), "unexpected error: {err:?}");

    let client = proxy.client.clone();
    let retried = tokio::spawn(async move { client.search("again").await });
    let mut conn = backend.accept_ready().await;
    assert_eq!(conn.expect_command().await, "search again");
    conn.send("NOT_FOUND").await;
    assert_eq!(retried.await.unwrap().unwrap(), SearchOutcome::Results(vec![]));
    proxy.shutdown().await;
}

#[tokio::test]
async fn test_command_timeout_resets_connection() {
    let backend = FakeBackend::bind().await;
    let mut config = backend.config();
    config.command_timeout = Some(Duration::from_millis(200));
    let proxy = TestProxy::start(config);
    let mut conn = backend.accept_ready().await;

    let client = proxy.client.clone();
    let slow = tokio::spawn(async move { client.search("slow").await });
    assert_eq!(conn.expect_command().await, "search slow");

    assert_eq!(
        slow.await.unwrap(),
        Err(MuxError::Timeout(Duration::from_millis(200)))
    );
    conn.expect_closed().await;

    // A late reply on the old connection can no longer be misattributed.
    let mut conn = backend.accept_ready().await;
    proxy.wait_for_state(ConnectionState::Ready).await;
    let client = proxy.client.clone();
    let next = tokio::spawn(async move { client.search("fast").await });
    assert_eq!(conn.expect_command().await, "search fast");
    conn.send("OK:0").await;
    assert_eq!(next.await.unwrap().unwrap(), SearchOutcome::Results(vec![]));
    proxy.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_disabled_fails_everything_after_loss() {
    let backend = FakeBackend::bind().await;
    let mut config = backend.config();
    config.reconnect = false;
    let proxy = TestProxy::start(config);
    let conn = backend.accept_ready().await;
    proxy.wait_for_state(ConnectionState::Ready).await;
    drop(conn);
    proxy.wait_for_state(ConnectionState::Disconnected).await;

    let err = tokio::time::timeout(STEP_TIMEOUT, proxy.client.search("late"))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, MuxError::Connection(_)));
    proxy.shutdown().await;
}

#[tokio::test]
async fn test_cancel_queued_command() {
    let backend = FakeBackend::bind().await;
    let proxy = TestProxy::start(backend.config());
    let mut conn = backend.accept_ready().await;
    proxy.wait_for_state(ConnectionState::Ready).await;

    let handle = proxy.handle().clone();
    assert!(!handle.is_closed());
    let first = handle.submit("search one").await.unwrap();
    let second = handle.submit("search two").await.unwrap();
    let third = handle.submit("search three").await.unwrap();
    assert_eq!(conn.expect_command().await, "search one");

    assert!(handle.cancel(second.id()).await);
    assert!(!handle.cancel(first.id()).await);
    assert_eq!(second.await, Err(MuxError::Cancelled));

    conn.send("OK:0").await;
    assert!(first.await.is_ok());
    assert_eq!(conn.expect_command().await, "search three");
    conn.send("NOT_FOUND").await;
    assert!(third.await.is_ok());
    proxy.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_fails_pending_commands() {
    let backend = FakeBackend::bind().await;
    let proxy = TestProxy::start(backend.config());
    let _conn = backend.accept().await;
    proxy.wait_for_state(ConnectionState::HandshakePending).await;

    let pending = proxy.handle().submit("search never").await.unwrap();
    let handle = proxy.handle().clone();
    proxy.shutdown().await;

    assert_eq!(pending.await, Err(MuxError::Closed));
    assert_eq!(handle.state(), ConnectionState::Disconnected);
    assert!(handle.is_closed());
    assert!(matches!(
        handle.submit("search after").await,
        Err(MuxError::Closed)
    ));
}
