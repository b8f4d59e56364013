use crate::support::{spawn_imap, FakeConnectedHandler, FakeRealm};
use std::sync::Arc;

#[tokio::test]
async fn greeting_login_select_and_logout() {
    let connected = Arc::new(FakeConnectedHandler::new());
    let realm = Arc::new(FakeRealm::single("alice", "secret"));
    let mut client = spawn_imap(connected, realm).await;

    let greeting = client.recv_line().await;
    assert!(greeting.starts_with("* OK ["), "unexpected greeting: {greeting}");

    client.send("a1 LOGIN alice secret").await;
    assert_eq!(client.recv_line().await, "a1 OK LOGIN completed");

    client.send("a2 SELECT INBOX").await;
    let (untagged, tagged) = client.recv_until_tagged("a2").await;
    assert!(untagged.iter().any(|l| l.starts_with("FLAGS (")), "missing FLAGS line: {untagged:?}");
    assert!(untagged.contains(&"0 EXISTS".to_string()));
    assert!(untagged.contains(&"0 RECENT".to_string()));
    assert_eq!(tagged, "a2 OK [READ-WRITE] SELECT completed");

    client.send("a3 LOGOUT").await;
    let (untagged, tagged) = client.recv_until_tagged("a3").await;
    assert_eq!(untagged, vec!["BYE logging out".to_string()]);
    assert_eq!(tagged, "a3 OK LOGOUT completed");
}

#[tokio::test]
async fn login_with_wrong_password_is_rejected() {
    let connected = Arc::new(FakeConnectedHandler::new());
    let realm = Arc::new(FakeRealm::single("alice", "secret"));
    let mut client = spawn_imap(connected, realm).await;
    let _ = client.recv_line().await;

    client.send("a1 LOGIN alice wrong").await;
    assert_eq!(client.recv_line().await, "a1 NO LOGIN failed");
}

#[tokio::test]
async fn select_is_rejected_before_authentication() {
    let connected = Arc::new(FakeConnectedHandler::new());
    let realm = Arc::new(FakeRealm::single("alice", "secret"));
    let mut client = spawn_imap(connected, realm).await;
    let _ = client.recv_line().await;

    client.send("a1 SELECT INBOX").await;
    let line = client.recv_line().await;
    assert!(line.starts_with("a1 BAD"), "unexpected reply: {line}");
}

#[tokio::test]
async fn list_and_status_reflect_mailbox_state() {
    let connected = Arc::new(FakeConnectedHandler::new());
    let realm = Arc::new(FakeRealm::single("alice", "secret"));
    let mut client = spawn_imap(connected, realm).await;
    let _ = client.recv_line().await;
    client.send("a1 LOGIN alice secret").await;
    assert_eq!(client.recv_line().await, "a1 OK LOGIN completed");

    client.send("a2 LIST \"\" \"*\"").await;
    let (untagged, tagged) = client.recv_until_tagged("a2").await;
    assert_eq!(untagged, vec!["LIST () \"/\" \"INBOX\"".to_string()]);
    assert_eq!(tagged, "a2 OK LIST completed");

    client.send("a3 STATUS INBOX (MESSAGES)").await;
    let (untagged, tagged) = client.recv_until_tagged("a3").await;
    assert_eq!(untagged, vec!["STATUS INBOX (MESSAGES 0)".to_string()]);
    assert_eq!(tagged, "a3 OK STATUS completed");
}
