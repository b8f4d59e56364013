use crate::support::{build_test_tls, spawn_imap_with, upgrade_client_tls, FakeConnectedHandler, FakeRealm};
use protocol_server_core::imap::ImapServerConfig;
use std::sync::Arc;

#[tokio::test]
async fn plaintext_login_is_disabled_until_starttls_upgrades_the_connection() {
    let (acceptor, client_config) = build_test_tls();
    let connected = Arc::new(FakeConnectedHandler::new());
    let realm = Arc::new(FakeRealm::single("alice", "secret"));
    let config = ImapServerConfig::default();
    let mut client = spawn_imap_with(connected, realm, config, Some(acceptor)).await;
    let _ = client.recv_line().await;

    client.send("a1 LOGIN alice secret").await;
    assert_eq!(client.recv_line().await, "a1 BAD LOGIN is disabled over a cleartext connection");

    client.send("a2 STARTTLS").await;
    assert_eq!(client.recv_line().await, "a2 OK Begin TLS negotiation now");

    let mut client = upgrade_client_tls(client, client_config).await;
    client.send("a3 LOGIN alice secret").await;
    assert_eq!(client.recv_line().await, "a3 OK LOGIN completed");
}

#[tokio::test]
async fn starttls_is_single_shot_once_secure() {
    let (acceptor, client_config) = build_test_tls();
    let connected = Arc::new(FakeConnectedHandler::new());
    let realm = Arc::new(FakeRealm::single("alice", "secret"));
    let config = ImapServerConfig::default();
    let mut client = spawn_imap_with(connected, realm, config, Some(acceptor)).await;
    let _ = client.recv_line().await;

    client.send("a1 STARTTLS").await;
    assert_eq!(client.recv_line().await, "a1 OK Begin TLS negotiation now");
    let mut client = upgrade_client_tls(client, client_config).await;

    client.send("a2 STARTTLS").await;
    assert_eq!(client.recv_line().await, "a2 BAD already secure");
}

#[tokio::test]
async fn starttls_without_a_configured_acceptor_is_rejected() {
    let connected = Arc::new(FakeConnectedHandler::new());
    let realm = Arc::new(FakeRealm::single("alice", "secret"));
    let mut client = spawn_imap_with(connected, realm, ImapServerConfig::default(), None).await;
    let _ = client.recv_line().await;

    client.send("a1 STARTTLS").await;
    assert_eq!(client.recv_line().await, "a1 BAD TLS not available");
}
