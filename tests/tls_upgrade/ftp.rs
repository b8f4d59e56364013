use crate::support::{build_test_tls, spawn_ftp_with_tls, upgrade_client_tls, FakeFileSystem, FakeFtpHandler};
use std::sync::Arc;

#[tokio::test]
async fn auth_tls_upgrades_and_allows_pbsz_prot_and_login() {
    let (acceptor, client_config) = build_test_tls();
    let fs = Arc::new(FakeFileSystem::new());
    let handler = Arc::new(FakeFtpHandler::new(fs, "secret"));
    let mut client = spawn_ftp_with_tls(handler, acceptor).await;

    assert!(client.recv_line().await.starts_with("220 "));
    client.send("AUTH TLS").await;
    assert_eq!(client.recv_line().await, "234 AUTH TLS successful");

    let mut client = upgrade_client_tls(client, client_config).await;

    client.send("PBSZ 0").await;
    assert_eq!(client.recv_line().await, "200 PBSZ=0");
    client.send("PROT P").await;
    assert_eq!(client.recv_line().await, "200 PROT OK. Securing data channel");

    client.send("USER alice").await;
    assert_eq!(client.recv_line().await, "331 Password required");
    client.send("PASS secret").await;
    assert_eq!(client.recv_line().await, "230 User logged in, proceed");
}

#[tokio::test]
async fn auth_tls_is_single_shot_once_secure() {
    let (acceptor, client_config) = build_test_tls();
    let fs = Arc::new(FakeFileSystem::new());
    let handler = Arc::new(FakeFtpHandler::new(fs, "secret"));
    let mut client = spawn_ftp_with_tls(handler, acceptor).await;
    let _ = client.recv_line().await;

    client.send("AUTH TLS").await;
    assert_eq!(client.recv_line().await, "234 AUTH TLS successful");
    let mut client = upgrade_client_tls(client, client_config).await;

    client.send("AUTH TLS").await;
    assert_eq!(client.recv_line().await, "503 already secure");
}

#[tokio::test]
async fn prot_before_pbsz_and_pbsz_before_tls_are_rejected() {
    let fs = Arc::new(FakeFileSystem::new());
    let handler = Arc::new(FakeFtpHandler::new(fs, "secret"));
    let mut client = crate::support::spawn_ftp(handler).await;
    let _ = client.recv_line().await;

    client.send("PBSZ 0").await;
    assert_eq!(client.recv_line().await, "503 PBSZ requires a secure connection");

    let (acceptor, client_config) = build_test_tls();
    let fs = Arc::new(FakeFileSystem::new());
    let handler = Arc::new(FakeFtpHandler::new(fs, "secret"));
    let mut client = spawn_ftp_with_tls(handler, acceptor).await;
    let _ = client.recv_line().await;
    client.send("AUTH TLS").await;
    assert_eq!(client.recv_line().await, "234 AUTH TLS successful");
    let mut client = upgrade_client_tls(client, client_config).await;

    client.send("PROT P").await;
    assert_eq!(client.recv_line().await, "503 PROT requires PBSZ first");
}

#[tokio::test]
async fn auth_tls_without_a_configured_acceptor_is_rejected() {
    let fs = Arc::new(FakeFileSystem::new());
    let handler = Arc::new(FakeFtpHandler::new(fs, "secret"));
    let mut client = crate::support::spawn_ftp(handler).await;
    let _ = client.recv_line().await;

    client.send("AUTH TLS").await;
    assert_eq!(client.recv_line().await, "534 TLS not available");
}
