use crate::support::{spawn_ftp, FakeFileSystem, FakeFtpHandler};
use std::sync::Arc;

#[tokio::test]
async fn greeting_then_user_pass_logs_in() {
    let fs = Arc::new(FakeFileSystem::new());
    let handler = Arc::new(FakeFtpHandler::new(fs, "secret"));
    let mut client = spawn_ftp(handler).await;

    let greeting = client.recv_line().await;
    assert!(greeting.starts_with("220 "), "unexpected greeting: {greeting}");

    client.send("USER alice").await;
    assert_eq!(client.recv_line().await, "331 Password required");

    client.send("PASS secret").await;
    assert_eq!(client.recv_line().await, "230 User logged in, proceed");

    client.send("QUIT").await;
    assert_eq!(client.recv_line().await, "221 Goodbye");
}

#[tokio::test]
async fn wrong_password_is_rejected_and_session_stays_open() {
    let fs = Arc::new(FakeFileSystem::new());
    let handler = Arc::new(FakeFtpHandler::new(fs, "secret"));
    let mut client = spawn_ftp(handler).await;
    let _ = client.recv_line().await;

    client.send("USER alice").await;
    assert_eq!(client.recv_line().await, "331 Password required");
    client.send("PASS wrong").await;
    assert_eq!(client.recv_line().await, "530 Login incorrect");

    // the control connection is still alive and still gated.
    client.send("PWD").await;
    assert_eq!(client.recv_line().await, "530 Please login with USER and PASS");
}

#[tokio::test]
async fn commands_before_auth_are_rejected_except_the_allowed_set() {
    let fs = Arc::new(FakeFileSystem::new());
    let handler = Arc::new(FakeFtpHandler::new(fs, "secret"));
    let mut client = spawn_ftp(handler).await;
    let _ = client.recv_line().await;

    client.send("NOOP").await;
    assert_eq!(client.recv_line().await, "200 NOOP ok");

    client.send("LIST").await;
    assert_eq!(client.recv_line().await, "530 Please login with USER and PASS");
}
