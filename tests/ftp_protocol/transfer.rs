use crate::support::{spawn_ftp, FakeFileSystem, FakeFtpHandler};
use protocol_server_core::ftp::FtpFileInfo;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Parses `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` into a dial
/// address, the way a client would.
fn parse_pasv_reply(line: &str) -> std::net::SocketAddr {
    let open = line.find('(').expect("PASV reply has a parenthesized body");
    let close = line.find(')').expect("PASV reply has a parenthesized body");
    let nums: Vec<u16> = line[open + 1..close].split(',').map(|p| p.parse().unwrap()).collect();
    let ip = std::net::Ipv4Addr::new(nums[0] as u8, nums[1] as u8, nums[2] as u8, nums[3] as u8);
    let port = (nums[4] << 8) | nums[5];
    std::net::SocketAddr::new(ip.into(), port)
}

async fn login(client: &mut crate::support::ControlClient) {
    let _ = client.recv_line().await;
    client.send("USER alice").await;
    let _ = client.recv_line().await;
    client.send("PASS secret").await;
    assert_eq!(client.recv_line().await, "230 User logged in, proceed");
}

#[tokio::test]
async fn binary_retr_over_pasv_transfers_file_bytes() {
    let fs = Arc::new(FakeFileSystem::new());
    fs.put("/report.bin", &[1u8, 2, 3, 4, 250, 251]);
    let handler = Arc::new(FakeFtpHandler::new(fs, "secret"));
    let mut client = spawn_ftp(handler).await;
    login(&mut client).await;

    client.send("TYPE I").await;
    assert_eq!(client.recv_line().await, "200 Type set to I");

    client.send("PASV").await;
    let pasv_reply = client.recv_line().await;
    assert!(pasv_reply.starts_with("227 "), "unexpected PASV reply: {pasv_reply}");
    let data_addr = parse_pasv_reply(&pasv_reply);

    client.send("RETR /report.bin").await;
    assert_eq!(client.recv_line().await, "150 Opening data connection");

    let mut data_stream = TcpStream::connect(data_addr).await.unwrap();
    let mut received = Vec::new();
    data_stream.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, vec![1u8, 2, 3, 4, 250, 251]);

    assert_eq!(client.recv_line().await, "226 Transfer complete");
}

#[tokio::test]
async fn list_over_pasv_renders_the_directory_entry() {
    let fs = Arc::new(FakeFileSystem::new());
    *fs.listing.lock().unwrap() = vec![FtpFileInfo {
        name: "notes.txt".to_string(),
        size: 42,
        is_dir: false,
        modified: SystemTime::now(),
        permissions: "rw-r--r--".to_string(),
        owner: "alice".to_string(),
        group: "alice".to_string(),
    }];
    let handler = Arc::new(FakeFtpHandler::new(fs, "secret"));
    let mut client = spawn_ftp(handler).await;
    login(&mut client).await;

    client.send("PASV").await;
    let data_addr = parse_pasv_reply(&client.recv_line().await);

    client.send("LIST").await;
    assert_eq!(client.recv_line().await, "150 Opening data connection");

    let mut data_stream = TcpStream::connect(data_addr).await.unwrap();
    let mut received = String::new();
    tokio::io::AsyncReadExt::read_to_string(&mut data_stream, &mut received).await.unwrap();
    assert!(received.contains("notes.txt"), "listing did not contain the entry: {received}");

    assert_eq!(client.recv_line().await, "226 Transfer complete");
}

#[tokio::test]
async fn stor_uploads_bytes_into_the_file_system() {
    let fs = Arc::new(FakeFileSystem::new());
    let fs_for_assert = fs.clone();
    let handler = Arc::new(FakeFtpHandler::new(fs, "secret"));
    let mut client = spawn_ftp(handler).await;
    login(&mut client).await;

    client.send("TYPE I").await;
    let _ = client.recv_line().await;

    client.send("PASV").await;
    let data_addr = parse_pasv_reply(&client.recv_line().await);

    client.send("STOR /uploaded.bin").await;
    assert_eq!(client.recv_line().await, "150 Ready to receive data");

    let mut data_stream = TcpStream::connect(data_addr).await.unwrap();
    data_stream.write_all(b"hello upload").await.unwrap();
    data_stream.shutdown().await.unwrap();

    assert_eq!(client.recv_line().await, "226 Transfer complete");
    assert_eq!(fs_for_assert.uploaded("/uploaded.bin").unwrap(), b"hello upload");
}

#[tokio::test]
async fn epsv_all_latches_and_then_rejects_port() {
    let fs = Arc::new(FakeFileSystem::new());
    let handler = Arc::new(FakeFtpHandler::new(fs, "secret"));
    let mut client = spawn_ftp(handler).await;
    login(&mut client).await;

    client.send("EPSV ALL").await;
    assert_eq!(client.recv_line().await, "200 EPSV ALL ok");

    client.send("PORT 127,0,0,1,7,208").await;
    assert_eq!(client.recv_line().await, "522 Network protocol not supported, EPSV ALL in effect");
}

#[tokio::test]
async fn transfer_commands_without_a_prior_mode_are_rejected() {
    let fs = Arc::new(FakeFileSystem::new());
    let handler = Arc::new(FakeFtpHandler::new(fs, "secret"));
    let mut client = spawn_ftp(handler).await;
    login(&mut client).await;

    client.send("RETR /report.bin").await;
    assert_eq!(client.recv_line().await, "503 use PORT/PASV/EPRT/EPSV first");
}
