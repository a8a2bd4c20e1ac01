//! Process-level behaviour of the node binary.

use std::process::Command;
use std::time::Duration;

#[tokio::test]
async fn test_taken_port_exits_non_zero() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap().to_string();

    let out = tokio::time::timeout(
        Duration::from_secs(30),
        tokio::task::spawn_blocking(move || {
            Command::new(env!("CARGO_BIN_EXE_provestor"))
                .args(["--mode", "ledger", "--listen", &addr])
                .env_remove("PROVESTOR_CONFIG")
                .output()
                .unwrap()
        }),
    )
    .await
    .expect("process exits on its own")
    .unwrap();

    assert!(!out.status.success(), "status: {:?}", out.status);
    drop(taken);
}

#[test]
fn test_bad_listen_address_exits_non_zero() {
    let out = Command::new(env!("CARGO_BIN_EXE_provestor"))
        .args(["--mode", "ledger", "--listen", "nowhere"])
        .env_remove("PROVESTOR_CONFIG")
        .output()
        .unwrap();
    assert!(!out.status.success());
}
