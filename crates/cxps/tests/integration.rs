mod common;

use common::*;
use cxp_common::Frame;
use cxps::credentials::CredentialDirectory;
use std::time::Duration;
use tokio::net::UdpSocket;

#[tokio::test]
async fn two_campuses_exchange_messages() {
    let server = start_server().await;

    let mut karachi = TestClient::connect(&server.addr, "Karachi", "NU-KHI-123").await;
    let mut lahore = TestClient::connect(&server.addr, "Lahore", "NU-LHR-123").await;

    karachi
        .send_route("Lahore", "IT", "Karachi", "lab schedule attached")
        .await;
    assert_eq!(
        karachi.recv_text().await,
        "ACK:Message delivered to Lahore"
    );
    assert_eq!(
        lahore.recv_text().await,
        "TARGET:Lahore|DEPT:IT|FROM:Karachi|MSG:lab schedule attached"
    );

    lahore.send_route("Karachi", "IT", "Lahore", "received").await;
    assert_eq!(
        lahore.recv_text().await,
        "ACK:Message delivered to Karachi"
    );
    assert_eq!(
        karachi.recv_text().await,
        "TARGET:Karachi|DEPT:IT|FROM:Lahore|MSG:received"
    );
}

#[tokio::test]
async fn offline_destination_then_delivery_after_connect() {
    let server = start_server().await;
    let mut karachi = TestClient::connect(&server.addr, "Karachi", "NU-KHI-123").await;

    karachi.send_route("Lahore", "HR", "Karachi", "hello").await;
    assert_eq!(
        karachi.recv_text().await,
        "ERROR:Unable to deliver message to Lahore"
    );

    let mut lahore = TestClient::connect(&server.addr, "Lahore", "NU-LHR-123").await;
    karachi.send_route("Lahore", "HR", "Karachi", "hello again").await;
    assert_eq!(
        karachi.recv_text().await,
        "ACK:Message delivered to Lahore"
    );
    assert_eq!(
        lahore.recv_text().await,
        "TARGET:Lahore|DEPT:HR|FROM:Karachi|MSG:hello again"
    );
}

#[tokio::test]
async fn forwarded_text_is_verbatim() {
    let server = start_server().await;
    let mut karachi = TestClient::connect(&server.addr, "Karachi", "NU-KHI-123").await;
    let mut lahore = TestClient::connect(&server.addr, "Lahore", "NU-LHR-123").await;

    // Pipes in the body and a mismatched FROM pass through untouched.
    let raw = "TARGET:Lahore|DEPT:Admin|FROM:Someone|MSG:a|b|c";
    karachi.send_text(raw).await;
    assert_eq!(
        karachi.recv_text().await,
        "ACK:Message delivered to Lahore"
    );
    assert_eq!(lahore.recv_text().await, raw);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let server = start_server().await;
    let mut client = TestClient::connect_raw(&server.addr).await;

    client.send_text("Campus:Lahore,Pass:wrong").await;
    assert_eq!(client.recv_frame().await, Frame::AuthFailed);
    client.expect_closed().await;

    assert!(server.state.registry.list().is_empty());
}

#[tokio::test]
async fn unknown_campus_is_rejected() {
    let server = start_server().await;
    let mut client = TestClient::connect_raw(&server.addr).await;

    client.send_text("Campus:Quetta,Pass:NU-QTA-123").await;
    assert_eq!(client.recv_frame().await, Frame::AuthFailed);
    assert!(server.state.registry.list().is_empty());
}

#[tokio::test]
async fn malformed_auth_is_rejected() {
    let server = start_server().await;
    let mut client = TestClient::connect_raw(&server.addr).await;

    client
        .send_text("TARGET:Lahore|DEPT:IT|FROM:Karachi|MSG:hi")
        .await;
    assert_eq!(client.recv_frame().await, Frame::AuthFailed);
    client.expect_closed().await;
}

#[tokio::test]
async fn second_login_for_active_campus_is_refused() {
    let server = start_server().await;
    let mut first = TestClient::connect(&server.addr, "Peshawar", "NU-PEW-123").await;

    let mut second = TestClient::connect_raw(&server.addr).await;
    second.send_text("Campus:Peshawar,Pass:NU-PEW-123").await;
    assert_eq!(second.recv_frame().await, Frame::AlreadyConnected);
    second.expect_closed().await;

    // The original session keeps working.
    let mut karachi = TestClient::connect(&server.addr, "Karachi", "NU-KHI-123").await;
    karachi.send_route("Peshawar", "IT", "Karachi", "still there?").await;
    assert_eq!(
        karachi.recv_text().await,
        "ACK:Message delivered to Peshawar"
    );
    assert_eq!(
        first.recv_text().await,
        "TARGET:Peshawar|DEPT:IT|FROM:Karachi|MSG:still there?"
    );
}

#[tokio::test]
async fn concurrent_logins_admit_exactly_one() {
    let server = start_server().await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let addr = server.addr;
        handles.push(tokio::spawn(async move {
            let mut client = TestClient::connect_raw(&addr).await;
            client.send_text("Campus:Multan,Pass:NU-MLT-123").await;
            let reply = client.recv_frame().await;
            (reply, client)
        }));
    }

    let mut successes = 0;
    let mut refusals = 0;
    let mut keep = Vec::new();
    for handle in handles {
        let (reply, client) = handle.await.unwrap();
        match reply {
            Frame::AuthSuccess => successes += 1,
            Frame::AlreadyConnected => refusals += 1,
            other => panic!("unexpected reply {other:?}"),
        }
        keep.push(client);
    }

    assert_eq!(successes, 1);
    assert_eq!(refusals, 7);
    assert_eq!(server.state.registry.active_count(), 1);
}

#[tokio::test]
async fn campus_can_log_in_again_after_disconnect() {
    let server = start_server().await;
    let islamabad = TestClient::connect(&server.addr, "Islamabad", "NU-ISB-123").await;
    islamabad.close().await;

    let registry = &server.state.registry;
    wait_until(
        || registry.lookup_active("Islamabad").is_none(),
        "session deactivated",
    )
    .await;
    assert_eq!(registry.list().len(), 1);
    assert!(!registry.list()[0].active);

    let _again = TestClient::connect(&server.addr, "Islamabad", "NU-ISB-123").await;
    assert_eq!(registry.active_count(), 1);
}

#[tokio::test]
async fn message_to_disconnected_campus_fails() {
    let server = start_server().await;
    let mut karachi = TestClient::connect(&server.addr, "Karachi", "NU-KHI-123").await;
    let cfd = TestClient::connect(&server.addr, "CFD", "NU-CFD-123").await;
    cfd.close().await;

    let registry = &server.state.registry;
    wait_until(|| registry.lookup_active("CFD").is_none(), "CFD deactivated").await;

    karachi.send_route("CFD", "IT", "Karachi", "anyone?").await;
    assert_eq!(
        karachi.recv_text().await,
        "ERROR:Unable to deliver message to CFD"
    );
}

#[tokio::test]
async fn malformed_route_gets_no_reply() {
    let server = start_server().await;
    let mut karachi = TestClient::connect(&server.addr, "Karachi", "NU-KHI-123").await;
    let mut lahore = TestClient::connect(&server.addr, "Lahore", "NU-LHR-123").await;

    karachi.send_text("TARGET:Lahore|FROM:Karachi|MSG:no dept").await;
    karachi.send_text("just some text").await;
    assert!(karachi
        .recv_text_timeout(Duration::from_millis(200))
        .await
        .is_none());
    assert!(lahore
        .recv_text_timeout(Duration::from_millis(100))
        .await
        .is_none());

    // The session is still usable afterwards.
    karachi.send_route("Lahore", "IT", "Karachi", "ok").await;
    assert_eq!(
        karachi.recv_text().await,
        "ACK:Message delivered to Lahore"
    );
}

#[tokio::test]
async fn custom_credentials_are_honoured() {
    let credentials = CredentialDirectory::from_pairs([("Gilgit", "NU-GLT-1")]);
    let server = start_server_with(credentials, 64).await;

    let _gilgit = TestClient::connect(&server.addr, "Gilgit", "NU-GLT-1").await;

    let mut lahore = TestClient::connect_raw(&server.addr).await;
    lahore.send_text("Campus:Lahore,Pass:NU-LHR-123").await;
    assert_eq!(lahore.recv_frame().await, Frame::AuthFailed);
}

#[tokio::test]
async fn secret_with_commas_authenticates() {
    let credentials = CredentialDirectory::from_pairs([("Gilgit", "a,b,Pass:c")]);
    let server = start_server_with(credentials, 64).await;

    let _gilgit = TestClient::connect(&server.addr, "Gilgit", "a,b,Pass:c").await;
    assert_eq!(server.state.registry.active_count(), 1);
}

#[tokio::test]
async fn heartbeat_then_broadcast_reaches_campus() {
    let server = start_server().await;
    let _lahore = TestClient::connect(&server.addr, "Lahore", "NU-LHR-123").await;
    let _karachi = TestClient::connect(&server.addr, "Karachi", "NU-KHI-123").await;

    let lahore_udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = lahore_udp.local_addr().unwrap().port();
    let heartbeat = Frame::heartbeat("Lahore", port).serialize();
    lahore_udp
        .send_to(heartbeat.as_bytes(), server.liveness_addr)
        .await
        .unwrap();

    let registry = &server.state.registry;
    wait_until(
        || registry.snapshot_active_with_address().len() == 1,
        "heartbeat applied",
    )
    .await;

    // Karachi never sent a heartbeat, so only Lahore is reachable.
    let sent = server.state.broadcaster.broadcast("exams postponed").await;
    assert_eq!(sent, 1);

    let mut buf = [0u8; 256];
    let (n, _) = tokio::time::timeout(Duration::from_secs(2), lahore_udp.recv_from(&mut buf))
        .await
        .expect("timeout waiting for broadcast")
        .unwrap();
    assert_eq!(&buf[..n], b"BROADCAST:exams postponed");
}

#[tokio::test]
async fn broadcast_with_no_heartbeats_reaches_nobody() {
    let server = start_server().await;
    let _lahore = TestClient::connect(&server.addr, "Lahore", "NU-LHR-123").await;

    assert_eq!(server.state.broadcaster.broadcast("hello?").await, 0);
}

#[tokio::test]
async fn full_delivery_queue_returns_error() {
    let server = start_server_with(CredentialDirectory::default(), 1).await;
    let mut karachi = TestClient::connect(&server.addr, "Karachi", "NU-KHI-123").await;
    let _lahore = TestClient::connect(&server.addr, "Lahore", "NU-LHR-123").await;

    // Every send gets exactly one reply, whatever the queue state.
    for i in 0..20 {
        karachi
            .send_route("Lahore", "IT", "Karachi", &format!("burst {i}"))
            .await;
    }
    for _ in 0..20 {
        let reply = karachi.recv_text().await;
        assert!(
            reply == "ACK:Message delivered to Lahore"
                || reply == "ERROR:Unable to deliver message to Lahore",
            "unexpected reply {reply}"
        );
    }
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    let server = start_server().await;
    let _karachi = TestClient::connect(&server.addr, "Karachi", "NU-KHI-123").await;

    server.shutdown_tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        tokio_tungstenite::connect_async(format!("ws://{}", server.addr)),
    )
    .await;
    assert!(!matches!(result, Ok(Ok(_))));
}
