//! Push-channel behaviour against a real (loopback) websocket server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use secrecy::SecretString;
use url::Url;
use vigil_api::{ChannelState, PushChannel, ReconnectConfig};

/// Accept websocket handshakes forever, closing each connection
/// politely right after the handshake. Returns the endpoint URL and a
/// counter of completed handshakes.
async fn polite_close_server() -> (Url, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    let addr = listener.local_addr().expect("local addr");
    let dials = Arc::new(AtomicUsize::new(0));

    let server_dials = Arc::clone(&dials);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            server_dials.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                let _ = ws.close(None).await;
            }
        }
    });

    let url = Url::parse(&format!("ws://{addr}/events")).expect("ws url");
    (url, dials)
}

#[tokio::test(flavor = "multi_thread")]
async fn clean_server_close_waits_out_the_initial_delay() {
    let (url, dials) = polite_close_server().await;

    let channel = PushChannel::new(
        url,
        ReconnectConfig {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(1),
            max_retries: None,
        },
    );
    channel.connect(&SecretString::from("access"));

    // Long enough for the first dial and the clean close, well short of
    // the redial delay. A tight redial loop racks up dozens of dials in
    // this window.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        dials.load(Ordering::SeqCst),
        1,
        "exactly one dial before the redial delay elapses"
    );
    assert_eq!(
        channel.current_state(),
        ChannelState::Reconnecting { attempt: 0 }
    );

    channel.disconnect();
    assert_eq!(channel.current_state(), ChannelState::Disconnected);
}

#[tokio::test(flavor = "multi_thread")]
async fn clean_close_redial_happens_after_the_delay() {
    let (url, dials) = polite_close_server().await;

    let channel = PushChannel::new(
        url,
        ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(200),
            max_retries: None,
        },
    );
    channel.connect(&SecretString::from("access"));

    tokio::time::sleep(Duration::from_millis(350)).await;
    let count = dials.load(Ordering::SeqCst);
    assert!(count >= 2, "redial after the delay, got {count} dials");
    assert!(count <= 5, "redials stay paced, got {count} dials");

    channel.disconnect();
}
