use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::observability::metrics::Metrics;

/// Handle to the long-lived order push stream. One underlying connection at a
/// time; the background task reconnects with a fixed delay after any drop, so
/// the receiver sees a single logical sequence of raw messages. Messages may
/// be lost across a reconnect gap but the manager itself never duplicates.
pub struct OrderStream {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl OrderStream {
    pub fn spawn(
        ws_url: &str,
        rider_id: i64,
        reconnect_delay: Duration,
        metrics: Arc<Metrics>,
    ) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();
        let url = format!("{ws_url}?riderId={rider_id}");
        let handle = tokio::spawn(run_stream(
            url,
            reconnect_delay,
            tx,
            cancel.clone(),
            metrics,
        ));

        (Self { cancel, handle }, rx)
    }

    /// Cancels a pending reconnect wait, closes an open connection with a
    /// normal-closure frame and waits for the task to finish. No further
    /// messages are delivered afterwards.
    pub async fn close(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

async fn run_stream(
    url: String,
    reconnect_delay: Duration,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
    metrics: Arc<Metrics>,
) {
    let mut attempt: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        attempt += 1;
        if attempt > 1 {
            metrics.stream_reconnects.inc();
        }

        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            connected = connect_async(&url) => connected,
        };

        match connected {
            Ok((mut ws, _)) => {
                info!(url = %url, "order stream connected");

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            let _ = ws
                                .close(Some(CloseFrame {
                                    code: CloseCode::Normal,
                                    reason: "rider going offline".into(),
                                }))
                                .await;
                            return;
                        }
                        msg = ws.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                if tx.send(text).await.is_err() {
                                    // consumer gone, stop for good
                                    return;
                                }
                            }
                            Some(Ok(_)) => {}
                            Some(Err(err)) => {
                                warn!(error = %err, "order stream transport error");
                                break;
                            }
                            None => {
                                info!("order stream closed by server");
                                break;
                            }
                        }
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "order stream connect failed");
            }
        }

        // fixed backoff between attempts; cancellation aborts the wait
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep(reconnect_delay) => {}
        }
    }
}
