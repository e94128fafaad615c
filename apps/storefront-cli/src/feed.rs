//! # Live Event Feed
//!
//! Forwards committed catalog and cart events to the output as
//! `{"event": {...}}` lines.
//!
//! ```text
//! engines ──notify──► BroadcastObserver ──► feed task ──► Output
//!                            │
//!                  slow reader: Lagged(n) → warn and keep going
//!                  all senders dropped: Closed → task ends
//! ```

use serde::Serialize;
use storefront_engine::StorefrontEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::output::Output;

#[derive(Serialize)]
struct EventLine<'a> {
    event: &'a StorefrontEvent,
}

/// Spawns the task that prints every event received on `rx`.
///
/// The task ends once every sender is gone.
pub fn spawn(mut rx: broadcast::Receiver<StorefrontEvent>, output: Output) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = output.write_json(&EventLine { event: &event }).await {
                        warn!(error = %e, "Failed to write event, stopping feed");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event feed lagged, events dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("Event feed closed");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_engine::{BroadcastObserver, EventObserver};

    #[tokio::test]
    async fn test_feed_writes_events_and_stops_on_close() {
        let observer = BroadcastObserver::new(16);
        let output = Output::buffer();
        let task = spawn(observer.subscribe(), output.clone());

        observer.notify(StorefrontEvent::StockChanged {
            product_id: "p-1".into(),
            stock: 4,
        });
        drop(observer);
        task.await.unwrap();

        let lines = output.lines().await;
        assert_eq!(lines.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(value["event"]["type"], "stock_changed");
        assert_eq!(value["event"]["productId"], "p-1");
        assert_eq!(value["event"]["stock"], 4);
    }

    #[tokio::test]
    async fn test_lagging_feed_keeps_going() {
        let observer = BroadcastObserver::new(1);
        let output = Output::buffer();
        let rx = observer.subscribe();

        // Overflow the buffer before the task starts reading.
        for stock in 0..3 {
            observer.notify(StorefrontEvent::StockChanged {
                product_id: "p-1".into(),
                stock,
            });
        }
        let task = spawn(rx, output.clone());
        drop(observer);
        task.await.unwrap();

        let lines = output.lines().await;
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("\"stock\":2"));
    }
}
