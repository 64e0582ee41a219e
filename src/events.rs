use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted after a workflow or ledger operation commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Borrow request events
    RequestSubmitted(Uuid),
    RequestApproved {
        request_id: Uuid,
        approver_id: Uuid,
    },
    RequestRejected {
        request_id: Uuid,
        reason: String,
    },
    RequestBorrowed(Uuid),
    RequestReturned(Uuid),
    RequestCancelled(Uuid),
    RequestMarkedOverdue(Uuid),
    RequestMarkedDamaged(Uuid),

    // Inventory events
    InventoryReserved {
        part_id: Uuid,
        quantity: i32,
        request_id: Uuid,
    },
    InventoryReleased {
        part_id: Uuid,
        quantity: i32,
        request_id: Uuid,
    },
    InventoryAdjusted {
        part_id: Uuid,
        old_quantity: i32,
        new_quantity: i32,
        reason: String,
    },
    PartCreated(Uuid),
    LowStock {
        part_id: Uuid,
        available_quantity: i32,
        minimum_stock: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel and logs each event. Downstream consumers
/// (notifications, reporting) subscribe here when they exist.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::LowStock {
                part_id,
                available_quantity,
                minimum_stock,
            } => {
                warn!(
                    part_id = %part_id,
                    available = available_quantity,
                    minimum = minimum_stock,
                    "Part is at or below minimum stock"
                );
            }
            other => info!(event = ?other, "Domain event"),
        }
    }
    info!("Event channel closed; event processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_event() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);

        sender
            .send(Event::RequestSubmitted(Uuid::nil()))
            .await
            .expect("send should succeed");

        match rx.recv().await {
            Some(Event::RequestSubmitted(id)) => assert_eq!(id, Uuid::nil()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_fails_after_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        assert!(sender
            .send(Event::RequestBorrowed(Uuid::nil()))
            .await
            .is_err());
    }
}
