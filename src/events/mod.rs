use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::entities::{ledger_entry::LedgerTransactionType, stock_document::DocumentType};

/// Publishes domain events to the background processor.
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends every event, logging (not propagating) failures. Used after a
    /// commit, when the stock change is already durable.
    pub async fn publish_all(&self, events: Vec<Event>) {
        for event in events {
            if let Err(e) = self.send(event).await {
                warn!("{}", e);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    DocumentPosted {
        document_id: i64,
        document_number: String,
        document_type: DocumentType,
        line_count: usize,
    },
    DocumentReversed {
        document_id: i64,
        document_number: String,
    },
    StockLevelChanged {
        item_id: i64,
        warehouse_id: i64,
        bin_id: Option<i64>,
        transaction_type: LedgerTransactionType,
        quantity: Decimal,
        available_quantity: Decimal,
    },
    LowStock {
        item_id: i64,
        warehouse_id: i64,
        on_hand: Decimal,
        threshold: Decimal,
    },
    ProductionRecorded {
        work_order_id: i64,
        quantity: Decimal,
        completed_quantity: Decimal,
    },
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::DocumentPosted {
                document_number,
                document_type,
                line_count,
                ..
            } => info!(
                document_number = %document_number,
                document_type = document_type.as_str(),
                line_count,
                "document posted"
            ),
            Event::DocumentReversed {
                document_number, ..
            } => info!(document_number = %document_number, "document reversed"),
            Event::StockLevelChanged {
                item_id,
                warehouse_id,
                bin_id,
                quantity,
                ..
            } => info!(
                item_id,
                warehouse_id,
                bin_id = ?bin_id,
                quantity = %quantity,
                "stock level changed"
            ),
            Event::LowStock {
                item_id,
                warehouse_id,
                on_hand,
                threshold,
            } => warn!(
                item_id,
                warehouse_id,
                on_hand = %on_hand,
                threshold = %threshold,
                "stock at or below reorder level"
            ),
            Event::ProductionRecorded {
                work_order_id,
                quantity,
                completed_quantity,
            } => info!(
                work_order_id,
                quantity = %quantity,
                completed_quantity = %completed_quantity,
                "production recorded"
            ),
        }
    }

    info!("Event processing loop stopped");
}
