use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

use crate::{
    entities::{
        purchase_order::{self, PurchaseOrderStatus},
        purchase_order_line,
    },
    errors::ServiceError,
    services::{
        document_numbers::{self, current_year},
        registry,
    },
};

const PURCHASE_ORDER_PREFIX: &str = "PO";

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct PurchaseOrderLineInput {
    pub item_id: i64,
    pub ordered_quantity: Decimal,
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreatePurchaseOrderInput {
    pub supplier_id: i64,
    #[validate(length(min = 1, message = "a purchase order needs at least one line"))]
    pub lines: Vec<PurchaseOrderLineInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderDetails {
    pub purchase_order: purchase_order::Model,
    pub lines: Vec<purchase_order_line::Model>,
}

/// Purchase orders as far as receipts need them: what was ordered and how
/// much of it has arrived.
#[derive(Clone)]
pub struct PurchaseOrderService {
    db: Arc<DatabaseConnection>,
}

impl PurchaseOrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(supplier_id = input.supplier_id))]
    pub async fn create_purchase_order(
        &self,
        input: CreatePurchaseOrderInput,
        actor: &str,
    ) -> Result<PurchaseOrderDetails, ServiceError> {
        input.validate()?;
        for (idx, line) in input.lines.iter().enumerate() {
            if line.ordered_quantity <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "line {}: ordered quantity must be positive",
                    idx + 1
                )));
            }
            if matches!(line.unit_price, Some(price) if price < Decimal::ZERO) {
                return Err(ServiceError::ValidationError(format!(
                    "line {}: unit price must not be negative",
                    idx + 1
                )));
            }
        }

        let txn = self.db.begin().await?;
        for line in &input.lines {
            registry::require_item(&txn, line.item_id).await?;
        }

        let number = document_numbers::allocate(&txn, PURCHASE_ORDER_PREFIX, current_year()).await?;
        let header = purchase_order::ActiveModel {
            po_number: Set(number),
            supplier_id: Set(input.supplier_id),
            status: Set(PurchaseOrderStatus::Open),
            created_by: Set(actor.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut lines = Vec::with_capacity(input.lines.len());
        for line in input.lines {
            let saved = purchase_order_line::ActiveModel {
                purchase_order_id: Set(header.id),
                item_id: Set(line.item_id),
                ordered_quantity: Set(line.ordered_quantity),
                received_quantity: Set(Decimal::ZERO),
                unit_price: Set(line.unit_price),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            lines.push(saved);
        }

        txn.commit().await?;
        info!(po_number = %header.po_number, "purchase order created");
        Ok(PurchaseOrderDetails {
            purchase_order: header,
            lines,
        })
    }

    pub async fn get_purchase_order(&self, id: i64) -> Result<PurchaseOrderDetails, ServiceError> {
        let purchase_order = purchase_order::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("purchase order", id))?;
        let lines = purchase_order
            .find_related(purchase_order_line::Entity)
            .order_by_asc(purchase_order_line::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(PurchaseOrderDetails {
            purchase_order,
            lines,
        })
    }
}
