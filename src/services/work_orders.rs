use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

use crate::{
    entities::{
        bom,
        stock_document::DocumentType,
        stock_document_line::AdjustmentDirection,
        work_order::{self, WorkOrderStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        bom::{load_lines, required_per_unit},
        document_numbers::{self, current_year},
        posting::{DocumentDetails, DocumentDraft, DraftLine, PostingService},
        registry,
    },
};

const WORK_ORDER_PREFIX: &str = "WO";

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateWorkOrderInput {
    pub item_id: i64,
    pub warehouse_id: i64,
    pub planned_quantity: Decimal,
    /// Defaults to the item's active bill of materials
    pub bom_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RecordProductionInput {
    pub quantity: Decimal,
    /// Bin receiving the finished item
    pub bin_id: Option<i64>,
    /// Bin the components are drawn from
    pub component_bin_id: Option<i64>,
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductionResult {
    pub work_order: work_order::Model,
    pub document: DocumentDetails,
}

#[derive(Clone)]
pub struct WorkOrderService {
    db: Arc<DatabaseConnection>,
    posting: PostingService,
    event_sender: EventSender,
}

impl WorkOrderService {
    pub fn new(db: Arc<DatabaseConnection>, posting: PostingService, event_sender: EventSender) -> Self {
        Self {
            db,
            posting,
            event_sender,
        }
    }

    #[instrument(skip(self, input), fields(item_id = input.item_id))]
    pub async fn create_work_order(
        &self,
        input: CreateWorkOrderInput,
        actor: &str,
    ) -> Result<work_order::Model, ServiceError> {
        input.validate()?;
        if input.planned_quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "planned quantity must be positive".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        registry::require_item(&txn, input.item_id).await?;
        registry::require_warehouse(&txn, input.warehouse_id).await?;

        let bom = match input.bom_id {
            Some(bom_id) => {
                let bom = bom::Entity::find_by_id(bom_id).one(&txn).await?.ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "bill of materials {} does not exist",
                        bom_id
                    ))
                })?;
                if bom.item_id != input.item_id {
                    return Err(ServiceError::ValidationError(format!(
                        "bill of materials {} is not for item {}",
                        bom_id, input.item_id
                    )));
                }
                bom
            }
            None => bom::Entity::find()
                .filter(bom::Column::ItemId.eq(input.item_id))
                .filter(bom::Column::IsActive.eq(true))
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "item {} has no active bill of materials",
                        input.item_id
                    ))
                })?,
        };

        let number = document_numbers::allocate(&txn, WORK_ORDER_PREFIX, current_year()).await?;
        let now = Utc::now();
        let created = work_order::ActiveModel {
            work_order_number: Set(number),
            item_id: Set(input.item_id),
            bom_id: Set(bom.id),
            warehouse_id: Set(input.warehouse_id),
            planned_quantity: Set(input.planned_quantity),
            completed_quantity: Set(Decimal::ZERO),
            status: Set(WorkOrderStatus::Planned),
            created_by: Set(actor.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        info!(work_order = %created.work_order_number, "work order created");
        Ok(created)
    }

    pub async fn get_work_order(&self, work_order_id: i64) -> Result<work_order::Model, ServiceError> {
        work_order::Entity::find_by_id(work_order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("work order", work_order_id))
    }

    /// Backflushes one production run: components are issued per the work
    /// order's bill of materials and the finished item is received at the
    /// value consumed, all under one PRODUCTION document.
    #[instrument(skip(self, input), fields(quantity = %input.quantity))]
    pub async fn record_production(
        &self,
        work_order_id: i64,
        input: RecordProductionInput,
        actor: &str,
    ) -> Result<ProductionResult, ServiceError> {
        input.validate()?;
        if input.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "production quantity must be positive".to_string(),
            ));
        }

        let wo = self.get_work_order(work_order_id).await?;
        if matches!(
            wo.status,
            WorkOrderStatus::Completed | WorkOrderStatus::Cancelled
        ) {
            return Err(ServiceError::ValidationError(format!(
                "work order {} is {:?} and cannot record production",
                wo.work_order_number, wo.status
            )));
        }

        let bom = bom::Entity::find_by_id(wo.bom_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("bom", wo.bom_id))?;
        let components = load_lines(&*self.db, &bom).await?;
        if components.is_empty() {
            return Err(ServiceError::ValidationError(
                "bill of materials has no lines".to_string(),
            ));
        }

        let mut draft = DocumentDraft::new(DocumentType::Production, wo.warehouse_id);
        draft.work_order_id = Some(wo.id);
        draft.reference = Some(wo.work_order_number.clone());
        draft.idempotency_key = input.idempotency_key;
        draft.work_order_progress = Some(input.quantity);

        for component in &components {
            draft.lines.push(DraftLine {
                item_id: component.component_item_id,
                quantity: input.quantity
                    * required_per_unit(component.quantity_per_unit, component.wastage_percent),
                bin_id: input.component_bin_id,
                direction: Some(AdjustmentDirection::Decrease),
                ..Default::default()
            });
        }
        draft.lines.push(DraftLine {
            item_id: wo.item_id,
            quantity: input.quantity,
            bin_id: input.bin_id,
            direction: Some(AdjustmentDirection::Increase),
            ..Default::default()
        });

        let document = self.posting.post_draft(draft, actor).await?;
        let work_order = self.get_work_order(work_order_id).await?;

        info!(
            work_order = %work_order.work_order_number,
            completed = %work_order.completed_quantity,
            status = ?work_order.status,
            "production recorded"
        );
        self.event_sender
            .publish_all(vec![Event::ProductionRecorded {
                work_order_id: work_order.id,
                quantity: input.quantity,
                completed_quantity: work_order.completed_quantity,
            }])
            .await;

        Ok(ProductionResult {
            work_order,
            document,
        })
    }
}
