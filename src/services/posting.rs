use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, IntoActiveModel, ModelTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use validator::Validate;

use crate::{
    config::{AppConfig, NegativeStockPolicy},
    entities::{
        item,
        ledger_entry::{self, LedgerTransactionType},
        purchase_order::{self, PurchaseOrderStatus},
        purchase_order_line,
        stock_document::{self, DocumentStatus, DocumentType},
        stock_document_line::{self, AdjustmentDirection},
        work_order::{self, WorkOrderStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        document_numbers::{self, current_year},
        ledger::{CostBasis, LedgerSession, Movement, SessionSummary},
        registry,
    },
};

const RETRY_BACKOFF_MS: u64 = 15;

#[derive(Debug, Clone, Copy)]
pub struct PostingOptions {
    pub negative_stock_policy: NegativeStockPolicy,
    pub max_retries: u32,
}

impl Default for PostingOptions {
    fn default() -> Self {
        Self {
            negative_stock_policy: NegativeStockPolicy::Reject,
            max_retries: 3,
        }
    }
}

impl From<&AppConfig> for PostingOptions {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            negative_stock_policy: cfg.negative_stock_policy,
            max_retries: cfg.posting_max_retries,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ReceiptLineInput {
    pub item_id: i64,
    pub quantity: Decimal,
    pub bin_id: Option<i64>,
    pub unit_cost: Option<Decimal>,
    pub purchase_order_line_id: Option<i64>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct GoodsReceiptInput {
    pub warehouse_id: i64,
    pub supplier_id: Option<i64>,
    pub purchase_order_id: Option<i64>,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,
    #[validate(length(min = 1, message = "a document needs at least one line"))]
    pub lines: Vec<ReceiptLineInput>,
}

/// Line of an issue (MIN) or return (MRN).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct StockLineInput {
    pub item_id: i64,
    pub quantity: Decimal,
    pub bin_id: Option<i64>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct MaterialIssueInput {
    pub warehouse_id: i64,
    pub work_order_id: Option<i64>,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,
    #[validate(length(min = 1, message = "a document needs at least one line"))]
    pub lines: Vec<StockLineInput>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct MaterialReturnInput {
    pub warehouse_id: i64,
    /// Issue note the material is returned against
    pub source_document_id: Option<i64>,
    pub work_order_id: Option<i64>,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,
    #[validate(length(min = 1, message = "a document needs at least one line"))]
    pub lines: Vec<StockLineInput>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TransferLineInput {
    pub item_id: i64,
    pub quantity: Decimal,
    pub from_bin_id: Option<i64>,
    pub to_bin_id: Option<i64>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TransferInput {
    pub from_warehouse_id: i64,
    pub to_warehouse_id: i64,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,
    #[validate(length(min = 1, message = "a document needs at least one line"))]
    pub lines: Vec<TransferLineInput>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AdjustmentLineInput {
    pub item_id: i64,
    pub quantity: Decimal,
    pub direction: AdjustmentDirection,
    pub bin_id: Option<i64>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AdjustmentInput {
    pub warehouse_id: i64,
    #[validate(length(min = 1, max = 500, message = "an adjustment needs a reason"))]
    pub reason: String,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,
    #[validate(length(min = 1, message = "a document needs at least one line"))]
    pub lines: Vec<AdjustmentLineInput>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ReverseDocumentInput {
    #[validate(length(min = 1, max = 500, message = "a reversal needs a reason"))]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DocumentFilter {
    pub document_type: Option<DocumentType>,
    pub warehouse_id: Option<i64>,
    pub status: Option<DocumentStatus>,
    pub limit: Option<u64>,
}

/// Header, lines and ledger entries of one document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentDetails {
    pub document: stock_document::Model,
    pub lines: Vec<stock_document_line::Model>,
    pub entries: Vec<ledger_entry::Model>,
}

/// Document ready to be posted. Built from the typed inputs above, or by
/// the work order service for production.
#[derive(Debug, Clone)]
pub(crate) struct DocumentDraft {
    pub document_type: DocumentType,
    pub warehouse_id: i64,
    pub to_warehouse_id: Option<i64>,
    pub work_order_id: Option<i64>,
    pub purchase_order_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub source_document_id: Option<i64>,
    pub reason: Option<String>,
    pub reference: Option<String>,
    pub idempotency_key: Option<String>,
    pub lines: Vec<DraftLine>,
    /// Finished quantity credited to `work_order_id` in the same transaction
    pub work_order_progress: Option<Decimal>,
}

impl DocumentDraft {
    pub fn new(document_type: DocumentType, warehouse_id: i64) -> Self {
        Self {
            document_type,
            warehouse_id,
            to_warehouse_id: None,
            work_order_id: None,
            purchase_order_id: None,
            supplier_id: None,
            source_document_id: None,
            reason: None,
            reference: None,
            idempotency_key: None,
            lines: Vec::new(),
            work_order_progress: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct DraftLine {
    pub item_id: i64,
    pub quantity: Decimal,
    pub bin_id: Option<i64>,
    pub to_bin_id: Option<i64>,
    pub unit_cost: Option<Decimal>,
    pub direction: Option<AdjustmentDirection>,
    pub purchase_order_line_id: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PlannedCost {
    Keep,
    Explicit(Decimal),
    /// Quantity and cost of the preceding outbound leg (transfers)
    MirrorOutbound,
    /// Value consumed by preceding outbound legs, spread over this quantity
    ConsumedValue,
}

#[derive(Debug, Clone)]
struct PlannedMovement {
    transaction_type: LedgerTransactionType,
    item_id: i64,
    warehouse_id: i64,
    bin_id: Option<i64>,
    delta: Decimal,
    cost: PlannedCost,
}

/// Movements a document produces, in application order.
fn plan_movements(draft: &DocumentDraft) -> Vec<PlannedMovement> {
    let mut planned = Vec::new();
    for line in &draft.lines {
        let at_source = |transaction_type, delta, cost| PlannedMovement {
            transaction_type,
            item_id: line.item_id,
            warehouse_id: draft.warehouse_id,
            bin_id: line.bin_id,
            delta,
            cost,
        };
        match draft.document_type {
            DocumentType::Grn => planned.push(at_source(
                LedgerTransactionType::Receipt,
                line.quantity,
                line.unit_cost
                    .map(PlannedCost::Explicit)
                    .unwrap_or(PlannedCost::Keep),
            )),
            DocumentType::Min => planned.push(at_source(
                LedgerTransactionType::Issue,
                -line.quantity,
                PlannedCost::Keep,
            )),
            DocumentType::Mrn => planned.push(at_source(
                LedgerTransactionType::Return,
                line.quantity,
                PlannedCost::Keep,
            )),
            DocumentType::Transfer => {
                planned.push(at_source(
                    LedgerTransactionType::TransferOut,
                    -line.quantity,
                    PlannedCost::Keep,
                ));
                planned.push(PlannedMovement {
                    transaction_type: LedgerTransactionType::TransferIn,
                    item_id: line.item_id,
                    warehouse_id: draft.to_warehouse_id.unwrap_or(draft.warehouse_id),
                    bin_id: line.to_bin_id,
                    delta: line.quantity,
                    cost: PlannedCost::MirrorOutbound,
                });
            }
            DocumentType::Adjustment => match line.direction {
                Some(AdjustmentDirection::Decrease) => planned.push(at_source(
                    LedgerTransactionType::AdjustmentDecrease,
                    -line.quantity,
                    PlannedCost::Keep,
                )),
                _ => planned.push(at_source(
                    LedgerTransactionType::AdjustmentIncrease,
                    line.quantity,
                    PlannedCost::Keep,
                )),
            },
            DocumentType::Production => match line.direction {
                Some(AdjustmentDirection::Decrease) => planned.push(at_source(
                    LedgerTransactionType::ProductionIssue,
                    -line.quantity,
                    PlannedCost::Keep,
                )),
                _ => planned.push(at_source(
                    LedgerTransactionType::ProductionReceipt,
                    line.quantity,
                    PlannedCost::ConsumedValue,
                )),
            },
        }
    }
    planned
}

fn on_line(line_no: usize, err: ServiceError) -> ServiceError {
    match err {
        ServiceError::ValidationError(msg) => {
            ServiceError::ValidationError(format!("line {}: {}", line_no, msg))
        }
        other => other,
    }
}

fn check_quantity(line_no: usize, quantity: Decimal) -> Result<(), ServiceError> {
    if quantity <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "line {}: quantity must be positive",
            line_no
        )));
    }
    Ok(())
}

fn check_unit_cost(line_no: usize, unit_cost: Option<Decimal>) -> Result<(), ServiceError> {
    if matches!(unit_cost, Some(cost) if cost < Decimal::ZERO) {
        return Err(ServiceError::ValidationError(format!(
            "line {}: unit cost must not be negative",
            line_no
        )));
    }
    Ok(())
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Typed references of a draft that passed validation.
struct ResolvedReferences {
    po_lines: HashMap<i64, purchase_order_line::Model>,
}

async fn resolve_references(
    txn: &DatabaseTransaction,
    draft: &DocumentDraft,
) -> Result<ResolvedReferences, ServiceError> {
    registry::require_warehouse(txn, draft.warehouse_id).await?;
    let destination = draft.to_warehouse_id.unwrap_or(draft.warehouse_id);
    if let Some(to_warehouse_id) = draft.to_warehouse_id {
        registry::require_warehouse(txn, to_warehouse_id).await?;
    }

    for (idx, line) in draft.lines.iter().enumerate() {
        let line_no = idx + 1;
        registry::require_item(txn, line.item_id)
            .await
            .map_err(|e| on_line(line_no, e))?;
        if let Some(bin_id) = line.bin_id {
            registry::require_bin(txn, draft.warehouse_id, bin_id)
                .await
                .map_err(|e| on_line(line_no, e))?;
        }
        if let Some(to_bin_id) = line.to_bin_id {
            registry::require_bin(txn, destination, to_bin_id)
                .await
                .map_err(|e| on_line(line_no, e))?;
        }
    }

    if let Some(work_order_id) = draft.work_order_id {
        if work_order::Entity::find_by_id(work_order_id)
            .one(txn)
            .await?
            .is_none()
        {
            return Err(ServiceError::ValidationError(format!(
                "work order {} does not exist",
                work_order_id
            )));
        }
    }

    if let Some(po_id) = draft.purchase_order_id {
        if purchase_order::Entity::find_by_id(po_id).one(txn).await?.is_none() {
            return Err(ServiceError::ValidationError(format!(
                "purchase order {} does not exist",
                po_id
            )));
        }
    }

    let po_lines = resolve_purchase_order_lines(txn, draft).await?;

    if draft.document_type == DocumentType::Mrn {
        if let Some(source_id) = draft.source_document_id {
            check_returnable(txn, draft, source_id).await?;
        }
    }

    Ok(ResolvedReferences { po_lines })
}

/// Locks the PO lines a receipt references and rejects over-receipt.
async fn resolve_purchase_order_lines(
    txn: &DatabaseTransaction,
    draft: &DocumentDraft,
) -> Result<HashMap<i64, purchase_order_line::Model>, ServiceError> {
    let mut po_lines = HashMap::new();
    let mut requested: BTreeMap<i64, Decimal> = BTreeMap::new();

    for (idx, line) in draft.lines.iter().enumerate() {
        let Some(po_line_id) = line.purchase_order_line_id else {
            continue;
        };
        let line_no = idx + 1;
        if !po_lines.contains_key(&po_line_id) {
            let po_line = purchase_order_line::Entity::find_by_id(po_line_id)
                .lock_exclusive()
                .one(txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "line {}: purchase order line {} does not exist",
                        line_no, po_line_id
                    ))
                })?;
            po_lines.insert(po_line_id, po_line);
        }

        let po_line = &po_lines[&po_line_id];
        if po_line.item_id != line.item_id {
            return Err(ServiceError::ValidationError(format!(
                "line {}: item {} does not match purchase order line {}",
                line_no, line.item_id, po_line_id
            )));
        }
        if matches!(draft.purchase_order_id, Some(po_id) if po_id != po_line.purchase_order_id) {
            return Err(ServiceError::ValidationError(format!(
                "line {}: purchase order line {} belongs to another purchase order",
                line_no, po_line_id
            )));
        }

        let total = requested.entry(po_line_id).or_default();
        *total += line.quantity;
        if *total > po_line.outstanding_quantity() {
            return Err(ServiceError::ValidationError(format!(
                "line {}: receiving {} exceeds outstanding {} on purchase order line {}",
                line_no,
                total.normalize(),
                po_line.outstanding_quantity().normalize(),
                po_line_id
            )));
        }
    }

    Ok(po_lines)
}

/// Returned quantities may not exceed what the issue note handed out, less
/// what earlier returns against it already brought back.
async fn check_returnable(
    txn: &DatabaseTransaction,
    draft: &DocumentDraft,
    source_id: i64,
) -> Result<(), ServiceError> {
    let source = stock_document::Entity::find_by_id(source_id)
        .one(txn)
        .await?
        .ok_or_else(|| {
            ServiceError::ValidationError(format!("source document {} does not exist", source_id))
        })?;
    if source.document_type != DocumentType::Min || source.status != DocumentStatus::Completed {
        return Err(ServiceError::ValidationError(format!(
            "{} is not a completed material issue",
            source.document_number
        )));
    }

    let mut returnable: HashMap<i64, Decimal> = HashMap::new();
    for line in source.find_related(stock_document_line::Entity).all(txn).await? {
        *returnable.entry(line.item_id).or_default() += line.quantity;
    }

    let earlier_returns = stock_document::Entity::find()
        .filter(stock_document::Column::DocumentType.eq(DocumentType::Mrn))
        .filter(stock_document::Column::SourceDocumentId.eq(source_id))
        .filter(stock_document::Column::Status.eq(DocumentStatus::Completed))
        .all(txn)
        .await?;
    for earlier in earlier_returns {
        for line in earlier.find_related(stock_document_line::Entity).all(txn).await? {
            *returnable.entry(line.item_id).or_default() -= line.quantity;
        }
    }

    let mut requested: BTreeMap<i64, Decimal> = BTreeMap::new();
    for (idx, line) in draft.lines.iter().enumerate() {
        let Some(open) = returnable.get(&line.item_id).copied() else {
            return Err(ServiceError::ValidationError(format!(
                "line {}: item {} was not issued on {}",
                idx + 1,
                line.item_id,
                source.document_number
            )));
        };
        let total = requested.entry(line.item_id).or_default();
        *total += line.quantity;
        if *total > open {
            return Err(ServiceError::ValidationError(format!(
                "line {}: returning {} exceeds the {} still open on {}",
                idx + 1,
                total.normalize(),
                open.max(Decimal::ZERO).normalize(),
                source.document_number
            )));
        }
    }
    Ok(())
}

async fn refresh_purchase_order_status(
    txn: &DatabaseTransaction,
    purchase_order_id: i64,
) -> Result<(), ServiceError> {
    let Some(po) = purchase_order::Entity::find_by_id(purchase_order_id)
        .one(txn)
        .await?
    else {
        return Ok(());
    };
    let lines = po.find_related(purchase_order_line::Entity).all(txn).await?;

    let status = if lines.iter().all(|l| l.received_quantity >= l.ordered_quantity) {
        PurchaseOrderStatus::Received
    } else if lines.iter().any(|l| l.received_quantity > Decimal::ZERO) {
        PurchaseOrderStatus::PartiallyReceived
    } else {
        PurchaseOrderStatus::Open
    };

    if po.status != status {
        let mut active = po.into_active_model();
        active.status = Set(status);
        active.update(txn).await?;
    }
    Ok(())
}

/// Adds `delta` (may be negative) to the received quantity of PO lines.
async fn apply_received_quantities(
    txn: &DatabaseTransaction,
    deltas: BTreeMap<i64, Decimal>,
) -> Result<(), ServiceError> {
    let mut touched_orders = BTreeSet::new();
    for (po_line_id, delta) in deltas {
        let Some(po_line) = purchase_order_line::Entity::find_by_id(po_line_id)
            .lock_exclusive()
            .one(txn)
            .await?
        else {
            continue;
        };
        touched_orders.insert(po_line.purchase_order_id);
        let received = (po_line.received_quantity + delta).max(Decimal::ZERO);
        let mut active = po_line.into_active_model();
        active.received_quantity = Set(received);
        active.update(txn).await?;
    }
    for po_id in touched_orders {
        refresh_purchase_order_status(txn, po_id).await?;
    }
    Ok(())
}

/// Credits (or with a negative quantity, debits) finished output to a work
/// order and moves its status along.
pub(crate) async fn apply_work_order_progress(
    txn: &DatabaseTransaction,
    work_order_id: i64,
    quantity: Decimal,
) -> Result<work_order::Model, ServiceError> {
    let wo = work_order::Entity::find_by_id(work_order_id)
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::not_found("work order", work_order_id))?;

    if quantity > Decimal::ZERO
        && matches!(
            wo.status,
            WorkOrderStatus::Completed | WorkOrderStatus::Cancelled
        )
    {
        return Err(ServiceError::ValidationError(format!(
            "work order {} is {:?} and cannot record production",
            wo.work_order_number, wo.status
        )));
    }

    let completed = (wo.completed_quantity + quantity).max(Decimal::ZERO);
    let status = if completed >= wo.planned_quantity {
        WorkOrderStatus::Completed
    } else if completed > Decimal::ZERO {
        WorkOrderStatus::InProgress
    } else {
        WorkOrderStatus::Planned
    };

    let mut active = wo.into_active_model();
    active.completed_quantity = Set(completed);
    active.status = Set(status);
    active.updated_at = Set(Utc::now());
    Ok(active.update(txn).await?)
}

/// Posts stock documents: every document is validated as a whole, then its
/// number, header, lines, stock rows and ledger entries are written in one
/// transaction.
#[derive(Clone)]
pub struct PostingService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    options: PostingOptions,
}

impl PostingService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender, options: PostingOptions) -> Self {
        Self {
            db,
            event_sender,
            options,
        }
    }

    /// Goods receipt note: stock in, optionally against purchase order lines.
    #[instrument(skip(self, input), fields(warehouse_id = input.warehouse_id, lines = input.lines.len()))]
    pub async fn post_receipt(
        &self,
        input: GoodsReceiptInput,
        actor: &str,
    ) -> Result<DocumentDetails, ServiceError> {
        input.validate()?;
        let mut draft = DocumentDraft::new(DocumentType::Grn, input.warehouse_id);
        draft.supplier_id = input.supplier_id;
        draft.purchase_order_id = input.purchase_order_id;
        draft.reference = blank_to_none(input.reference);
        draft.idempotency_key = input.idempotency_key;

        for (idx, line) in input.lines.into_iter().enumerate() {
            check_quantity(idx + 1, line.quantity)?;
            check_unit_cost(idx + 1, line.unit_cost)?;
            draft.lines.push(DraftLine {
                item_id: line.item_id,
                quantity: line.quantity,
                bin_id: line.bin_id,
                unit_cost: line.unit_cost,
                purchase_order_line_id: line.purchase_order_line_id,
                notes: line.notes,
                ..Default::default()
            });
        }

        self.post_draft(draft, actor).await
    }

    /// Material issue note: stock out, optionally against a work order.
    #[instrument(skip(self, input), fields(warehouse_id = input.warehouse_id, lines = input.lines.len()))]
    pub async fn post_issue(
        &self,
        input: MaterialIssueInput,
        actor: &str,
    ) -> Result<DocumentDetails, ServiceError> {
        input.validate()?;
        let mut draft = DocumentDraft::new(DocumentType::Min, input.warehouse_id);
        draft.work_order_id = input.work_order_id;
        draft.reference = blank_to_none(input.reference);
        draft.idempotency_key = input.idempotency_key;
        draft.lines = stock_lines(input.lines)?;

        self.post_draft(draft, actor).await
    }

    /// Material return note: stock back in, optionally against an issue note.
    #[instrument(skip(self, input), fields(warehouse_id = input.warehouse_id, lines = input.lines.len()))]
    pub async fn post_return(
        &self,
        input: MaterialReturnInput,
        actor: &str,
    ) -> Result<DocumentDetails, ServiceError> {
        input.validate()?;
        let mut draft = DocumentDraft::new(DocumentType::Mrn, input.warehouse_id);
        draft.source_document_id = input.source_document_id;
        draft.work_order_id = input.work_order_id;
        draft.reference = blank_to_none(input.reference);
        draft.idempotency_key = input.idempotency_key;
        draft.lines = stock_lines(input.lines)?;

        self.post_draft(draft, actor).await
    }

    /// Moves stock between locations; both legs land in the same transaction.
    #[instrument(skip(self, input), fields(from = input.from_warehouse_id, to = input.to_warehouse_id))]
    pub async fn post_transfer(
        &self,
        input: TransferInput,
        actor: &str,
    ) -> Result<DocumentDetails, ServiceError> {
        input.validate()?;
        let mut draft = DocumentDraft::new(DocumentType::Transfer, input.from_warehouse_id);
        draft.to_warehouse_id = Some(input.to_warehouse_id);
        draft.reference = blank_to_none(input.reference);
        draft.idempotency_key = input.idempotency_key;

        for (idx, line) in input.lines.into_iter().enumerate() {
            check_quantity(idx + 1, line.quantity)?;
            if input.from_warehouse_id == input.to_warehouse_id && line.from_bin_id == line.to_bin_id
            {
                return Err(ServiceError::ValidationError(format!(
                    "line {}: source and destination are the same location",
                    idx + 1
                )));
            }
            draft.lines.push(DraftLine {
                item_id: line.item_id,
                quantity: line.quantity,
                bin_id: line.from_bin_id,
                to_bin_id: line.to_bin_id,
                notes: line.notes,
                ..Default::default()
            });
        }

        self.post_draft(draft, actor).await
    }

    /// Stock correction in either direction. A reason is mandatory.
    #[instrument(skip(self, input), fields(warehouse_id = input.warehouse_id, lines = input.lines.len()))]
    pub async fn post_adjustment(
        &self,
        input: AdjustmentInput,
        actor: &str,
    ) -> Result<DocumentDetails, ServiceError> {
        input.validate()?;
        if input.reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "an adjustment needs a reason".to_string(),
            ));
        }

        let mut draft = DocumentDraft::new(DocumentType::Adjustment, input.warehouse_id);
        draft.reason = Some(input.reason.trim().to_string());
        draft.reference = blank_to_none(input.reference);
        draft.idempotency_key = input.idempotency_key;

        for (idx, line) in input.lines.into_iter().enumerate() {
            check_quantity(idx + 1, line.quantity)?;
            draft.lines.push(DraftLine {
                item_id: line.item_id,
                quantity: line.quantity,
                bin_id: line.bin_id,
                direction: Some(line.direction),
                notes: line.notes,
                ..Default::default()
            });
        }

        self.post_draft(draft, actor).await
    }

    /// Posts a draft, retrying the whole document on concurrency conflicts,
    /// and publishes events once it is committed.
    pub(crate) async fn post_draft(
        &self,
        draft: DocumentDraft,
        actor: &str,
    ) -> Result<DocumentDetails, ServiceError> {
        let mut attempt = 0;
        let (details, summary) = loop {
            match self.post_once(&draft, actor).await {
                Ok(result) => break result,
                Err(e) if e.is_retryable() && attempt < self.options.max_retries => {
                    attempt += 1;
                    counter!("stockledger.posting_retries", 1);
                    warn!(attempt, error = %e, "retrying document after conflict");
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64))
                        .await;
                }
                Err(e) => {
                    if matches!(e, ServiceError::InsufficientStock(_)) {
                        counter!("stockledger.insufficient_stock_rejections", 1);
                    }
                    if e.status_code().is_server_error() {
                        error!(error = %e, "document posting failed");
                    }
                    return Err(e);
                }
            }
        };

        counter!(
            "stockledger.documents_posted",
            1,
            "type" => draft.document_type.as_str()
        );
        info!(
            document_number = %details.document.document_number,
            lines = details.lines.len(),
            entries = details.entries.len(),
            "document posted"
        );

        let mut events = vec![Event::DocumentPosted {
            document_id: details.document.id,
            document_number: details.document.document_number.clone(),
            document_type: details.document.document_type,
            line_count: details.lines.len(),
        }];
        events.extend(self.stock_events(&summary).await);
        self.event_sender.publish_all(events).await;

        Ok(details)
    }

    async fn post_once(
        &self,
        draft: &DocumentDraft,
        actor: &str,
    ) -> Result<(DocumentDetails, SessionSummary), ServiceError> {
        let txn = self.db.begin().await?;

        if let Some(key) = &draft.idempotency_key {
            if let Some(existing) = find_by_idempotency_key(&txn, key).await? {
                return Err(ServiceError::DuplicateDocument {
                    document_number: existing.document_number,
                });
            }
        }

        let resolved = resolve_references(&txn, draft).await?;

        let number = document_numbers::allocate(
            &txn,
            draft.document_type.number_prefix(),
            current_year(),
        )
        .await?;

        let now = Utc::now();
        let header = stock_document::ActiveModel {
            document_type: Set(draft.document_type),
            document_number: Set(number.clone()),
            status: Set(DocumentStatus::Completed),
            warehouse_id: Set(draft.warehouse_id),
            to_warehouse_id: Set(draft.to_warehouse_id),
            work_order_id: Set(draft.work_order_id),
            purchase_order_id: Set(draft.purchase_order_id),
            supplier_id: Set(draft.supplier_id),
            source_document_id: Set(draft.source_document_id),
            reason: Set(draft.reason.clone()),
            reference: Set(draft.reference.clone()),
            idempotency_key: Set(draft.idempotency_key.clone()),
            created_by: Set(actor.to_string()),
            created_at: Set(now),
            posted_at: Set(Some(now)),
            reversed_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await;

        let header = match header {
            Ok(header) => header,
            Err(e) if ServiceError::is_unique_violation(&e) => {
                txn.rollback().await?;
                return Err(self.header_conflict(draft).await);
            }
            Err(e) => return Err(e.into()),
        };

        let mut lines = Vec::with_capacity(draft.lines.len());
        for (idx, line) in draft.lines.iter().enumerate() {
            let saved = stock_document_line::ActiveModel {
                document_id: Set(header.id),
                line_no: Set(idx as i32 + 1),
                item_id: Set(line.item_id),
                quantity: Set(line.quantity),
                bin_id: Set(line.bin_id),
                to_bin_id: Set(line.to_bin_id),
                unit_cost: Set(line.unit_cost),
                adjustment_direction: Set(line.direction),
                purchase_order_line_id: Set(line.purchase_order_line_id),
                notes: Set(line.notes.clone()),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            lines.push(saved);
        }

        let planned = plan_movements(draft);
        let mut session = LedgerSession::open(
            &txn,
            planned.iter().map(|m| (m.item_id, m.warehouse_id)),
            self.options.negative_stock_policy,
            number.clone(),
            Some(header.id),
            actor,
        )
        .await?;

        let mut last_outbound: Option<(Decimal, Decimal)> = None;
        let mut consumed_value = Decimal::ZERO;
        for movement in planned {
            let (delta, cost_basis) = match movement.cost {
                PlannedCost::Keep => (movement.delta, CostBasis::Keep),
                PlannedCost::Explicit(cost) => (movement.delta, CostBasis::Explicit(cost)),
                PlannedCost::MirrorOutbound => {
                    let (quantity, cost) = last_outbound.ok_or_else(|| {
                        ServiceError::InternalError("inbound leg without outbound leg".to_string())
                    })?;
                    (quantity, CostBasis::Explicit(cost))
                }
                PlannedCost::ConsumedValue => {
                    let cost = if movement.delta > Decimal::ZERO {
                        (consumed_value / movement.delta).round_dp(6)
                    } else {
                        Decimal::ZERO
                    };
                    (movement.delta, CostBasis::Explicit(cost))
                }
            };

            let posted = session
                .post(Movement {
                    transaction_type: movement.transaction_type,
                    item_id: movement.item_id,
                    warehouse_id: movement.warehouse_id,
                    bin_id: movement.bin_id,
                    delta,
                    cost_basis,
                    work_order_id: draft.work_order_id,
                    reference: draft.reference.clone(),
                })
                .await?;

            if delta < Decimal::ZERO {
                let quantity = -posted.outcome.applied;
                let cost = posted.entry.unit_cost.unwrap_or_default();
                consumed_value += quantity * cost;
                last_outbound = Some((quantity, cost));
            }
        }
        let summary = session.close().await?;

        let mut received: BTreeMap<i64, Decimal> = BTreeMap::new();
        for line in &draft.lines {
            if let Some(po_line_id) = line.purchase_order_line_id {
                if resolved.po_lines.contains_key(&po_line_id) {
                    *received.entry(po_line_id).or_default() += line.quantity;
                }
            }
        }
        if !received.is_empty() {
            apply_received_quantities(&txn, received).await?;
        }

        if let (Some(work_order_id), Some(progress)) = (draft.work_order_id, draft.work_order_progress)
        {
            apply_work_order_progress(&txn, work_order_id, progress).await?;
        }

        txn.commit().await?;

        let details = DocumentDetails {
            document: header,
            lines,
            entries: summary.entries(),
        };
        Ok((details, summary))
    }

    /// Explains a unique violation on the header: a concurrent submission
    /// with the same idempotency key won, or the number was taken.
    async fn header_conflict(&self, draft: &DocumentDraft) -> ServiceError {
        if let Some(key) = &draft.idempotency_key {
            match find_by_idempotency_key(&*self.db, key).await {
                Ok(Some(existing)) => {
                    return ServiceError::DuplicateDocument {
                        document_number: existing.document_number,
                    }
                }
                Ok(None) => {}
                Err(e) => return e,
            }
        }
        ServiceError::ConcurrencyConflict("document number already taken".to_string())
    }

    /// Posts the exact opposite of every ledger entry of a completed document
    /// and marks it cancelled.
    #[instrument(skip(self, input))]
    pub async fn reverse_document(
        &self,
        document_id: i64,
        input: ReverseDocumentInput,
        actor: &str,
    ) -> Result<DocumentDetails, ServiceError> {
        input.validate()?;
        let mut attempt = 0;
        loop {
            match self.reverse_once(document_id, &input.reason, actor).await {
                Ok((details, summary)) => {
                    info!(document_number = %details.document.document_number, "document reversed");
                    let mut events = vec![Event::DocumentReversed {
                        document_id: details.document.id,
                        document_number: details.document.document_number.clone(),
                    }];
                    events.extend(self.stock_events(&summary).await);
                    self.event_sender.publish_all(events).await;
                    return Ok(details);
                }
                Err(e) if e.is_retryable() && attempt < self.options.max_retries => {
                    attempt += 1;
                    counter!("stockledger.posting_retries", 1);
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64))
                        .await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn reverse_once(
        &self,
        document_id: i64,
        reason: &str,
        actor: &str,
    ) -> Result<(DocumentDetails, SessionSummary), ServiceError> {
        let txn = self.db.begin().await?;

        let document = stock_document::Entity::find_by_id(document_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("document", document_id))?;
        match document.status {
            DocumentStatus::Completed => {}
            DocumentStatus::Cancelled => {
                return Err(ServiceError::ValidationError(format!(
                    "{} has already been reversed",
                    document.document_number
                )))
            }
            other => {
                return Err(ServiceError::ValidationError(format!(
                    "{} is {:?} and cannot be reversed",
                    document.document_number, other
                )))
            }
        }

        // returned units are already back on hand through the MRN
        if document.document_type == DocumentType::Min {
            let open_returns = stock_document::Entity::find()
                .filter(stock_document::Column::DocumentType.eq(DocumentType::Mrn))
                .filter(stock_document::Column::SourceDocumentId.eq(document.id))
                .filter(stock_document::Column::Status.eq(DocumentStatus::Completed))
                .order_by_asc(stock_document::Column::Id)
                .all(&txn)
                .await?;
            if !open_returns.is_empty() {
                let numbers: Vec<&str> = open_returns
                    .iter()
                    .map(|r| r.document_number.as_str())
                    .collect();
                return Err(ServiceError::ValidationError(format!(
                    "{} has returns against it; reverse {} first",
                    document.document_number,
                    numbers.join(", ")
                )));
            }
        }

        let originals = ledger_entry::Entity::find()
            .filter(ledger_entry::Column::DocumentId.eq(document.id))
            .filter(ledger_entry::Column::TransactionType.ne(LedgerTransactionType::Reversal))
            .order_by_asc(ledger_entry::Column::Id)
            .all(&txn)
            .await?;

        let mut session = LedgerSession::open(
            &txn,
            originals.iter().map(|e| (e.item_id, e.warehouse_id)),
            self.options.negative_stock_policy,
            document.document_number.clone(),
            Some(document.id),
            actor,
        )
        .await?;

        for original in originals.iter().rev() {
            let delta = -original.net_quantity();
            let cost_basis = match original.unit_cost {
                Some(cost) if delta > Decimal::ZERO => CostBasis::Explicit(cost),
                _ => CostBasis::Keep,
            };
            session
                .post(Movement {
                    transaction_type: LedgerTransactionType::Reversal,
                    item_id: original.item_id,
                    warehouse_id: original.warehouse_id,
                    bin_id: original.bin_id,
                    delta,
                    cost_basis,
                    work_order_id: original.work_order_id,
                    reference: Some(reason.to_string()),
                })
                .await?;
        }
        let summary = session.close().await?;

        let lines = document
            .find_related(stock_document_line::Entity)
            .order_by_asc(stock_document_line::Column::LineNo)
            .all(&txn)
            .await?;

        let mut received: BTreeMap<i64, Decimal> = BTreeMap::new();
        for line in &lines {
            if let Some(po_line_id) = line.purchase_order_line_id {
                *received.entry(po_line_id).or_default() -= line.quantity;
            }
        }
        if !received.is_empty() {
            apply_received_quantities(&txn, received).await?;
        }

        if document.document_type == DocumentType::Production {
            if let Some(work_order_id) = document.work_order_id {
                let produced: Decimal = lines
                    .iter()
                    .filter(|l| l.adjustment_direction == Some(AdjustmentDirection::Increase))
                    .map(|l| l.quantity)
                    .sum();
                apply_work_order_progress(&txn, work_order_id, -produced).await?;
            }
        }

        let had_reason = document.reason.is_some();
        let mut active = document.into_active_model();
        active.status = Set(DocumentStatus::Cancelled);
        active.reversed_at = Set(Some(Utc::now()));
        if !had_reason {
            active.reason = Set(Some(reason.to_string()));
        }
        let document = active.update(&txn).await?;

        let entries = ledger_entry::Entity::find()
            .filter(ledger_entry::Column::DocumentId.eq(document.id))
            .order_by_asc(ledger_entry::Column::Id)
            .all(&txn)
            .await?;

        txn.commit().await?;

        Ok((
            DocumentDetails {
                document,
                lines,
                entries,
            },
            summary,
        ))
    }

    pub async fn get_document(&self, document_id: i64) -> Result<DocumentDetails, ServiceError> {
        let document = stock_document::Entity::find_by_id(document_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("document", document_id))?;
        let lines = document
            .find_related(stock_document_line::Entity)
            .order_by_asc(stock_document_line::Column::LineNo)
            .all(&*self.db)
            .await?;
        let entries = ledger_entry::Entity::find()
            .filter(ledger_entry::Column::DocumentId.eq(document.id))
            .order_by_asc(ledger_entry::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(DocumentDetails {
            document,
            lines,
            entries,
        })
    }

    pub async fn list_documents(
        &self,
        filter: &DocumentFilter,
    ) -> Result<Vec<stock_document::Model>, ServiceError> {
        let mut query = stock_document::Entity::find();
        if let Some(document_type) = filter.document_type {
            query = query.filter(stock_document::Column::DocumentType.eq(document_type));
        }
        if let Some(warehouse_id) = filter.warehouse_id {
            query = query.filter(stock_document::Column::WarehouseId.eq(warehouse_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(stock_document::Column::Status.eq(status));
        }
        Ok(query
            .order_by_desc(stock_document::Column::Id)
            .limit(filter.limit.unwrap_or(100))
            .all(&*self.db)
            .await?)
    }

    /// Stock-change events for every movement plus low-stock alerts for
    /// pairs at or below their item's threshold.
    async fn stock_events(&self, summary: &SessionSummary) -> Vec<Event> {
        let mut events: Vec<Event> = summary
            .movements
            .iter()
            .map(|m| Event::StockLevelChanged {
                item_id: m.entry.item_id,
                warehouse_id: m.entry.warehouse_id,
                bin_id: m.entry.bin_id,
                transaction_type: m.entry.transaction_type,
                quantity: m.stock.quantity,
                available_quantity: m.stock.available_quantity,
            })
            .collect();

        let item_ids: BTreeSet<i64> = summary.balances.keys().map(|(item, _)| *item).collect();
        let items = match item::Entity::find()
            .filter(item::Column::Id.is_in(item_ids))
            .all(&*self.db)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                warn!("could not load items for low-stock check: {}", e);
                return events;
            }
        };
        let thresholds: HashMap<i64, Decimal> = items
            .iter()
            .filter_map(|i| i.low_stock_threshold().map(|t| (i.id, t)))
            .collect();

        for ((item_id, warehouse_id), on_hand) in &summary.balances {
            if let Some(threshold) = thresholds.get(item_id) {
                if on_hand <= threshold {
                    events.push(Event::LowStock {
                        item_id: *item_id,
                        warehouse_id: *warehouse_id,
                        on_hand: *on_hand,
                        threshold: *threshold,
                    });
                }
            }
        }
        events
    }
}

fn stock_lines(lines: Vec<StockLineInput>) -> Result<Vec<DraftLine>, ServiceError> {
    lines
        .into_iter()
        .enumerate()
        .map(|(idx, line)| {
            check_quantity(idx + 1, line.quantity)?;
            Ok(DraftLine {
                item_id: line.item_id,
                quantity: line.quantity,
                bin_id: line.bin_id,
                notes: line.notes,
                ..Default::default()
            })
        })
        .collect()
}

async fn find_by_idempotency_key<C: ConnectionTrait>(
    conn: &C,
    key: &str,
) -> Result<Option<stock_document::Model>, ServiceError> {
    Ok(stock_document::Entity::find()
        .filter(stock_document::Column::IdempotencyKey.eq(key))
        .one(conn)
        .await?)
}
