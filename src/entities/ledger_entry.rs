use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of stock movement recorded by a ledger entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum LedgerTransactionType {
    #[sea_orm(string_value = "Receipt")]
    Receipt,
    #[sea_orm(string_value = "Issue")]
    Issue,
    #[sea_orm(string_value = "Return")]
    Return,
    #[sea_orm(string_value = "TransferOut")]
    TransferOut,
    #[sea_orm(string_value = "TransferIn")]
    TransferIn,
    #[sea_orm(string_value = "AdjustmentIncrease")]
    AdjustmentIncrease,
    #[sea_orm(string_value = "AdjustmentDecrease")]
    AdjustmentDecrease,
    #[sea_orm(string_value = "ProductionIssue")]
    ProductionIssue,
    #[sea_orm(string_value = "ProductionReceipt")]
    ProductionReceipt,
    #[sea_orm(string_value = "Reversal")]
    Reversal,
}

/// Append-only record of one stock movement (one row of the DTR).
///
/// `running_balance` is the on-hand quantity of the (item, warehouse) pair
/// across all bins right after this entry; `bin_balance` is the quantity of
/// the exact (item, warehouse, bin) row.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub transaction_type: LedgerTransactionType,
    pub voucher_number: String,
    pub document_id: Option<i64>,
    pub item_id: i64,
    pub warehouse_id: i64,
    pub bin_id: Option<i64>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub quantity_in: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub quantity_out: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub unit_cost: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub running_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub bin_balance: Decimal,
    pub work_order_id: Option<i64>,
    pub reference: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::stock_document::Entity",
        from = "Column::DocumentId",
        to = "super::stock_document::Column::Id"
    )]
    StockDocument,
}

impl Related<super::stock_document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockDocument.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Signed movement: `quantity_in - quantity_out`.
    pub fn net_quantity(&self) -> Decimal {
        self.quantity_in - self.quantity_out
    }
}
