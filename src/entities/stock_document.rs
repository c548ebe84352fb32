use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    /// Goods receipt note
    #[sea_orm(string_value = "GRN")]
    Grn,
    /// Material issue note
    #[sea_orm(string_value = "MIN")]
    Min,
    /// Material return note
    #[sea_orm(string_value = "MRN")]
    Mrn,
    #[sea_orm(string_value = "TRANSFER")]
    Transfer,
    #[sea_orm(string_value = "ADJUSTMENT")]
    Adjustment,
    #[sea_orm(string_value = "PRODUCTION")]
    Production,
}

impl DocumentType {
    /// Number prefix used when allocating document numbers.
    pub fn number_prefix(&self) -> &'static str {
        match self {
            DocumentType::Grn => "GRN",
            DocumentType::Min => "MIN",
            DocumentType::Mrn => "MRN",
            DocumentType::Transfer => "TRF",
            DocumentType::Adjustment => "ADJ",
            DocumentType::Production => "PRD",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Grn => "grn",
            DocumentType::Min => "min",
            DocumentType::Mrn => "mrn",
            DocumentType::Transfer => "transfer",
            DocumentType::Adjustment => "adjustment",
            DocumentType::Production => "production",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Header shared by every stock document (GRN, MIN, MRN, transfer,
/// adjustment, production).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_documents")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub document_type: DocumentType,
    #[sea_orm(unique)]
    pub document_number: String,
    pub status: DocumentStatus,
    pub warehouse_id: i64,
    pub to_warehouse_id: Option<i64>,
    pub work_order_id: Option<i64>,
    pub purchase_order_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub source_document_id: Option<i64>,
    pub reason: Option<String>,
    pub reference: Option<String>,
    #[sea_orm(unique)]
    pub idempotency_key: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
    pub reversed_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_document_line::Entity")]
    Lines,
}

impl Related<super::stock_document_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
