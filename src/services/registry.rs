use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, ModelTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

use crate::{
    entities::{bin, item, warehouse},
    errors::ServiceError,
};

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateItemInput {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 16))]
    pub uom: String,
    pub min_level: Option<Decimal>,
    pub max_level: Option<Decimal>,
    pub reorder_level: Option<Decimal>,
    pub default_supplier_id: Option<i64>,
    #[serde(default)]
    pub requires_batch: bool,
    #[serde(default)]
    pub requires_serial: bool,
}

/// Mutable item attributes. The code cannot be changed.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateItemInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 16))]
    pub uom: Option<String>,
    pub min_level: Option<Decimal>,
    pub max_level: Option<Decimal>,
    pub reorder_level: Option<Decimal>,
    pub default_supplier_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateWarehouseInput {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateBinInput {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
}

fn check_levels(
    min_level: Option<Decimal>,
    max_level: Option<Decimal>,
    reorder_level: Option<Decimal>,
) -> Result<(), ServiceError> {
    for (name, level) in [
        ("min_level", min_level),
        ("max_level", max_level),
        ("reorder_level", reorder_level),
    ] {
        if matches!(level, Some(v) if v < Decimal::ZERO) {
            return Err(ServiceError::ValidationError(format!(
                "{} must not be negative",
                name
            )));
        }
    }
    if let (Some(min), Some(max)) = (min_level, max_level) {
        if min > max {
            return Err(ServiceError::ValidationError(
                "min_level must not exceed max_level".to_string(),
            ));
        }
    }
    Ok(())
}

/// Active item or `ValidationError`; used to vet document lines.
pub async fn require_item<C: ConnectionTrait>(
    conn: &C,
    item_id: i64,
) -> Result<item::Model, ServiceError> {
    match item::Entity::find_by_id(item_id).one(conn).await? {
        Some(item) if item.is_active => Ok(item),
        Some(item) => Err(ServiceError::ValidationError(format!(
            "item {} is inactive",
            item.code
        ))),
        None => Err(ServiceError::ValidationError(format!(
            "item {} does not exist",
            item_id
        ))),
    }
}

pub async fn require_warehouse<C: ConnectionTrait>(
    conn: &C,
    warehouse_id: i64,
) -> Result<warehouse::Model, ServiceError> {
    match warehouse::Entity::find_by_id(warehouse_id).one(conn).await? {
        Some(wh) if wh.is_active => Ok(wh),
        Some(wh) => Err(ServiceError::ValidationError(format!(
            "warehouse {} is inactive",
            wh.code
        ))),
        None => Err(ServiceError::ValidationError(format!(
            "warehouse {} does not exist",
            warehouse_id
        ))),
    }
}

/// Active bin that belongs to `warehouse_id`.
pub async fn require_bin<C: ConnectionTrait>(
    conn: &C,
    warehouse_id: i64,
    bin_id: i64,
) -> Result<bin::Model, ServiceError> {
    match bin::Entity::find_by_id(bin_id).one(conn).await? {
        Some(b) if b.warehouse_id != warehouse_id => Err(ServiceError::ValidationError(format!(
            "bin {} does not belong to warehouse {}",
            b.code, warehouse_id
        ))),
        Some(b) if !b.is_active => Err(ServiceError::ValidationError(format!(
            "bin {} is inactive",
            b.code
        ))),
        Some(b) => Ok(b),
        None => Err(ServiceError::ValidationError(format!(
            "bin {} does not exist",
            bin_id
        ))),
    }
}

/// Items, warehouses and bins referenced by stock documents.
#[derive(Clone)]
pub struct RegistryService {
    db: Arc<DatabaseConnection>,
}

impl RegistryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_item(&self, input: CreateItemInput) -> Result<item::Model, ServiceError> {
        input.validate()?;
        check_levels(input.min_level, input.max_level, input.reorder_level)?;

        let existing = item::Entity::find()
            .filter(item::Column::Code.eq(input.code.as_str()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "item code {} already exists",
                input.code
            )));
        }

        let now = Utc::now();
        let created = item::ActiveModel {
            code: Set(input.code),
            name: Set(input.name),
            uom: Set(input.uom),
            min_level: Set(input.min_level),
            max_level: Set(input.max_level),
            reorder_level: Set(input.reorder_level),
            default_supplier_id: Set(input.default_supplier_id),
            requires_batch: Set(input.requires_batch),
            requires_serial: Set(input.requires_serial),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            if ServiceError::is_unique_violation(&e) {
                ServiceError::ValidationError("item code already exists".to_string())
            } else {
                ServiceError::DatabaseError(e)
            }
        })?;

        info!(item_id = created.id, "item created");
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_item(
        &self,
        item_id: i64,
        input: UpdateItemInput,
    ) -> Result<item::Model, ServiceError> {
        input.validate()?;
        let current = self.get_item(item_id).await?;
        check_levels(
            input.min_level.or(current.min_level),
            input.max_level.or(current.max_level),
            input.reorder_level.or(current.reorder_level),
        )?;

        let mut active = current.into_active_model();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(uom) = input.uom {
            active.uom = Set(uom);
        }
        if input.min_level.is_some() {
            active.min_level = Set(input.min_level);
        }
        if input.max_level.is_some() {
            active.max_level = Set(input.max_level);
        }
        if input.reorder_level.is_some() {
            active.reorder_level = Set(input.reorder_level);
        }
        if input.default_supplier_id.is_some() {
            active.default_supplier_id = Set(input.default_supplier_id);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    /// Items are never deleted; deactivation blocks them from new documents.
    #[instrument(skip(self))]
    pub async fn deactivate_item(&self, item_id: i64) -> Result<item::Model, ServiceError> {
        let current = self.get_item(item_id).await?;
        let mut active = current.into_active_model();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;
        info!(item_id, "item deactivated");
        Ok(updated)
    }

    pub async fn get_item(&self, item_id: i64) -> Result<item::Model, ServiceError> {
        item::Entity::find_by_id(item_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("item", item_id))
    }

    pub async fn list_items(&self, include_inactive: bool) -> Result<Vec<item::Model>, ServiceError> {
        let mut query = item::Entity::find();
        if !include_inactive {
            query = query.filter(item::Column::IsActive.eq(true));
        }
        Ok(query.order_by_asc(item::Column::Code).all(&*self.db).await?)
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_warehouse(
        &self,
        input: CreateWarehouseInput,
    ) -> Result<warehouse::Model, ServiceError> {
        input.validate()?;
        let created = warehouse::ActiveModel {
            code: Set(input.code),
            name: Set(input.name),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            if ServiceError::is_unique_violation(&e) {
                ServiceError::ValidationError("warehouse code already exists".to_string())
            } else {
                ServiceError::DatabaseError(e)
            }
        })?;
        info!(warehouse_id = created.id, "warehouse created");
        Ok(created)
    }

    pub async fn list_warehouses(&self) -> Result<Vec<warehouse::Model>, ServiceError> {
        Ok(warehouse::Entity::find()
            .order_by_asc(warehouse::Column::Code)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_bin(
        &self,
        warehouse_id: i64,
        input: CreateBinInput,
    ) -> Result<bin::Model, ServiceError> {
        input.validate()?;
        let wh = warehouse::Entity::find_by_id(warehouse_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("warehouse", warehouse_id))?;

        let created = bin::ActiveModel {
            warehouse_id: Set(wh.id),
            code: Set(input.code),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            if ServiceError::is_unique_violation(&e) {
                ServiceError::ValidationError(format!(
                    "bin code already exists in warehouse {}",
                    wh.code
                ))
            } else {
                ServiceError::DatabaseError(e)
            }
        })?;
        Ok(created)
    }

    pub async fn list_bins(&self, warehouse_id: i64) -> Result<Vec<bin::Model>, ServiceError> {
        let wh = warehouse::Entity::find_by_id(warehouse_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("warehouse", warehouse_id))?;
        Ok(wh
            .find_related(bin::Entity)
            .order_by_asc(bin::Column::Code)
            .all(&*self.db)
            .await?)
    }
}
