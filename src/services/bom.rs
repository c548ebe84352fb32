use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, IntoActiveModel, ModelTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

use crate::{
    entities::{bom, bom_line},
    errors::ServiceError,
    services::{registry, stock::StockService},
};

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct BomLineInput {
    pub component_item_id: i64,
    pub quantity_per_unit: Decimal,
    #[serde(default)]
    pub wastage_percent: Decimal,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateBomInput {
    pub item_id: i64,
    #[serde(default)]
    pub lines: Vec<BomLineInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomDetails {
    pub bom: bom::Model,
    pub lines: Vec<bom_line::Model>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentFeasibility {
    pub item_id: i64,
    pub required_per_unit: Decimal,
    pub available: Decimal,
    pub producible_units: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityReport {
    pub bom_id: i64,
    pub item_id: i64,
    pub warehouse_id: Option<i64>,
    pub max_producible_units: Decimal,
    pub constraining_item_id: Option<i64>,
    pub components: Vec<ComponentFeasibility>,
}

/// Component quantity consumed per finished unit, wastage included.
pub fn required_per_unit(quantity_per_unit: Decimal, wastage_percent: Decimal) -> Decimal {
    quantity_per_unit * (Decimal::ONE + wastage_percent / Decimal::ONE_HUNDRED)
}

/// Whole finished units the given availability supports. Lines for the same
/// component are combined; the constraining item is the first one reaching
/// the minimum.
pub fn compute_feasibility(
    lines: &[bom_line::Model],
    available: &HashMap<i64, Decimal>,
) -> Result<(Decimal, Option<i64>, Vec<ComponentFeasibility>), ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::ValidationError(
            "bill of materials has no lines".to_string(),
        ));
    }

    let mut order: Vec<i64> = Vec::new();
    let mut required: HashMap<i64, Decimal> = HashMap::new();
    for line in lines {
        if !required.contains_key(&line.component_item_id) {
            order.push(line.component_item_id);
        }
        *required.entry(line.component_item_id).or_default() +=
            required_per_unit(line.quantity_per_unit, line.wastage_percent);
    }

    let mut components = Vec::with_capacity(order.len());
    let mut max_units: Option<Decimal> = None;
    let mut constraining = None;
    for item_id in order {
        let per_unit = required.get(&item_id).copied().unwrap_or_default();
        let on_hand = available.get(&item_id).copied().unwrap_or_default();
        let producible = if per_unit > Decimal::ZERO {
            (on_hand.max(Decimal::ZERO) / per_unit).floor()
        } else {
            Decimal::ZERO
        };
        if max_units.map_or(true, |current| producible < current) {
            max_units = Some(producible);
            constraining = Some(item_id);
        }
        components.push(ComponentFeasibility {
            item_id,
            required_per_unit: per_unit,
            available: on_hand,
            producible_units: producible,
        });
    }

    Ok((max_units.unwrap_or_default(), constraining, components))
}

pub(crate) async fn load_lines<C: ConnectionTrait>(
    conn: &C,
    bom: &bom::Model,
) -> Result<Vec<bom_line::Model>, ServiceError> {
    Ok(bom
        .find_related(bom_line::Entity)
        .order_by_asc(bom_line::Column::Id)
        .all(conn)
        .await?)
}

#[derive(Clone)]
pub struct BomService {
    db: Arc<DatabaseConnection>,
}

impl BomService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates the next version of the parent's bill of materials, inactive.
    #[instrument(skip(self, input), fields(item_id = input.item_id))]
    pub async fn create_bom(&self, input: CreateBomInput) -> Result<BomDetails, ServiceError> {
        input.validate()?;
        for (idx, line) in input.lines.iter().enumerate() {
            if line.component_item_id == input.item_id {
                return Err(ServiceError::ValidationError(format!(
                    "line {}: an item cannot be a component of itself",
                    idx + 1
                )));
            }
            if line.quantity_per_unit <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "line {}: quantity per unit must be positive",
                    idx + 1
                )));
            }
            if line.wastage_percent < Decimal::ZERO || line.wastage_percent >= Decimal::ONE_HUNDRED {
                return Err(ServiceError::ValidationError(format!(
                    "line {}: wastage must be in [0, 100)",
                    idx + 1
                )));
            }
        }

        let txn = self.db.begin().await?;
        registry::require_item(&txn, input.item_id).await?;
        for (idx, line) in input.lines.iter().enumerate() {
            registry::require_item(&txn, line.component_item_id)
                .await
                .map_err(|e| match e {
                    ServiceError::ValidationError(msg) => {
                        ServiceError::ValidationError(format!("line {}: {}", idx + 1, msg))
                    }
                    other => other,
                })?;
        }

        let latest = bom::Entity::find()
            .filter(bom::Column::ItemId.eq(input.item_id))
            .order_by_desc(bom::Column::Version)
            .one(&txn)
            .await?;
        let version = latest.map(|b| b.version + 1).unwrap_or(1);

        let header = bom::ActiveModel {
            item_id: Set(input.item_id),
            version: Set(version),
            is_active: Set(false),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| ServiceError::from_row_race(e, "bom version"))?;

        let mut lines = Vec::with_capacity(input.lines.len());
        for line in input.lines {
            let saved = bom_line::ActiveModel {
                bom_id: Set(header.id),
                component_item_id: Set(line.component_item_id),
                quantity_per_unit: Set(line.quantity_per_unit),
                wastage_percent: Set(line.wastage_percent),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            lines.push(saved);
        }

        txn.commit().await?;
        info!(bom_id = header.id, version, "bill of materials created");
        Ok(BomDetails { bom: header, lines })
    }

    /// Makes `bom_id` the only active version for its parent item.
    #[instrument(skip(self))]
    pub async fn activate_bom(&self, bom_id: i64) -> Result<BomDetails, ServiceError> {
        let txn = self.db.begin().await?;
        let target = bom::Entity::find_by_id(bom_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("bom", bom_id))?;

        bom::Entity::update_many()
            .col_expr(bom::Column::IsActive, Expr::value(false))
            .filter(bom::Column::ItemId.eq(target.item_id))
            .filter(bom::Column::Id.ne(target.id))
            .exec(&txn)
            .await?;

        let mut active = target.into_active_model();
        active.is_active = Set(true);
        let activated = active.update(&txn).await?;
        let lines = load_lines(&txn, &activated).await?;

        txn.commit().await?;
        info!(bom_id, item_id = activated.item_id, "bill of materials activated");
        Ok(BomDetails {
            bom: activated,
            lines,
        })
    }

    pub async fn active_bom(&self, item_id: i64) -> Result<BomDetails, ServiceError> {
        let bom = bom::Entity::find()
            .filter(bom::Column::ItemId.eq(item_id))
            .filter(bom::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("no active bill of materials for item {}", item_id))
            })?;
        let lines = load_lines(&*self.db, &bom).await?;
        Ok(BomDetails { bom, lines })
    }

    pub async fn get_bom(&self, bom_id: i64) -> Result<BomDetails, ServiceError> {
        let bom = bom::Entity::find_by_id(bom_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("bom", bom_id))?;
        let lines = load_lines(&*self.db, &bom).await?;
        Ok(BomDetails { bom, lines })
    }

    /// How many finished units current available stock supports, in one
    /// warehouse or across all of them.
    #[instrument(skip(self))]
    pub async fn feasibility(
        &self,
        bom_id: i64,
        warehouse_id: Option<i64>,
    ) -> Result<FeasibilityReport, ServiceError> {
        let details = self.get_bom(bom_id).await?;
        let available = StockService::available_by_item(&*self.db, warehouse_id).await?;
        let (max_producible_units, constraining_item_id, components) =
            compute_feasibility(&details.lines, &available)?;

        Ok(FeasibilityReport {
            bom_id,
            item_id: details.bom.item_id,
            warehouse_id,
            max_producible_units,
            constraining_item_id,
            components,
        })
    }
}
