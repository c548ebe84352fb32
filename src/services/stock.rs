use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::{
    config::NegativeStockPolicy,
    entities::stock_level::{self, location_key},
    errors::ServiceError,
    services::{ledger, registry},
};

/// Quantities of a stock row before a movement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StockSnapshot {
    pub quantity: Decimal,
    pub reserved: Decimal,
    pub average_cost: Decimal,
}

impl StockSnapshot {
    pub fn available(&self) -> Decimal {
        self.quantity - self.reserved
    }
}

impl From<&stock_level::Model> for StockSnapshot {
    fn from(row: &stock_level::Model) -> Self {
        Self {
            quantity: row.quantity,
            reserved: row.reserved_quantity,
            average_cost: row.average_cost,
        }
    }
}

/// Result of applying a signed quantity to a stock row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementOutcome {
    /// Signed quantity actually applied. Differs from the request only when
    /// a decrease was clamped.
    pub applied: Decimal,
    pub quantity: Decimal,
    pub available: Decimal,
    pub average_cost: Decimal,
    pub clamped: bool,
}

/// A decrease that would take available stock below zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shortfall {
    pub requested: Decimal,
    pub available: Decimal,
}

/// Applies `delta` to `snapshot`.
///
/// Decreases are checked against available (on hand minus reserved) stock.
/// Increases with a cost basis move the weighted average cost; increases
/// without one and all decreases leave it unchanged.
pub fn compute_movement(
    snapshot: &StockSnapshot,
    delta: Decimal,
    cost_basis: Option<Decimal>,
    policy: NegativeStockPolicy,
) -> Result<MovementOutcome, Shortfall> {
    let available = snapshot.available();
    let mut applied = delta;
    let mut clamped = false;

    if delta < Decimal::ZERO && -delta > available {
        match policy {
            NegativeStockPolicy::Reject => {
                return Err(Shortfall {
                    requested: -delta,
                    available,
                })
            }
            NegativeStockPolicy::Clamp => {
                applied = -available.max(Decimal::ZERO);
                clamped = true;
            }
        }
    }

    let quantity = snapshot.quantity + applied;
    let average_cost = match cost_basis {
        Some(cost) if applied > Decimal::ZERO => {
            weighted_average_cost(snapshot.quantity, snapshot.average_cost, applied, cost)
        }
        _ => snapshot.average_cost,
    };

    Ok(MovementOutcome {
        applied,
        quantity,
        available: quantity - snapshot.reserved,
        average_cost,
        clamped,
    })
}

/// `(q * avg + received * cost) / (q + received)`. Negative on-hand stock
/// does not contribute value.
pub fn weighted_average_cost(
    on_hand: Decimal,
    current_cost: Decimal,
    received: Decimal,
    unit_cost: Decimal,
) -> Decimal {
    let on_hand = on_hand.max(Decimal::ZERO);
    let total = on_hand + received;
    if total <= Decimal::ZERO {
        return unit_cost;
    }
    ((on_hand * current_cost + received * unit_cost) / total).round_dp(6)
}

fn describe_location(item_id: i64, warehouse_id: i64, bin_id: Option<i64>) -> String {
    match bin_id {
        Some(bin) => format!("item {} in warehouse {} bin {}", item_id, warehouse_id, bin),
        None => format!("item {} in warehouse {}", item_id, warehouse_id),
    }
}

pub(crate) fn insufficient_stock(
    item_id: i64,
    warehouse_id: i64,
    bin_id: Option<i64>,
    shortfall: Shortfall,
) -> ServiceError {
    ServiceError::InsufficientStock(format!(
        "{}: requested {}, available {}",
        describe_location(item_id, warehouse_id, bin_id),
        shortfall.requested.normalize(),
        shortfall.available.normalize()
    ))
}

/// Loads the stock row for a location, creating an empty one on first touch.
/// Callers must hold the ledger cursor lock of the (item, warehouse) pair.
pub(crate) async fn load_or_create_row<C: ConnectionTrait>(
    conn: &C,
    item_id: i64,
    warehouse_id: i64,
    bin_id: Option<i64>,
) -> Result<stock_level::Model, ServiceError> {
    let key = location_key(item_id, warehouse_id, bin_id);
    if let Some(row) = stock_level::Entity::find()
        .filter(stock_level::Column::LocationKey.eq(key.as_str()))
        .lock_exclusive()
        .one(conn)
        .await?
    {
        return Ok(row);
    }

    let now = Utc::now();
    stock_level::ActiveModel {
        location_key: Set(key),
        item_id: Set(item_id),
        warehouse_id: Set(warehouse_id),
        bin_id: Set(bin_id),
        quantity: Set(Decimal::ZERO),
        reserved_quantity: Set(Decimal::ZERO),
        available_quantity: Set(Decimal::ZERO),
        average_cost: Set(Decimal::ZERO),
        last_transaction_date: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(|e| ServiceError::from_row_race(e, "stock level"))
}

/// Applies a signed movement to one stock row and persists it.
pub(crate) async fn apply_movement<C: ConnectionTrait>(
    conn: &C,
    item_id: i64,
    warehouse_id: i64,
    bin_id: Option<i64>,
    delta: Decimal,
    cost_basis: Option<Decimal>,
    policy: NegativeStockPolicy,
) -> Result<(stock_level::Model, MovementOutcome), ServiceError> {
    let row = load_or_create_row(conn, item_id, warehouse_id, bin_id).await?;
    let snapshot = StockSnapshot::from(&row);

    let outcome = compute_movement(&snapshot, delta, cost_basis, policy)
        .map_err(|shortfall| insufficient_stock(item_id, warehouse_id, bin_id, shortfall))?;

    if outcome.clamped {
        warn!(
            item_id,
            warehouse_id,
            bin_id = ?bin_id,
            requested = %(-delta),
            applied = %(-outcome.applied),
            "decrease clamped to available stock"
        );
    }

    let now = Utc::now();
    let mut active = row.into_active_model();
    active.quantity = Set(outcome.quantity);
    active.available_quantity = Set(outcome.available);
    active.average_cost = Set(outcome.average_cost);
    active.last_transaction_date = Set(Some(now));
    active.updated_at = Set(now);
    let updated = active.update(conn).await?;

    Ok((updated, outcome))
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ReservationInput {
    #[validate(range(min = 1))]
    pub item_id: i64,
    #[validate(range(min = 1))]
    pub warehouse_id: i64,
    pub bin_id: Option<i64>,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StockFilter {
    pub item_id: Option<i64>,
    pub warehouse_id: Option<i64>,
    pub bin_id: Option<i64>,
}

/// Read side of the stock aggregate plus reservations.
#[derive(Clone)]
pub struct StockService {
    db: Arc<DatabaseConnection>,
}

impl StockService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Current stock rows matching `filter`, ordered by (item, warehouse, bin).
    #[instrument(skip(self))]
    pub async fn query(&self, filter: &StockFilter) -> Result<Vec<stock_level::Model>, ServiceError> {
        let mut query = stock_level::Entity::find();
        if let Some(item_id) = filter.item_id {
            query = query.filter(stock_level::Column::ItemId.eq(item_id));
        }
        if let Some(warehouse_id) = filter.warehouse_id {
            query = query.filter(stock_level::Column::WarehouseId.eq(warehouse_id));
        }
        if let Some(bin_id) = filter.bin_id {
            query = query.filter(stock_level::Column::BinId.eq(bin_id));
        }

        Ok(query
            .order_by_asc(stock_level::Column::ItemId)
            .order_by_asc(stock_level::Column::WarehouseId)
            .order_by_asc(stock_level::Column::BinId)
            .all(&*self.db)
            .await?)
    }

    /// Exact stock row for a location, if it was ever touched.
    pub async fn get(
        &self,
        item_id: i64,
        warehouse_id: i64,
        bin_id: Option<i64>,
    ) -> Result<Option<stock_level::Model>, ServiceError> {
        Ok(stock_level::Entity::find()
            .filter(stock_level::Column::LocationKey.eq(location_key(item_id, warehouse_id, bin_id)))
            .one(&*self.db)
            .await?)
    }

    /// Available quantity per item, summed over bins (and over warehouses
    /// when `warehouse_id` is `None`).
    pub async fn available_by_item<C: ConnectionTrait>(
        conn: &C,
        warehouse_id: Option<i64>,
    ) -> Result<HashMap<i64, Decimal>, ServiceError> {
        let mut query = stock_level::Entity::find();
        if let Some(warehouse_id) = warehouse_id {
            query = query.filter(stock_level::Column::WarehouseId.eq(warehouse_id));
        }

        let mut totals: HashMap<i64, Decimal> = HashMap::new();
        for row in query.all(conn).await? {
            *totals.entry(row.item_id).or_default() += row.available_quantity;
        }
        Ok(totals)
    }

    /// Sets aside `quantity` of available stock. No ledger entry is written.
    #[instrument(skip(self, input), fields(item_id = input.item_id, warehouse_id = input.warehouse_id))]
    pub async fn reserve(&self, input: ReservationInput) -> Result<stock_level::Model, ServiceError> {
        self.change_reservation(input, true).await
    }

    /// Returns previously reserved stock to available.
    #[instrument(skip(self, input), fields(item_id = input.item_id, warehouse_id = input.warehouse_id))]
    pub async fn release(&self, input: ReservationInput) -> Result<stock_level::Model, ServiceError> {
        self.change_reservation(input, false).await
    }

    async fn change_reservation(
        &self,
        input: ReservationInput,
        reserve: bool,
    ) -> Result<stock_level::Model, ServiceError> {
        input.validate()?;
        if input.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "quantity must be positive".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        registry::require_item(&txn, input.item_id).await?;
        registry::require_warehouse(&txn, input.warehouse_id).await?;
        if let Some(bin_id) = input.bin_id {
            registry::require_bin(&txn, input.warehouse_id, bin_id).await?;
        }

        ledger::lock_pairs(&txn, [(input.item_id, input.warehouse_id)]).await?;
        let row = load_or_create_row(&txn, input.item_id, input.warehouse_id, input.bin_id).await?;

        let reserved = if reserve {
            if input.quantity > row.available_quantity {
                return Err(insufficient_stock(
                    input.item_id,
                    input.warehouse_id,
                    input.bin_id,
                    Shortfall {
                        requested: input.quantity,
                        available: row.available_quantity,
                    },
                ));
            }
            row.reserved_quantity + input.quantity
        } else {
            if input.quantity > row.reserved_quantity {
                return Err(ServiceError::ValidationError(format!(
                    "cannot release {} from {}: only {} reserved",
                    input.quantity.normalize(),
                    describe_location(input.item_id, input.warehouse_id, input.bin_id),
                    row.reserved_quantity.normalize()
                )));
            }
            row.reserved_quantity - input.quantity
        };

        let quantity = row.quantity;
        let mut active = row.into_active_model();
        active.reserved_quantity = Set(reserved);
        active.available_quantity = Set(quantity - reserved);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!(
            reserved = %updated.reserved_quantity,
            available = %updated.available_quantity,
            "reservation {}",
            if reserve { "placed" } else { "released" }
        );
        Ok(updated)
    }
}
