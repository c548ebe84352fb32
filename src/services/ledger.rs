use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    config::NegativeStockPolicy,
    entities::{
        ledger_balance,
        ledger_entry::{self, LedgerTransactionType},
        stock_level,
    },
    errors::ServiceError,
    services::stock::{self, MovementOutcome},
};

/// Ensures the running-balance cursor of every pair exists and locks them
/// in ascending (item, warehouse) order.
pub async fn lock_pairs<C, I>(
    conn: &C,
    pairs: I,
) -> Result<BTreeMap<(i64, i64), ledger_balance::Model>, ServiceError>
where
    C: ConnectionTrait,
    I: IntoIterator<Item = (i64, i64)>,
{
    let ordered: BTreeSet<(i64, i64)> = pairs.into_iter().collect();
    let mut cursors = BTreeMap::new();

    for (item_id, warehouse_id) in ordered {
        ledger_balance::Entity::insert(ledger_balance::ActiveModel {
            item_id: Set(item_id),
            warehouse_id: Set(warehouse_id),
            balance: Set(Decimal::ZERO),
            entry_count: Set(0),
            last_entry_id: Set(None),
            updated_at: Set(Utc::now()),
        })
        .on_conflict(
            OnConflict::columns([
                ledger_balance::Column::ItemId,
                ledger_balance::Column::WarehouseId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

        let cursor = ledger_balance::Entity::find_by_id((item_id, warehouse_id))
            .lock_exclusive()
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "ledger cursor for item {} warehouse {} missing after upsert",
                    item_id, warehouse_id
                ))
            })?;
        cursors.insert((item_id, warehouse_id), cursor);
    }

    Ok(cursors)
}

/// How the unit cost of an inbound movement is determined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CostBasis {
    /// Leave the row's average cost unchanged.
    Keep,
    Explicit(Decimal),
}

/// One signed stock movement to be applied and recorded.
#[derive(Debug, Clone)]
pub struct Movement {
    pub transaction_type: LedgerTransactionType,
    pub item_id: i64,
    pub warehouse_id: i64,
    pub bin_id: Option<i64>,
    pub delta: Decimal,
    pub cost_basis: CostBasis,
    pub work_order_id: Option<i64>,
    pub reference: Option<String>,
}

/// Ledger entry written for a movement together with the resulting row.
#[derive(Debug, Clone)]
pub struct PostedMovement {
    pub entry: ledger_entry::Model,
    pub stock: stock_level::Model,
    pub outcome: MovementOutcome,
}

/// Applies movements inside one database transaction while the cursors of
/// all touched (item, warehouse) pairs are locked. Stock rows and ledger
/// entries are written together, so the ledger's running balances always
/// agree with the aggregate.
pub struct LedgerSession<'a, C: ConnectionTrait> {
    conn: &'a C,
    cursors: BTreeMap<(i64, i64), ledger_balance::Model>,
    policy: NegativeStockPolicy,
    voucher_number: String,
    document_id: Option<i64>,
    created_by: String,
    posted: Vec<PostedMovement>,
}

impl<'a, C: ConnectionTrait> LedgerSession<'a, C> {
    pub async fn open<I>(
        conn: &'a C,
        pairs: I,
        policy: NegativeStockPolicy,
        voucher_number: impl Into<String>,
        document_id: Option<i64>,
        created_by: impl Into<String>,
    ) -> Result<Self, ServiceError>
    where
        I: IntoIterator<Item = (i64, i64)>,
    {
        let cursors = lock_pairs(conn, pairs).await?;
        Ok(Self {
            conn,
            cursors,
            policy,
            voucher_number: voucher_number.into(),
            document_id,
            created_by: created_by.into(),
            posted: Vec::new(),
        })
    }

    /// Applies `movement` to its stock row and appends the ledger entry.
    pub async fn post(&mut self, movement: Movement) -> Result<PostedMovement, ServiceError> {
        let pair = (movement.item_id, movement.warehouse_id);
        let cursor_balance = self
            .cursors
            .get(&pair)
            .map(|c| c.balance)
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "movement for item {} warehouse {} outside locked pairs",
                    pair.0, pair.1
                ))
            })?;

        let cost = match movement.cost_basis {
            CostBasis::Keep => None,
            CostBasis::Explicit(cost) => Some(cost),
        };

        let (row, outcome) = stock::apply_movement(
            self.conn,
            movement.item_id,
            movement.warehouse_id,
            movement.bin_id,
            movement.delta,
            cost,
            self.policy,
        )
        .await?;

        let applied = outcome.applied;
        let unit_cost = if applied > Decimal::ZERO {
            cost.unwrap_or(row.average_cost)
        } else {
            row.average_cost
        };
        let running_balance = cursor_balance + applied;

        let entry = ledger_entry::ActiveModel {
            transaction_type: Set(movement.transaction_type),
            voucher_number: Set(self.voucher_number.clone()),
            document_id: Set(self.document_id),
            item_id: Set(movement.item_id),
            warehouse_id: Set(movement.warehouse_id),
            bin_id: Set(movement.bin_id),
            quantity_in: Set(applied.max(Decimal::ZERO)),
            quantity_out: Set((-applied).max(Decimal::ZERO)),
            unit_cost: Set(Some(unit_cost)),
            running_balance: Set(running_balance),
            bin_balance: Set(row.quantity),
            work_order_id: Set(movement.work_order_id),
            reference: Set(movement.reference),
            created_by: Set(self.created_by.clone()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.conn)
        .await?;

        if let Some(cursor) = self.cursors.get_mut(&pair) {
            cursor.balance = running_balance;
            cursor.entry_count += 1;
            cursor.last_entry_id = Some(entry.id);
        }

        counter!("stockledger.ledger_entries_appended", 1);
        debug!(
            voucher = %self.voucher_number,
            entry_id = entry.id,
            running_balance = %running_balance,
            "ledger entry appended"
        );

        let posted = PostedMovement {
            entry,
            stock: row,
            outcome,
        };
        self.posted.push(posted.clone());
        Ok(posted)
    }

    /// Persists the advanced cursors. The caller still owns the commit.
    pub async fn close(self) -> Result<SessionSummary, ServiceError> {
        let now = Utc::now();
        let mut balances = BTreeMap::new();
        for (pair, cursor) in self.cursors {
            balances.insert(pair, cursor.balance);
            if cursor.last_entry_id.is_none() {
                continue;
            }
            let mut active = cursor.clone().into_active_model();
            active.balance = Set(cursor.balance);
            active.entry_count = Set(cursor.entry_count);
            active.last_entry_id = Set(cursor.last_entry_id);
            active.updated_at = Set(now);
            active.update(self.conn).await?;
        }

        Ok(SessionSummary {
            balances,
            movements: self.posted,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// On-hand balance per (item, warehouse) after the session.
    pub balances: BTreeMap<(i64, i64), Decimal>,
    pub movements: Vec<PostedMovement>,
}

impl SessionSummary {
    pub fn entries(&self) -> Vec<ledger_entry::Model> {
        self.movements.iter().map(|m| m.entry.clone()).collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LedgerFilter {
    pub item_id: Option<i64>,
    pub warehouse_id: Option<i64>,
    pub transaction_type: Option<LedgerTransactionType>,
    pub voucher_number: Option<String>,
    pub work_order_id: Option<i64>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

/// Agreement check between cursor, ledger entries and stock rows of one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub item_id: i64,
    pub warehouse_id: i64,
    pub cursor_balance: Decimal,
    pub last_running_balance: Decimal,
    pub ledger_net_movement: Decimal,
    pub stock_on_hand: Decimal,
    pub entry_count: i64,
    pub bins: Vec<BinReconciliation>,
    pub is_consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinReconciliation {
    pub bin_id: Option<i64>,
    pub ledger_net_movement: Decimal,
    pub stock_quantity: Decimal,
}

const DEFAULT_LEDGER_LIMIT: u64 = 500;

#[derive(Clone)]
pub struct LedgerService {
    db: Arc<DatabaseConnection>,
}

impl LedgerService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Ledger entries matching `filter`, newest first.
    #[instrument(skip(self))]
    pub async fn query(&self, filter: &LedgerFilter) -> Result<Vec<ledger_entry::Model>, ServiceError> {
        let mut query = ledger_entry::Entity::find();
        if let Some(item_id) = filter.item_id {
            query = query.filter(ledger_entry::Column::ItemId.eq(item_id));
        }
        if let Some(warehouse_id) = filter.warehouse_id {
            query = query.filter(ledger_entry::Column::WarehouseId.eq(warehouse_id));
        }
        if let Some(transaction_type) = filter.transaction_type {
            query = query.filter(ledger_entry::Column::TransactionType.eq(transaction_type));
        }
        if let Some(voucher) = &filter.voucher_number {
            query = query.filter(ledger_entry::Column::VoucherNumber.eq(voucher.as_str()));
        }
        if let Some(work_order_id) = filter.work_order_id {
            query = query.filter(ledger_entry::Column::WorkOrderId.eq(work_order_id));
        }
        if let Some(from) = filter.date_from {
            query = query.filter(ledger_entry::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.date_to {
            query = query.filter(ledger_entry::Column::CreatedAt.lte(to));
        }

        Ok(query
            .order_by_desc(ledger_entry::Column::Id)
            .limit(filter.limit.unwrap_or(DEFAULT_LEDGER_LIMIT))
            .all(&*self.db)
            .await?)
    }

    /// All entries of a pair in posting order.
    pub async fn history(
        &self,
        item_id: i64,
        warehouse_id: i64,
    ) -> Result<Vec<ledger_entry::Model>, ServiceError> {
        Ok(ledger_entry::Entity::find()
            .filter(ledger_entry::Column::ItemId.eq(item_id))
            .filter(ledger_entry::Column::WarehouseId.eq(warehouse_id))
            .order_by_asc(ledger_entry::Column::Id)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn reconcile(
        &self,
        item_id: i64,
        warehouse_id: i64,
    ) -> Result<ReconciliationReport, ServiceError> {
        let cursor = ledger_balance::Entity::find_by_id((item_id, warehouse_id))
            .one(&*self.db)
            .await?;
        let entries = self.history(item_id, warehouse_id).await?;
        let rows = stock_level::Entity::find()
            .filter(stock_level::Column::ItemId.eq(item_id))
            .filter(stock_level::Column::WarehouseId.eq(warehouse_id))
            .all(&*self.db)
            .await?;

        let mut per_bin: BTreeMap<Option<i64>, Decimal> = BTreeMap::new();
        for entry in &entries {
            *per_bin.entry(entry.bin_id).or_default() += entry.net_quantity();
        }
        for row in &rows {
            per_bin.entry(row.bin_id).or_default();
        }

        let bins: Vec<BinReconciliation> = per_bin
            .into_iter()
            .map(|(bin_id, net)| BinReconciliation {
                bin_id,
                ledger_net_movement: net,
                stock_quantity: rows
                    .iter()
                    .find(|r| r.bin_id == bin_id)
                    .map(|r| r.quantity)
                    .unwrap_or_default(),
            })
            .collect();

        let ledger_net_movement: Decimal = entries.iter().map(|e| e.net_quantity()).sum();
        let stock_on_hand: Decimal = rows.iter().map(|r| r.quantity).sum();
        let last_running_balance = entries.last().map(|e| e.running_balance).unwrap_or_default();
        let cursor_balance = cursor.as_ref().map(|c| c.balance).unwrap_or_default();
        let entry_count = cursor.as_ref().map(|c| c.entry_count).unwrap_or_default();

        let is_consistent = cursor_balance == ledger_net_movement
            && last_running_balance == ledger_net_movement
            && stock_on_hand == ledger_net_movement
            && entry_count == entries.len() as i64
            && bins.iter().all(|b| b.ledger_net_movement == b.stock_quantity);

        Ok(ReconciliationReport {
            item_id,
            warehouse_id,
            cursor_balance,
            last_running_balance,
            ledger_net_movement,
            stock_on_hand,
            entry_count,
            bins,
            is_consistent,
        })
    }
}
