#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use stockledger_api::{
    config::{AppConfig, NegativeStockPolicy},
    db::{self, DbConfig},
    entities::{bin, item, warehouse},
    events::{Event, EventSender},
    handlers::AppServices,
    services::{
        posting::{DocumentDetails, GoodsReceiptInput, ReceiptLineInput},
        registry::{CreateBinInput, CreateItemInput, CreateWarehouseInput},
    },
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;

/// Application state over a fresh in-memory SQLite database with the event
/// channel kept open for inspection.
pub struct TestContext {
    router: Router,
    pub state: AppState,
    events: mpsc::Receiver<Event>,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_policy(NegativeStockPolicy::Reject).await
    }

    pub async fn with_policy(policy: NegativeStockPolicy) -> Self {
        Self::with_database(DbConfig::in_memory(), policy).await
    }

    /// Context over an arbitrary database, e.g. a file-backed SQLite pool.
    pub async fn with_database(db_config: DbConfig, policy: NegativeStockPolicy) -> Self {
        let pool = db::establish_connection_with_config(&db_config)
            .await
            .expect("failed to open database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let mut cfg = AppConfig::new(
            db_config.url.clone(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.negative_stock_policy = policy;
        cfg.posting_max_retries = 5;

        let (tx, rx) = mpsc::channel(4096);
        let state = AppState::new(Arc::new(pool), cfg, EventSender::new(tx));
        let router = stockledger_api::build_router(state.clone());

        Self {
            router,
            state,
            events: rx,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    /// Every event published so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub async fn item(&self, code: &str) -> item::Model {
        self.services()
            .registry
            .create_item(CreateItemInput {
                code: code.to_string(),
                name: format!("{} test item", code),
                uom: "EA".to_string(),
                min_level: None,
                max_level: None,
                reorder_level: None,
                default_supplier_id: None,
                requires_batch: false,
                requires_serial: false,
            })
            .await
            .expect("create item")
    }

    pub async fn item_with_reorder_level(&self, code: &str, reorder_level: Decimal) -> item::Model {
        self.services()
            .registry
            .create_item(CreateItemInput {
                code: code.to_string(),
                name: format!("{} test item", code),
                uom: "EA".to_string(),
                min_level: None,
                max_level: None,
                reorder_level: Some(reorder_level),
                default_supplier_id: None,
                requires_batch: false,
                requires_serial: false,
            })
            .await
            .expect("create item")
    }

    pub async fn warehouse(&self, code: &str) -> warehouse::Model {
        self.services()
            .registry
            .create_warehouse(CreateWarehouseInput {
                code: code.to_string(),
                name: format!("Warehouse {}", code),
            })
            .await
            .expect("create warehouse")
    }

    pub async fn bin(&self, warehouse_id: i64, code: &str) -> bin::Model {
        self.services()
            .registry
            .create_bin(
                warehouse_id,
                CreateBinInput {
                    code: code.to_string(),
                },
            )
            .await
            .expect("create bin")
    }

    /// Posts a single-line GRN.
    pub async fn receive(
        &self,
        item_id: i64,
        warehouse_id: i64,
        bin_id: Option<i64>,
        quantity: Decimal,
        unit_cost: Decimal,
    ) -> DocumentDetails {
        self.services()
            .posting
            .post_receipt(
                GoodsReceiptInput {
                    warehouse_id,
                    supplier_id: None,
                    purchase_order_id: None,
                    reference: None,
                    idempotency_key: None,
                    lines: vec![ReceiptLineInput {
                        item_id,
                        quantity,
                        bin_id,
                        unit_cost: Some(unit_cost),
                        purchase_order_line_id: None,
                        notes: None,
                    }],
                },
                "tester",
            )
            .await
            .expect("post receipt")
    }

    /// On-hand quantity of one location, zero when it was never touched.
    pub async fn on_hand(&self, item_id: i64, warehouse_id: i64, bin_id: Option<i64>) -> Decimal {
        self.services()
            .stock
            .get(item_id, warehouse_id, bin_id)
            .await
            .expect("stock lookup")
            .map(|row| row.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("x-user-id", "api-tester");
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, json)
    }
}
