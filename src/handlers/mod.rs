pub mod bom;
pub mod common;
pub mod documents;
pub mod health;
pub mod ledger;
pub mod purchase_orders;
pub mod registry;
pub mod stock;
pub mod work_orders;

use std::sync::Arc;

use crate::{
    db::DbPool,
    events::EventSender,
    services::{
        bom::BomService,
        document_numbers::DocumentNumberService,
        ledger::LedgerService,
        posting::{PostingOptions, PostingService},
        procurement::PurchaseOrderService,
        registry::RegistryService,
        stock::StockService,
        work_orders::WorkOrderService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub registry: Arc<RegistryService>,
    pub stock: Arc<StockService>,
    pub ledger: Arc<LedgerService>,
    pub document_numbers: Arc<DocumentNumberService>,
    pub posting: Arc<PostingService>,
    pub bom: Arc<BomService>,
    pub work_orders: Arc<WorkOrderService>,
    pub purchase_orders: Arc<PurchaseOrderService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender, options: PostingOptions) -> Self {
        let posting = PostingService::new(db_pool.clone(), event_sender.clone(), options);
        let work_orders = WorkOrderService::new(db_pool.clone(), posting.clone(), event_sender);

        Self {
            registry: Arc::new(RegistryService::new(db_pool.clone())),
            stock: Arc::new(StockService::new(db_pool.clone())),
            ledger: Arc::new(LedgerService::new(db_pool.clone())),
            document_numbers: Arc::new(DocumentNumberService::new(db_pool.clone())),
            posting: Arc::new(posting),
            bom: Arc::new(BomService::new(db_pool.clone())),
            work_orders: Arc::new(work_orders),
            purchase_orders: Arc::new(PurchaseOrderService::new(db_pool)),
        }
    }
}
