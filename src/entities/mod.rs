// Reference data
pub mod bin;
pub mod item;
pub mod warehouse;

// Stock aggregates and the transaction ledger
pub mod ledger_balance;
pub mod ledger_entry;
pub mod stock_level;

// Documents
pub mod document_sequence;
pub mod stock_document;
pub mod stock_document_line;

// Manufacturing and procurement
pub mod bom;
pub mod bom_line;
pub mod purchase_order;
pub mod purchase_order_line;
pub mod work_order;
