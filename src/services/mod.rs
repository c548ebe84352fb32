// Reference data
pub mod registry;

// Stock aggregate and ledger
pub mod ledger;
pub mod stock;

// Documents
pub mod document_numbers;
pub mod posting;

// Manufacturing and procurement
pub mod bom;
pub mod procurement;
pub mod work_orders;
