//! HTTP request handlers.

mod analysis;
mod receipts;

pub use analysis::expense_analysis;
pub use receipts::{list_receipts, upload_receipt};
