//! Data models for receiptd.

mod analysis;
mod receipt;

pub use analysis::{AnalysisReport, ChartKind, CHART_KINDS};
pub use receipt::{format_timestamp, OcrFields, OcrFieldsError, Receipt, RESERVED_FIELDS};
