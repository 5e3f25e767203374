//! Service layer for receiptd business logic.
//!
//! Services wrap the external OCR and analysis scripts and the intake
//! workflow. They are used by the web server and the CLI.

pub mod analysis;
pub mod ocr;
pub mod receipts;
pub mod runner;

pub use analysis::{ExpenseAnalyzer, ScriptAnalyzer};
pub use ocr::{OcrEngine, ScriptOcrEngine};
pub use receipts::{ImageUpload, IntakeError, ReceiptIntake};
pub use runner::{JobPool, ScriptError, ScriptRunner};
