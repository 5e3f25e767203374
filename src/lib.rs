//! receiptd - receipt OCR and expense analysis.
//!
//! Receipt images are uploaded over HTTP, run through an external OCR
//! script, and stored in SQLite. An external analysis script summarises
//! all stored receipts and renders charts.

pub mod cli;
pub mod config;
pub mod models;
pub mod repository;
pub mod schema;
pub mod server;
pub mod services;
pub mod storage;
