//! Diesel-based receipt repository.
//!
//! OCR fields are kept as a JSON document in the `fields` column; the
//! server-owned attributes get their own columns.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{NewReceipt, ReceiptRecord};
use super::pool::{DbError, DbPool};
use super::util::parse_datetime;
use crate::models::{format_timestamp, OcrFields, Receipt};
use crate::schema::receipts;

impl From<ReceiptRecord> for Receipt {
    fn from(record: ReceiptRecord) -> Self {
        Receipt {
            id: record.id,
            owner: record.owner,
            image_url: record.image_url,
            uploaded_at: parse_datetime(&record.uploaded_at),
            fields: OcrFields::from_json_string(&record.fields),
        }
    }
}

/// Receipt persistence.
#[derive(Clone, Debug)]
pub struct DieselReceiptRepository {
    pool: DbPool,
}

impl DieselReceiptRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a new receipt. Receipts are immutable, so this never updates.
    pub async fn save(&self, receipt: &Receipt) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;

        let uploaded_at = format_timestamp(&receipt.uploaded_at);
        let fields = receipt.fields.to_json_string();

        diesel::insert_into(receipts::table)
            .values(NewReceipt {
                id: &receipt.id,
                owner: &receipt.owner,
                image_url: &receipt.image_url,
                uploaded_at: &uploaded_at,
                fields: &fields,
            })
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Get a receipt by ID.
    pub async fn get(&self, id: &str) -> Result<Option<Receipt>, DbError> {
        let mut conn = self.pool.get().await?;

        receipts::table
            .find(id)
            .select(ReceiptRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(Receipt::from))
    }

    /// Get all receipts in upload order.
    pub async fn get_all(&self) -> Result<Vec<Receipt>, DbError> {
        let mut conn = self.pool.get().await?;

        receipts::table
            .order((receipts::uploaded_at.asc(), receipts::id.asc()))
            .select(ReceiptRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(Receipt::from).collect())
    }

    /// Count stored receipts.
    pub async fn count(&self) -> Result<u64, DbError> {
        let mut conn = self.pool.get().await?;

        let count: i64 = receipts::table.count().get_result(&mut conn).await?;
        Ok(count as u64)
    }
}
