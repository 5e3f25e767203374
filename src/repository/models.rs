//! Diesel row types.

use diesel::prelude::*;

use crate::schema;

/// Receipt record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::receipts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReceiptRecord {
    pub id: String,
    pub owner: String,
    pub image_url: String,
    pub uploaded_at: String,
    pub fields: String,
}

/// New receipt for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::receipts)]
pub struct NewReceipt<'a> {
    pub id: &'a str,
    pub owner: &'a str,
    pub image_url: &'a str,
    pub uploaded_at: &'a str,
    pub fields: &'a str,
}
