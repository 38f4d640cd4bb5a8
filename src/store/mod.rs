//! Record stores backing the service-order table.
//!
//! A store only moves raw rows; typing happens in [`crate::records`].

mod memory;
mod sheets;
mod sqlite;

pub use memory::MemoryStore;
pub use sheets::{SheetsConfig, SheetsStore, TokenSource};
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::records::{row_order_id, RawRecord};

pub trait OrderStore: Send + Sync {
    /// Short name for logs and the health endpoint.
    fn backend_name(&self) -> &'static str;

    /// Every stored row, in storage order.
    fn read_all(&self) -> Result<Vec<RawRecord>, StoreError>;

    /// Replace the whole table.
    fn write_all(&self, rows: &[RawRecord]) -> Result<(), StoreError>;

    /// Insert or replace the row carrying the same `order_id`.
    ///
    /// The default reads the full table, swaps the row and writes everything
    /// back, so a concurrent writer's unseen changes are lost. Backends that
    /// can address a single row override this.
    fn upsert(&self, row: &RawRecord) -> Result<(), StoreError> {
        let mut rows = self.read_all()?;
        replace_or_push(&mut rows, row);
        self.write_all(&rows)
    }
}

pub(crate) fn replace_or_push(rows: &mut Vec<RawRecord>, row: &RawRecord) {
    let id = row_order_id(row);
    match rows.iter_mut().find(|r| row_order_id(r) == id) {
        Some(existing) => *existing = row.clone(),
        None => rows.push(row.clone()),
    }
}
