use std::sync::Mutex;

use super::{replace_or_push, OrderStore};
use crate::error::StoreError;
use crate::records::RawRecord;

/// In-process table. Used by tests and `backend = "memory"` demos.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<RawRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<RawRecord>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }
}

impl OrderStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn read_all(&self) -> Result<Vec<RawRecord>, StoreError> {
        let rows = self.rows.lock().map_err(|_| StoreError::Lock)?;
        Ok(rows.clone())
    }

    fn write_all(&self, rows: &[RawRecord]) -> Result<(), StoreError> {
        let mut guard = self.rows.lock().map_err(|_| StoreError::Lock)?;
        *guard = rows.to_vec();
        Ok(())
    }

    fn upsert(&self, row: &RawRecord) -> Result<(), StoreError> {
        let mut guard = self.rows.lock().map_err(|_| StoreError::Lock)?;
        replace_or_push(&mut guard, row);
        Ok(())
    }
}
