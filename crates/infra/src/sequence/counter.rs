//! In-process counter rows with row-level locking.
//!
//! A transaction that advances a counter keeps the row locked until it
//! commits or rolls back. Other transactions allocating from the same row
//! block on a condition variable meanwhile. Rolling back restores the value
//! the row had when the transaction first locked it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use praxis_core::TenantId;

use super::DocumentKind;
use crate::error::{StoreError, StoreResult};

/// Identity of a transaction holding counter locks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TxId(u64);

type CounterKey = (TenantId, DocumentKind);

#[derive(Debug)]
struct CounterRow {
    next: u64,
    holder: Option<TxId>,
    restore_to: u64,
}

impl CounterRow {
    fn new() -> Self {
        Self {
            next: 1,
            holder: None,
            restore_to: 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct CounterTable {
    rows: Mutex<HashMap<CounterKey, CounterRow>>,
    released: Condvar,
    next_tx: AtomicU64,
}

impl CounterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> TxId {
        TxId(self.next_tx.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Return the row's current value and advance it, locking the row for `tx`.
    ///
    /// The row is created with value 1 on first use.
    pub fn next_value(&self, tx: TxId, tenant_id: TenantId, kind: DocumentKind) -> StoreResult<u64> {
        let key = (tenant_id, kind);
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::Poisoned("sequence counters"))?;
        loop {
            let row = rows.entry(key).or_insert_with(CounterRow::new);
            let holder = row.holder;
            match holder {
                Some(other) if other != tx => {
                    rows = self
                        .released
                        .wait(rows)
                        .map_err(|_| StoreError::Poisoned("sequence counters"))?;
                }
                _ => {
                    if holder.is_none() {
                        row.holder = Some(tx);
                        row.restore_to = row.next;
                    }
                    let value = row.next;
                    row.next += 1;
                    return Ok(value);
                }
            }
        }
    }

    /// Keep the advanced values and unlock every row `tx` holds.
    pub fn commit(&self, tx: TxId) -> StoreResult<()> {
        self.release(tx, false)
    }

    /// Restore every row `tx` advanced and unlock it.
    pub fn rollback(&self, tx: TxId) -> StoreResult<()> {
        self.release(tx, true)
    }

    fn release(&self, tx: TxId, restore: bool) -> StoreResult<()> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::Poisoned("sequence counters"))?;
        for row in rows.values_mut().filter(|r| r.holder == Some(tx)) {
            if restore {
                row.next = row.restore_to;
            }
            row.holder = None;
        }
        drop(rows);
        self.released.notify_all();
        Ok(())
    }

    /// Value the next committed allocation would receive.
    pub fn peek(&self, tenant_id: TenantId, kind: DocumentKind) -> StoreResult<u64> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::Poisoned("sequence counters"))?;
        Ok(rows.get(&(tenant_id, kind)).map_or(1, |r| r.next))
    }
}
