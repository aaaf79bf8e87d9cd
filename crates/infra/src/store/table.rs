use std::collections::HashMap;
use std::hash::Hash;

use praxis_core::TenantId;

/// Tenant-isolated rows, listed in insertion order.
#[derive(Debug)]
pub(crate) struct TenantTable<K, V> {
    rows: HashMap<(TenantId, K), (u64, V)>,
    inserted: u64,
}

impl<K, V> Default for TenantTable<K, V> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            inserted: 0,
        }
    }
}

impl<K, V> TenantTable<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    pub(crate) fn get(&self, tenant_id: TenantId, key: &K) -> Option<&V> {
        self.rows.get(&(tenant_id, key.clone())).map(|(_, v)| v)
    }

    /// Replacing a row keeps its original position.
    pub(crate) fn upsert(&mut self, tenant_id: TenantId, key: K, value: V) {
        match self.rows.get_mut(&(tenant_id, key.clone())) {
            Some((_, existing)) => *existing = value,
            None => {
                self.inserted += 1;
                self.rows.insert((tenant_id, key), (self.inserted, value));
            }
        }
    }

    /// Committed rows overlaid with a transaction's pending writes.
    pub(crate) fn list_with(
        &self,
        tenant_id: TenantId,
        staged: &Staged<K, V>,
        mut keep: impl FnMut(&V) -> bool,
    ) -> Vec<V> {
        let mut committed: Vec<(u64, &K, &V)> = self
            .rows
            .iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .map(|((_, k), (seq, v))| (*seq, k, v))
            .collect();
        committed.sort_by_key(|(seq, _, _)| *seq);

        let mut out: Vec<V> = committed
            .iter()
            .map(|&(_, k, v)| staged.get(k).unwrap_or(v))
            .filter(|v| keep(*v))
            .cloned()
            .collect();
        out.extend(
            staged
                .iter()
                .filter(|&(k, _)| self.get(tenant_id, k).is_none())
                .map(|(_, v)| v)
                .filter(|v| keep(*v))
                .cloned(),
        );
        out
    }

    pub(crate) fn apply(&mut self, tenant_id: TenantId, staged: Staged<K, V>) {
        for (key, value) in staged.rows {
            self.upsert(tenant_id, key, value);
        }
    }
}

/// Pending writes of one transaction to one table, in write order.
#[derive(Debug)]
pub(crate) struct Staged<K, V> {
    rows: Vec<(K, V)>,
}

impl<K, V> Default for Staged<K, V> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<K: Eq, V> Staged<K, V> {
    pub(crate) fn get(&self, key: &K) -> Option<&V> {
        self.rows.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub(crate) fn put(&mut self, key: K, value: V) {
        match self.rows.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.rows.push((key, value)),
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.rows.iter().map(|(k, v)| (k, v))
    }
}
