//! Postgres counter rows.
//!
//! Each tenant schema holds a `document_sequences` table with one row per
//! document kind. Allocation is a single `INSERT … ON CONFLICT DO UPDATE …
//! RETURNING` statement: the upsert takes the row lock, which Postgres keeps
//! until the surrounding transaction ends, so concurrent allocators queue on
//! the row and a rollback undoes the increment.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | Database (any code) | `Backend` |
//! | PoolClosed / Io / other | `Backend` |
//! | invalid schema name (before any IO) | `TenantIsolation` |

use sqlx::{PgConnection, Row};
use tracing::{instrument, warn};

use praxis_core::TenantBinding;

use super::DocumentKind;
use crate::error::{StoreError, StoreResult};

/// Counter allocation against a tenant schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgSequenceCounter;

impl PgSequenceCounter {
    /// DDL for the counter table in one tenant schema.
    pub fn create_table_sql(schema: &str) -> StoreResult<String> {
        let schema = validated_schema(schema)?;
        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {schema}.document_sequences (\
             kind TEXT PRIMARY KEY, \
             next_number BIGINT NOT NULL CHECK (next_number >= 1))"
        ))
    }

    /// Insert-or-increment, returning the value before the increment.
    pub fn next_value_sql(schema: &str) -> StoreResult<String> {
        let schema = validated_schema(schema)?;
        Ok(format!(
            "INSERT INTO {schema}.document_sequences AS s (kind, next_number) \
             VALUES ($1, 2) \
             ON CONFLICT (kind) DO UPDATE SET next_number = s.next_number + 1 \
             RETURNING s.next_number - 1 AS allocated"
        ))
    }

    /// Allocate the next value inside the caller's open transaction.
    ///
    /// `conn` must be inside a transaction; the row lock (and the increment)
    /// last until that transaction commits or rolls back.
    #[instrument(skip(conn), fields(tenant_id = %binding.tenant_id, kind = %kind), err)]
    pub async fn next_value(
        conn: &mut PgConnection,
        binding: TenantBinding,
        kind: DocumentKind,
    ) -> StoreResult<u64> {
        let sql = Self::next_value_sql(&binding.schema_name())?;
        let row = sqlx::query(&sql)
            .bind(kind.as_str())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("next_value", e))?;
        let allocated: i64 = row
            .try_get("allocated")
            .map_err(|e| map_sqlx_error("next_value", e))?;
        u64::try_from(allocated)
            .map_err(|_| StoreError::Backend(format!("counter returned negative value {allocated}")))
    }
}

/// Schema names are interpolated into SQL, so only `tenant_<hex>`-style
/// identifiers are accepted.
fn validated_schema(schema: &str) -> StoreResult<&str> {
    let valid = !schema.is_empty()
        && schema.len() <= 63
        && schema
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && schema
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(schema)
    } else {
        warn!(schema, "rejected tenant schema name");
        Err(StoreError::TenantIsolation(format!("invalid schema name: {schema:?}")))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => StoreError::Backend(format!(
            "{operation}: database error {}: {}",
            db.code().as_deref().unwrap_or("unknown"),
            db.message()
        )),
        sqlx::Error::PoolClosed => StoreError::Backend(format!("{operation}: pool closed")),
        _ => StoreError::Backend(format!("{operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use praxis_core::{OrgId, TenantId};

    #[test]
    fn statement_targets_tenant_schema() {
        let binding = TenantBinding {
            tenant_id: TenantId::new(),
            org_id: OrgId::new(),
        };
        let schema = binding.schema_name();
        let sql = PgSequenceCounter::next_value_sql(&schema).unwrap();
        assert!(sql.starts_with(&format!("INSERT INTO {schema}.document_sequences")));
        assert!(sql.contains("ON CONFLICT (kind) DO UPDATE"));
        assert!(sql.contains("RETURNING s.next_number - 1"));
        assert!(PgSequenceCounter::create_table_sql(&schema).is_ok());
    }

    #[test]
    fn rejects_injected_schema_names() {
        for bad in ["", "public; DROP TABLE x", "Tenant_A", "1tenant", "tenant-a"] {
            assert!(
                matches!(
                    PgSequenceCounter::next_value_sql(bad),
                    Err(StoreError::TenantIsolation(_))
                ),
                "{bad} accepted"
            );
        }
    }
}
