//! Counter allocation against a live Postgres.
//!
//! Runs only when `PRAXIS_TEST_DATABASE_URL` points at a database the test
//! may create and drop schemas in; otherwise each test returns early.

use sqlx::PgPool;

use praxis_core::{OrgId, TenantBinding, TenantId};
use praxis_infra::DocumentKind;
use praxis_infra::sequence::PgSequenceCounter;

async fn tenant_schema() -> Option<(PgPool, TenantBinding)> {
    let Ok(url) = std::env::var("PRAXIS_TEST_DATABASE_URL") else {
        eprintln!("PRAXIS_TEST_DATABASE_URL not set, skipping");
        return None;
    };
    let pool = PgPool::connect(&url).await.unwrap();
    let binding = TenantBinding {
        tenant_id: TenantId::new(),
        org_id: OrgId::new(),
    };
    let schema = binding.schema_name();
    sqlx::query(&format!("CREATE SCHEMA {schema}"))
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(&PgSequenceCounter::create_table_sql(&schema).unwrap())
        .execute(&pool)
        .await
        .unwrap();
    Some((pool, binding))
}

async fn drop_schema(pool: &PgPool, binding: TenantBinding) {
    sqlx::query(&format!("DROP SCHEMA {} CASCADE", binding.schema_name()))
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test(flavor = "current_thread")]
async fn rollback_returns_the_number_and_kinds_count_apart() {
    let Some((pool, binding)) = tenant_schema().await else {
        return;
    };

    let mut tx = pool.begin().await.unwrap();
    assert_eq!(PgSequenceCounter::next_value(&mut tx, binding, DocumentKind::Invoice).await.unwrap(), 1);
    assert_eq!(PgSequenceCounter::next_value(&mut tx, binding, DocumentKind::Invoice).await.unwrap(), 2);
    tx.rollback().await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    assert_eq!(PgSequenceCounter::next_value(&mut tx, binding, DocumentKind::Invoice).await.unwrap(), 1);
    assert_eq!(PgSequenceCounter::next_value(&mut tx, binding, DocumentKind::Proposal).await.unwrap(), 1);
    tx.commit().await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    assert_eq!(PgSequenceCounter::next_value(&mut tx, binding, DocumentKind::Invoice).await.unwrap(), 2);
    tx.commit().await.unwrap();

    drop_schema(&pool, binding).await;
}

#[tokio::test(flavor = "current_thread")]
async fn open_allocation_makes_the_next_allocator_wait() {
    let Some((pool, binding)) = tenant_schema().await else {
        return;
    };

    let mut holder = pool.begin().await.unwrap();
    assert_eq!(PgSequenceCounter::next_value(&mut holder, binding, DocumentKind::Invoice).await.unwrap(), 1);

    let waiter_pool = pool.clone();
    let waiter = tokio::spawn(async move {
        let mut tx = waiter_pool.begin().await.unwrap();
        let value = PgSequenceCounter::next_value(&mut tx, binding, DocumentKind::Invoice).await.unwrap();
        tx.commit().await.unwrap();
        value
    });

    // The waiter queues on the row until the holder commits.
    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());
    holder.commit().await.unwrap();
    assert_eq!(waiter.await.unwrap(), 2);

    drop_schema(&pool, binding).await;
}
