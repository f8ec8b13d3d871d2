//! ScyllaDB schema for the async tracer's two tables (§4.14): one row per
//! pipeline run, one row per span within a run.

use scylla::Session;

use crate::error::PersistenceError;

pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create keyspace: {e}")))?;

    Ok(())
}

pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    let trace_runs = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.trace_runs (
            session_id TEXT,
            started_at TEXT,
            id TEXT,
            duration_ms BIGINT,
            transcript TEXT,
            response TEXT,
            status TEXT,
            PRIMARY KEY ((session_id), started_at, id)
        ) WITH CLUSTERING ORDER BY (started_at DESC, id ASC)
        "#,
        keyspace
    );

    session
        .query_unpaged(trace_runs, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create trace_runs table: {e}")))?;

    let trace_spans = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.trace_spans (
            run_id TEXT,
            started_at TEXT,
            id TEXT,
            name TEXT,
            duration_ms BIGINT,
            input TEXT,
            output TEXT,
            status TEXT,
            error_msg TEXT,
            PRIMARY KEY ((run_id), started_at, id)
        ) WITH CLUSTERING ORDER BY (started_at DESC, id ASC)
        "#,
        keyspace
    );

    session
        .query_unpaged(trace_spans, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create trace_spans table: {e}")))?;

    tracing::info!("tracer tables created");
    Ok(())
}
