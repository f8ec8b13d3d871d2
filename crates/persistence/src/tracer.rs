//! Async, ScyllaDB-backed implementation of `core::Tracer` (§4.14).
//!
//! `record_run`/`record_span` are synchronous and fire-and-forget: they push
//! onto a bounded channel and never block the pipeline. A single background
//! task drains the channel and writes to ScyllaDB; write failures are
//! logged, never surfaced back to the caller.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use voice_agent_core::{truncate_field, TraceRun, TraceSpan, Tracer};

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

enum TraceMessage {
    Run(TraceRun),
    Span(TraceSpan),
}

pub struct AsyncTracer {
    tx: mpsc::Sender<TraceMessage>,
    writer: JoinHandle<()>,
}

impl AsyncTracer {
    pub fn new(client: ScyllaClient, channel_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(channel_capacity);
        let writer = tokio::spawn(run_writer(client, rx));
        Self { tx, writer }
    }

    /// Stops accepting new trace events and waits for the writer task to
    /// drain whatever is left in the channel. Used during graceful shutdown
    /// (§10.6); the caller must hold the only outstanding reference.
    pub async fn close(self) {
        drop(self.tx);
        let _ = self.writer.await;
    }
}

impl Tracer for AsyncTracer {
    fn record_run(&self, run: TraceRun) {
        let run = TraceRun {
            transcript: truncate_field(&run.transcript),
            response: truncate_field(&run.response),
            ..run
        };
        if self.tx.try_send(TraceMessage::Run(run)).is_err() {
            tracing::warn!("tracer: channel full, dropping run");
        }
    }

    fn record_span(&self, span: TraceSpan) {
        let span = TraceSpan {
            input: truncate_field(&span.input),
            output: truncate_field(&span.output),
            error_msg: span.error_msg.as_deref().map(truncate_field),
            ..span
        };
        if self.tx.try_send(TraceMessage::Span(span)).is_err() {
            tracing::warn!("tracer: channel full, dropping span");
        }
    }
}

async fn run_writer(client: ScyllaClient, mut rx: mpsc::Receiver<TraceMessage>) {
    while let Some(message) = rx.recv().await {
        let result = match message {
            TraceMessage::Run(run) => write_run(&client, &run).await,
            TraceMessage::Span(span) => write_span(&client, &span).await,
        };
        if let Err(err) = result {
            tracing::warn!(error = %err, "tracer: write failed");
        }
    }
}

async fn write_run(client: &ScyllaClient, run: &TraceRun) -> Result<(), PersistenceError> {
    let query = format!(
        "INSERT INTO {}.trace_runs (session_id, started_at, id, duration_ms, transcript, response, status) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        client.keyspace()
    );
    client
        .session()
        .query_unpaged(
            query,
            (
                &run.session_id,
                run.started_at.to_rfc3339(),
                &run.id,
                run.duration_ms as i64,
                &run.transcript,
                &run.response,
                status_str(&run.status),
            ),
        )
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;
    Ok(())
}

async fn write_span(client: &ScyllaClient, span: &TraceSpan) -> Result<(), PersistenceError> {
    let query = format!(
        "INSERT INTO {}.trace_spans (run_id, started_at, id, name, duration_ms, input, output, status, error_msg) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        client.keyspace()
    );
    client
        .session()
        .query_unpaged(
            query,
            (
                &span.run_id,
                span.started_at.to_rfc3339(),
                &span.id,
                &span.name,
                span.duration_ms as i64,
                &span.input,
                &span.output,
                status_str(&span.status),
                &span.error_msg,
            ),
        )
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;
    Ok(())
}

fn status_str(status: &voice_agent_core::RunStatus) -> &'static str {
    match status {
        voice_agent_core::RunStatus::Ok => "ok",
        voice_agent_core::RunStatus::Filtered => "filtered",
        voice_agent_core::RunStatus::Error => "error",
    }
}
