//! Output contracts for decoded telemetry.
//!
//! Sinks are external consumers (CSV/JSON exporters, log forwarders, artifact
//! egress, graph builders). They are invoked sequentially by the single
//! session reader and must not block indefinitely, or the whole session
//! stalls.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::client::ByteStream;
use crate::session::payload::CounterPayload;

/// Receives decoded counter samples, one call per in-filter event.
pub trait MetricsSink: Send + Sync {
    fn record(&self, provider: &str, payload: &CounterPayload);
}

/// Severity of a structured log record, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
}

/// One structured log record decoded from the session.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub category: String,
    pub level: LogLevel,
    pub event_id: i64,
    pub message: String,
    /// The record's named arguments, JSON-encoded by the target, if any.
    pub arguments_json: Option<String>,
}

/// Receives decoded log records.
pub trait LogSink: Send + Sync {
    fn write(&self, record: &LogRecord);
}

/// Consumes the raw byte stream of a trace session, for whole-trace egress.
pub trait StreamSink: Send + Sync {
    fn consume(
        &self,
        stream: ByteStream,
        token: CancellationToken,
    ) -> BoxFuture<'static, anyhow::Result<()>>;
}

/// A mutable object-graph builder, populated as a side effect of GC dump
/// processing. Graph construction itself happens behind this trait and is out
/// of scope for this crate; the processor forwards the raw bulk payloads in
/// the order the target emitted them.
pub trait GraphSink: Send + Sync {
    /// Object-node data from a `GCBulkNode` event.
    fn append_nodes(&self, data: &[u8]);
    /// Reference-edge data from a `GCBulkEdge` event.
    fn append_edges(&self, data: &[u8]);
    /// Type data from a `GCBulkType` event.
    fn append_types(&self, data: &[u8]);
}
