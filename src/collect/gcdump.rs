//! GC heap dump collection.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::DiagnosticsClient;
use crate::pipeline::{Pipeline, PipelineError};
use crate::session::{ProcessorStages, SessionMode, SessionProcessor};
use crate::sink::GraphSink;

/// Settings of a GC dump pipeline. The mode has no extra parameters: the
/// session requests the heap-snapshot keywords and ends when the dump has
/// been emitted (or the duration elapses).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcDumpPipelineSettings {
    pub process_id: u32,
    /// Upper bound on the dump collection. `None` runs until stopped.
    pub duration: Option<Duration>,
}

/// Builds a pipeline that captures the target process's GC heap events and
/// feeds them to the externally-supplied object-graph builder. Constructing
/// the graph out of the forwarded data is the builder's concern.
pub fn gcdump_pipeline(
    client: Arc<dyn DiagnosticsClient>,
    settings: GcDumpPipelineSettings,
    graph: Arc<dyn GraphSink>,
) -> Result<Pipeline, PipelineError> {
    let processor = SessionProcessor::new(
        client,
        settings.process_id,
        settings.duration,
        SessionMode::GcDump { graph },
    )?;
    Ok(Pipeline::new(ProcessorStages::new(processor)))
}
