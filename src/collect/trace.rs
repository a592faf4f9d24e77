//! Raw trace collection.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::{DiagnosticsClient, ProviderSpec};
use crate::pipeline::{Pipeline, PipelineError};
use crate::session::{ProcessorStages, SessionMode, SessionProcessor};
use crate::sink::StreamSink;

/// Settings of a raw trace pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracePipelineSettings {
    pub process_id: u32,
    /// How long to trace. `None` runs until the pipeline is stopped.
    pub duration: Option<Duration>,
    pub configuration: TraceConfiguration,
}

/// Which providers to trace, and whether to ask for the closing rundown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfiguration {
    pub providers: Vec<ProviderSpec>,
    /// Request type/method metadata at the end of the session. Needed by
    /// symbol-resolving consumers; skipping it makes stopping faster.
    pub request_rundown: bool,
}

/// Builds a pipeline that opens a raw trace session and hands the undecoded
/// byte stream to the stream sink for whole-trace egress.
pub fn trace_pipeline(
    client: Arc<dyn DiagnosticsClient>,
    settings: TracePipelineSettings,
    sink: Arc<dyn StreamSink>,
) -> Result<Pipeline, PipelineError> {
    let processor = SessionProcessor::new(
        client,
        settings.process_id,
        settings.duration,
        SessionMode::Trace {
            providers: settings.configuration.providers,
            request_rundown: settings.configuration.request_rundown,
            sink,
        },
    )?;
    Ok(Pipeline::new(ProcessorStages::new(processor)))
}
