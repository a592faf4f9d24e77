//! Structured log collection.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::DiagnosticsClient;
use crate::pipeline::{Pipeline, PipelineError};
use crate::session::{ProcessorStages, SessionMode, SessionProcessor};
use crate::sink::{LogLevel, LogSink};

/// Settings of a logs pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsPipelineSettings {
    pub process_id: u32,
    /// How long to collect. `None` runs until the pipeline is stopped.
    pub duration: Option<Duration>,
    /// Minimum severity to request from the target's logging provider.
    pub log_level: LogLevel,
}

/// Builds a pipeline that collects structured log records from the target
/// process and writes them to the log sink.
pub fn logs_pipeline(
    client: Arc<dyn DiagnosticsClient>,
    settings: LogsPipelineSettings,
    sink: Arc<dyn LogSink>,
) -> Result<Pipeline, PipelineError> {
    let processor = SessionProcessor::new(
        client,
        settings.process_id,
        settings.duration,
        SessionMode::Logs {
            level: settings.log_level,
            sink,
        },
    )?;
    Ok(Pipeline::new(ProcessorStages::new(processor)))
}
