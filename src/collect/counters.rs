//! Live counter collection.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::DiagnosticsClient;
use crate::pipeline::{Pipeline, PipelineError};
use crate::session::{CounterFilter, ProcessorStages, SessionMode, SessionProcessor};
use crate::sink::MetricsSink;

/// Settings of a counter pipeline. Immutable once the pipeline starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterPipelineSettings {
    pub process_id: u32,
    /// How long to collect. `None` runs until the pipeline is stopped.
    pub duration: Option<Duration>,
    /// The providers to sample, each with an optional counter subset.
    pub counter_groups: Vec<CounterGroup>,
    /// Sampling interval, whole seconds, at least one.
    pub refresh_interval: Duration,
}

/// A provider name plus an optional explicit subset of its counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterGroup {
    pub provider: String,
    /// Explicit counters to include. Empty includes every counter of the
    /// provider.
    pub counters: Vec<String>,
}

impl CounterGroup {
    /// The whole provider, no counter restriction.
    pub fn provider(name: impl Into<String>) -> Self {
        Self {
            provider: name.into(),
            counters: Vec::new(),
        }
    }

    /// Parses the `Provider` / `Provider[counter1,counter2]` specifier syntax
    /// used by command-line front ends.
    pub fn parse(spec: &str) -> Result<Self, PipelineError> {
        match spec.split_once('[') {
            None => {
                if spec.is_empty() {
                    return Err(PipelineError::config("empty counter specifier"));
                }
                Ok(Self::provider(spec))
            }
            Some((provider, rest)) => {
                let Some(list) = rest.strip_suffix(']') else {
                    return Err(PipelineError::config(format!(
                        "malformed counter specifier {spec:?}: missing closing bracket"
                    )));
                };
                if provider.is_empty() {
                    return Err(PipelineError::config(format!(
                        "malformed counter specifier {spec:?}: missing provider name"
                    )));
                }
                Ok(Self {
                    provider: provider.to_owned(),
                    counters: list.split(',').map(str::to_owned).collect(),
                })
            }
        }
    }
}

/// Builds a pipeline that collects live counter samples from the target
/// process and dispatches them, filtered, to the metrics sinks.
///
/// # Errors
/// [`PipelineError::Configuration`] when the settings are invalid: pid 0, no
/// counter groups, refresh interval under one second, or no sink.
pub fn counter_pipeline(
    client: Arc<dyn DiagnosticsClient>,
    settings: CounterPipelineSettings,
    sinks: Vec<Arc<dyn MetricsSink>>,
) -> Result<Pipeline, PipelineError> {
    let interval_secs = settings.refresh_interval.as_secs();
    if interval_secs < 1 || settings.refresh_interval.subsec_nanos() != 0 {
        return Err(PipelineError::config(
            "the refresh interval must be a whole number of seconds, at least one",
        ));
    }

    let mut filter = CounterFilter::new();
    let mut providers = Vec::with_capacity(settings.counter_groups.len());
    for group in &settings.counter_groups {
        let counters = if group.counters.is_empty() {
            None
        } else {
            Some(group.counters.as_slice())
        };
        filter.add_filter(&group.provider, counters);
        if !providers.contains(&group.provider) {
            providers.push(group.provider.clone());
        }
    }

    let processor = SessionProcessor::new(
        client,
        settings.process_id,
        settings.duration,
        SessionMode::Metrics {
            providers,
            filter,
            interval_secs: interval_secs as u32,
            sinks,
        },
    )?;
    Ok(Pipeline::new(ProcessorStages::new(processor)))
}
