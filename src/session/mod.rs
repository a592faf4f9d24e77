//! The live diagnostic session processor.
//!
//! A [`SessionProcessor`] bridges the [`Pipeline`](crate::pipeline::Pipeline)
//! lifecycle to a live session against the target process: it opens the
//! session through the injected [`DiagnosticsClient`], runs the single read
//! loop over the event stream, decodes and filters the events, and drives the
//! typed payloads into the configured sinks.
//!
//! The processor owns the session exclusively; callers interact with it only
//! through the pipeline operations.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::{
    wellknown, ActiveSession, Delivery, DiagnosticsClient, EventLevel, EventRecord, ProviderSpec,
    SessionControl, SessionDelivery, SessionRequest,
};
use crate::pipeline::{PipelineError, PipelineStages};
use crate::sink::{GraphSink, LogLevel, LogSink, MetricsSink, StreamSink};

pub mod decode;
pub mod filter;
pub mod payload;

pub use filter::CounterFilter;
pub use payload::{CounterKind, CounterPayload};

/// Default size of the target's in-process event buffer, in mebibytes.
const DEFAULT_BUFFER_SIZE_MB: u32 = 256;

/// What a session collects and where its decoded output goes.
pub enum SessionMode {
    /// Periodic counter samples, filtered and dispatched to metrics sinks.
    Metrics {
        providers: Vec<String>,
        filter: CounterFilter,
        interval_secs: u32,
        sinks: Vec<Arc<dyn MetricsSink>>,
    },
    /// Structured log records.
    Logs {
        level: LogLevel,
        sink: Arc<dyn LogSink>,
    },
    /// GC heap dump events, forwarded to an object-graph builder.
    GcDump { graph: Arc<dyn GraphSink> },
    /// The raw trace byte stream, handed whole to a stream sink.
    Trace {
        providers: Vec<ProviderSpec>,
        request_rundown: bool,
        sink: Arc<dyn StreamSink>,
    },
}

/// Opens a session against one target process and processes its events.
///
/// Constructed by the mode constructors in [`collect`](crate::collect) and
/// driven through the pipeline stage actions; not used directly by callers.
pub struct SessionProcessor {
    client: Arc<dyn DiagnosticsClient>,
    pid: u32,
    /// `None` runs until stopped.
    duration: Option<Duration>,
    mode: SessionMode,
    /// The open session's control handle, present only while running.
    session: Mutex<Option<Arc<dyn SessionControl>>>,
}

impl std::fmt::Debug for SessionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProcessor")
            .field("pid", &self.pid)
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

impl SessionProcessor {
    /// Validates the configuration and builds the processor.
    ///
    /// Invalid combinations fail here, never at first use.
    pub fn new(
        client: Arc<dyn DiagnosticsClient>,
        pid: u32,
        duration: Option<Duration>,
        mode: SessionMode,
    ) -> Result<Self, PipelineError> {
        if pid == 0 {
            return Err(PipelineError::config("target process id must be positive"));
        }
        match &mode {
            SessionMode::Metrics {
                providers,
                interval_secs,
                sinks,
                ..
            } => {
                if providers.is_empty() {
                    return Err(PipelineError::config(
                        "counter collection requires at least one counter group",
                    ));
                }
                if *interval_secs < 1 {
                    return Err(PipelineError::config(
                        "the counter refresh interval must be at least one second",
                    ));
                }
                if sinks.is_empty() {
                    return Err(PipelineError::config(
                        "counter collection requires at least one metrics sink",
                    ));
                }
            }
            SessionMode::Trace { providers, .. } => {
                if providers.is_empty() {
                    return Err(PipelineError::config(
                        "trace collection requires at least one provider",
                    ));
                }
            }
            SessionMode::Logs { .. } | SessionMode::GcDump { .. } => {}
        }
        Ok(Self {
            client,
            pid,
            duration,
            mode,
            session: Mutex::new(None),
        })
    }

    /// The run action: opens the session and processes its stream until it
    /// ends, the duration elapses, or the token fires.
    pub(crate) async fn process(
        self: Arc<Self>,
        token: CancellationToken,
    ) -> Result<(), PipelineError> {
        let request = self.build_request();
        log::debug!(
            "starting diagnostic session against pid {} with {} provider(s)",
            self.pid,
            request.providers.len()
        );
        let active = tokio::select! {
            res = self.client.start_session(request) => {
                res.map_err(|e| PipelineError::session_start(e.into()))?
            }
            _ = token.cancelled() => return Err(PipelineError::Aborted),
        };
        let ActiveSession { control, delivery } = active;
        let control: Arc<dyn SessionControl> = Arc::from(control);
        *self.session.lock().unwrap() = Some(control);

        let result = match delivery {
            SessionDelivery::Events(rx) => self.read_loop(rx, &token).await,
            SessionDelivery::Bytes(stream) => match &self.mode {
                SessionMode::Trace { sink, .. } => {
                    self.stream_loop(sink.consume(stream, token.clone()), &token).await
                }
                _ => Err(PipelineError::runtime(anyhow::anyhow!(
                    "the diagnostics client delivered raw bytes for a decoded-event session"
                ))),
            },
        };
        if let Err(PipelineError::Aborted) = &result {
            // Forced teardown: stop the stream before the abort path releases
            // the pipeline. No graceful flush.
            self.abort_session().await;
        }
        result
    }

    /// The single read loop. Events are dispatched in the order the target
    /// emitted them; the loop ends when the stream closes.
    async fn read_loop(
        &self,
        mut rx: mpsc::Receiver<EventRecord>,
        token: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let deadline = async {
            match self.duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);
        let mut stop_requested = false;

        loop {
            tokio::select! {
                _ = token.cancelled() => return Err(PipelineError::Aborted),
                _ = &mut deadline, if !stop_requested => {
                    // The collection window is over: ask for a graceful flush,
                    // then keep reading until the stream ends on its own.
                    stop_requested = true;
                    self.stop_session().await?;
                }
                event = rx.recv() => match event {
                    Some(record) => self.dispatch(&record),
                    None => return Ok(()),
                },
            }
        }
    }

    /// Drives the trace egress future, bounding it by the collection window.
    /// The egress ends when the stream does, which happens after a graceful
    /// stop flushes the trace.
    async fn stream_loop(
        &self,
        egress: BoxFuture<'static, anyhow::Result<()>>,
        token: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let deadline = async {
            match self.duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);
        tokio::pin!(egress);
        let mut stop_requested = false;

        loop {
            tokio::select! {
                _ = token.cancelled() => return Err(PipelineError::Aborted),
                _ = &mut deadline, if !stop_requested => {
                    stop_requested = true;
                    self.stop_session().await?;
                }
                res = &mut egress => return res.map_err(PipelineError::runtime),
            }
        }
    }

    /// Decodes one record and forwards it to the mode's sinks. Malformed
    /// events are logged and skipped: one bad sample must not end a live
    /// session.
    fn dispatch(&self, record: &EventRecord) {
        match &self.mode {
            SessionMode::Metrics {
                filter,
                interval_secs,
                sinks,
                ..
            } => {
                if !decode::is_counter_event(record) {
                    return;
                }
                match decode::decode_counter(record, *interval_secs) {
                    Ok(payload) => {
                        if filter.include(payload.provider(), payload.name()) {
                            for sink in sinks {
                                sink.record(payload.provider(), &payload);
                            }
                        }
                    }
                    Err(e) => log::warn!("skipping malformed counter event: {e}"),
                }
            }
            SessionMode::Logs { sink, .. } => {
                if record.name != decode::LOG_MESSAGE_JSON {
                    return;
                }
                match decode::decode_log(record) {
                    Ok(log_record) => sink.write(&log_record),
                    Err(e) => log::warn!("skipping malformed log event: {e}"),
                }
            }
            SessionMode::GcDump { graph } => match decode::decode_gc(record) {
                Ok(Some(decode::GcChunk::Nodes(data))) => graph.append_nodes(data),
                Ok(Some(decode::GcChunk::Edges(data))) => graph.append_edges(data),
                Ok(Some(decode::GcChunk::Types(data))) => graph.append_types(data),
                Ok(None) => {}
                Err(e) => log::warn!("skipping malformed GC dump event: {e}"),
            },
            SessionMode::Trace { .. } => {
                // Trace sessions deliver bytes, not decoded records.
            }
        }
    }

    /// The stop action: requests a graceful session stop so buffered events
    /// flush before the stream ends.
    ///
    /// The error conditions that mean the target process already exited are
    /// swallowed: that is early natural completion, not a failure.
    pub(crate) async fn stop_session(&self) -> Result<(), PipelineError> {
        let control = self.session.lock().unwrap().clone();
        let Some(control) = control else {
            log::debug!("stop requested but no session is active");
            return Ok(());
        };
        match control.stop().await {
            Ok(()) => Ok(()),
            Err(e) if e.indicates_target_exit() => {
                log::debug!("target process exited during stop: {e}");
                Ok(())
            }
            Err(e) => Err(PipelineError::runtime(e.into())),
        }
    }

    /// The abort/dispose action: forcibly releases the session, if any.
    /// Safe to call when the run never opened one, and at most one caller
    /// gets to dispose the handle.
    pub(crate) async fn abort_session(&self) {
        let control = self.session.lock().unwrap().take();
        if let Some(control) = control {
            control.dispose().await;
        }
    }

    fn build_request(&self) -> SessionRequest {
        let (providers, request_rundown, delivery) = match &self.mode {
            SessionMode::Metrics {
                providers,
                interval_secs,
                ..
            } => {
                let specs = providers
                    .iter()
                    .map(|name| {
                        ProviderSpec::new(name, EventLevel::Informational, 0).with_argument(
                            wellknown::EVENT_COUNTER_INTERVAL_SEC,
                            interval_secs.to_string(),
                        )
                    })
                    .collect();
                (specs, false, Delivery::Events)
            }
            SessionMode::Logs { level, .. } => {
                let spec = ProviderSpec::new(
                    wellknown::EXTENSIONS_LOGGING,
                    event_level_for(*level),
                    wellknown::LOG_JSON_MESSAGE_KEYWORD,
                );
                (vec![spec], false, Delivery::Events)
            }
            SessionMode::GcDump { .. } => {
                let spec = ProviderSpec::new(
                    wellknown::DOTNET_RUNTIME,
                    EventLevel::Informational,
                    wellknown::GC_HEAP_SNAPSHOT_KEYWORDS,
                );
                // The rundown carries the type names the graph builder needs.
                (vec![spec], true, Delivery::Events)
            }
            SessionMode::Trace {
                providers,
                request_rundown,
                ..
            } => (providers.clone(), *request_rundown, Delivery::Bytes),
        };
        SessionRequest {
            pid: self.pid,
            providers,
            request_rundown,
            buffer_size_mb: DEFAULT_BUFFER_SIZE_MB,
            delivery,
        }
    }
}

/// Maps a log filter level to the provider verbosity to request.
fn event_level_for(level: LogLevel) -> EventLevel {
    match level {
        LogLevel::Critical => EventLevel::Critical,
        LogLevel::Error => EventLevel::Error,
        LogLevel::Warning => EventLevel::Warning,
        LogLevel::Information => EventLevel::Informational,
        LogLevel::Debug | LogLevel::Trace => EventLevel::Verbose,
    }
}

/// Adapts a [`SessionProcessor`] to the pipeline stage actions.
pub(crate) struct ProcessorStages {
    processor: Arc<SessionProcessor>,
}

impl ProcessorStages {
    pub fn new(processor: SessionProcessor) -> Self {
        Self {
            processor: Arc::new(processor),
        }
    }
}

impl PipelineStages for ProcessorStages {
    fn run(&self, token: CancellationToken) -> BoxFuture<'static, Result<(), PipelineError>> {
        let processor = self.processor.clone();
        Box::pin(async move { processor.process(token).await })
    }

    fn stop(&self, _token: CancellationToken) -> BoxFuture<'static, Result<(), PipelineError>> {
        let processor = self.processor.clone();
        Box::pin(async move { processor.stop_session().await })
    }

    fn abort(&self) -> BoxFuture<'static, ()> {
        let processor = self.processor.clone();
        Box::pin(async move { processor.abort_session().await })
    }

    fn dispose(&self) -> BoxFuture<'static, ()> {
        let processor = self.processor.clone();
        Box::pin(async move { processor.abort_session().await })
    }
}
