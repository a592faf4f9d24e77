//! Shared test fixtures: a scriptable in-memory diagnostics client and
//! recording sinks.

// Each integration test binary uses its own subset of these fixtures.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use diagmon::client::{
    ActiveSession, DiagnosticsClient, EventRecord, FieldValue, SessionControl, SessionDelivery,
    SessionRequest, SessionStartError, SessionStopError,
};
use diagmon::session::CounterPayload;
use diagmon::sink::{LogRecord, LogSink, MetricsSink};

/// Routes `log` output to the test harness. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// State shared between a [`StubClient`] and the sessions it opens.
#[derive(Default)]
pub struct StubState {
    pub sessions_opened: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub dispose_calls: AtomicUsize,
    pub requests: Mutex<Vec<SessionRequest>>,
    /// Keeps the event stream open until stop/dispose, when set.
    sender: Mutex<Option<mpsc::Sender<EventRecord>>>,
    /// Error to return from the graceful stop, for target-exit scenarios.
    stop_error: Mutex<Option<SessionStopError>>,
}

/// An in-memory diagnostics client that replays a scripted list of events.
///
/// With `hold_open`, the event stream stays open after the scripted events
/// until a graceful stop or a forced dispose ends it, mimicking a live
/// session. Without it, the stream ends as soon as the events are delivered.
pub struct StubClient {
    events: Vec<EventRecord>,
    hold_open: bool,
    fail_start: bool,
    pub state: Arc<StubState>,
}

impl StubClient {
    pub fn new(events: Vec<EventRecord>) -> Self {
        Self {
            events,
            hold_open: false,
            fail_start: false,
            state: Arc::new(StubState::default()),
        }
    }

    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn failing() -> Self {
        let mut client = Self::new(Vec::new());
        client.fail_start = true;
        client
    }

    pub fn with_stop_error(self, error: SessionStopError) -> Self {
        *self.state.stop_error.lock().unwrap() = Some(error);
        self
    }
}

impl DiagnosticsClient for StubClient {
    fn start_session(
        &self,
        request: SessionRequest,
    ) -> BoxFuture<'static, Result<ActiveSession, SessionStartError>> {
        let state = self.state.clone();
        let events = self.events.clone();
        let hold_open = self.hold_open;
        let fail_start = self.fail_start;
        Box::pin(async move {
            state.requests.lock().unwrap().push(request.clone());
            if fail_start {
                return Err(SessionStartError::ProcessNotFound(request.pid));
            }
            state.sessions_opened.fetch_add(1, Ordering::SeqCst);

            let (tx, rx) = mpsc::channel(events.len() + 16);
            for event in events {
                tx.try_send(event).expect("scripted events fit the channel");
            }
            if hold_open {
                // The stream stays open until stop/dispose drops the sender.
                *state.sender.lock().unwrap() = Some(tx);
            }
            Ok(ActiveSession {
                control: Box::new(StubControl(state)),
                delivery: SessionDelivery::Events(rx),
            })
        })
    }
}

struct StubControl(Arc<StubState>);

impl SessionControl for StubControl {
    fn stop(&self) -> BoxFuture<'static, Result<(), SessionStopError>> {
        let state = self.0.clone();
        Box::pin(async move {
            state.stop_calls.fetch_add(1, Ordering::SeqCst);
            // Graceful: flush, then let the stream end.
            state.sender.lock().unwrap().take();
            match state.stop_error.lock().unwrap().take() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        })
    }

    fn dispose(&self) -> BoxFuture<'static, ()> {
        let state = self.0.clone();
        Box::pin(async move {
            state.dispose_calls.fetch_add(1, Ordering::SeqCst);
            state.sender.lock().unwrap().take();
        })
    }
}

/// A metrics sink that records everything it receives.
#[derive(Default)]
pub struct RecordingSink {
    payloads: Mutex<Vec<(String, CounterPayload)>>,
}

impl RecordingSink {
    pub fn payloads(&self) -> Vec<(String, CounterPayload)> {
        self.payloads.lock().unwrap().clone()
    }
}

impl MetricsSink for RecordingSink {
    fn record(&self, provider: &str, payload: &CounterPayload) {
        self.payloads
            .lock()
            .unwrap()
            .push((provider.to_owned(), payload.clone()));
    }
}

/// A log sink that records everything it receives.
#[derive(Default)]
pub struct RecordingLogSink {
    records: Mutex<Vec<LogRecord>>,
}

impl RecordingLogSink {
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl LogSink for RecordingLogSink {
    fn write(&self, record: &LogRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

/// A scripted counter event in the shape the target runtime emits.
pub fn counter_event(provider: &str, name: &str, kind: &str, value: f64) -> EventRecord {
    let record = EventRecord::new(provider, "EventCounters")
        .with_field("Name", FieldValue::Text(name.to_owned()))
        .with_field("DisplayName", FieldValue::Text(String::new()))
        .with_field("DisplayUnits", FieldValue::Text(String::new()))
        .with_field("CounterType", FieldValue::Text(kind.to_owned()));
    match kind {
        "Sum" => record.with_field("Increment", FieldValue::Float(value)),
        _ => record.with_field("Mean", FieldValue::Float(value)),
    }
}
