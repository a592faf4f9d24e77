//! Abstraction over the out-of-process diagnostics channel.
//!
//! This core does not implement the channel's wire protocol. It consumes an
//! injected [`DiagnosticsClient`] that knows how to open a session against a
//! target process, and works with the decoded [`EventRecord`]s (or the raw
//! byte stream, for trace collection) that the session delivers.

use std::io;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Well-known provider names and session arguments of the target runtime.
pub mod wellknown {
    /// The runtime counters provider.
    pub const SYSTEM_RUNTIME: &str = "System.Runtime";
    /// The HTTP hosting counters provider.
    pub const ASPNETCORE_HOSTING: &str = "Microsoft.AspNetCore.Hosting";
    /// The gRPC server counters provider.
    pub const GRPC_ASPNETCORE_SERVER: &str = "Grpc.AspNetCore.Server";
    /// The structured logging provider.
    pub const EXTENSIONS_LOGGING: &str = "Microsoft-Extensions-Logging";
    /// The runtime provider that emits GC heap events.
    pub const DOTNET_RUNTIME: &str = "Microsoft-Windows-DotNETRuntime";

    /// Provider argument requesting counter samples every N seconds.
    pub const EVENT_COUNTER_INTERVAL_SEC: &str = "EventCounterIntervalSec";
    /// Logging provider keyword that selects JSON-formatted message events.
    pub const LOG_JSON_MESSAGE_KEYWORD: u64 = 0x8;
    /// Runtime provider keywords that trigger a GC heap snapshot.
    pub const GC_HEAP_SNAPSHOT_KEYWORDS: u64 = 0x1980001;
}

/// Verbosity requested from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLevel {
    Critical,
    Error,
    Warning,
    Informational,
    Verbose,
}

/// A provider to enable in a session, with channel-specific arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    pub level: EventLevel,
    pub keywords: u64,
    pub arguments: Vec<(String, String)>,
}

impl ProviderSpec {
    pub fn new(name: impl Into<String>, level: EventLevel, keywords: u64) -> Self {
        Self {
            name: name.into(),
            level,
            keywords,
            arguments: Vec::new(),
        }
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.push((key.into(), value.into()));
        self
    }
}

/// How the session should deliver its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Decoded event records, one per emitted event.
    Events,
    /// The raw trace byte stream, undecoded.
    Bytes,
}

/// Parameters of a session to open against a target process.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub pid: u32,
    pub providers: Vec<ProviderSpec>,
    /// Ask the target to emit its rundown (type/method metadata) at the end.
    pub request_rundown: bool,
    /// Size of the in-process event buffer, in mebibytes.
    pub buffer_size_mb: u32,
    pub delivery: Delivery,
}

/// One decoded event, as a dynamic field bag.
///
/// Payload fields are looked up by name; the typed decode step in
/// [`session::decode`](crate::session::decode) validates them once at the
/// boundary and produces immutable payloads.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub provider: String,
    pub name: String,
    pub fields: Vec<(String, FieldValue)>,
}

/// A dynamically-typed event payload field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Float(f64),
    Int(i64),
    Bytes(Vec<u8>),
}

impl EventRecord {
    pub fn new(provider: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the field; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// The raw byte stream of a trace session.
pub type ByteStream = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// What an open session delivers, matching [`SessionRequest::delivery`].
pub enum SessionDelivery {
    /// The stream of decoded events. The channel closes when the session
    /// ends, gracefully or not.
    Events(mpsc::Receiver<EventRecord>),
    /// The raw trace bytes.
    Bytes(ByteStream),
}

/// An open session: a control handle plus the data it delivers.
pub struct ActiveSession {
    pub control: Box<dyn SessionControl>,
    pub delivery: SessionDelivery,
}

/// Control surface of an open session.
pub trait SessionControl: Send + Sync {
    /// Requests a graceful stop: the target flushes buffered events, then the
    /// event stream ends on its own.
    fn stop(&self) -> BoxFuture<'static, Result<(), SessionStopError>>;

    /// Tears the session down immediately, without waiting for a flush.
    fn dispose(&self) -> BoxFuture<'static, ()>;
}

/// Opens live sessions against target processes.
///
/// Injected dependency: implementations own the IPC transport and the wire
/// protocol, both out of scope for this crate.
pub trait DiagnosticsClient: Send + Sync + 'static {
    fn start_session(
        &self,
        request: SessionRequest,
    ) -> BoxFuture<'static, Result<ActiveSession, SessionStartError>>;
}

/// The diagnostics channel could not establish a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionStartError {
    #[error("no process with id {0}")]
    ProcessNotFound(u32),
    #[error("connecting to the diagnostics channel of process {pid} was denied")]
    PermissionDenied { pid: u32 },
    #[error("the target runtime does not support this request: {0}")]
    Unsupported(String),
    #[error("diagnostics channel error: {0}")]
    Channel(#[from] io::Error),
}

/// A graceful session stop failed.
#[derive(Debug, thiserror::Error)]
pub enum SessionStopError {
    /// The event stream ended before the stop request completed.
    #[error("the event stream ended before the stop completed")]
    StreamClosed,
    /// The target did not acknowledge the stop in time.
    #[error("timed out waiting for the stop acknowledgement")]
    AckTimeout,
    /// The transport disappeared (e.g. the pipe or socket is gone).
    #[error("the diagnostics transport disappeared: {0}")]
    TransportLost(#[source] io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SessionStopError {
    /// True for the narrow set of conditions that mean the target process
    /// already exited. The graceful-stop path treats these as early natural
    /// completion, not as a failure.
    pub fn indicates_target_exit(&self) -> bool {
        matches!(
            self,
            Self::StreamClosed | Self::AckTimeout | Self::TransportLost(_)
        )
    }
}
