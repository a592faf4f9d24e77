//! DIAGMON: live diagnostic collection from a running process.
//!
//! Diagmon connects to the out-of-process diagnostics channel of a target
//! process and collects live telemetry: performance counters, structured logs,
//! GC heap graphs and raw event traces.
//!
//! # This crate
//! This crate provides the collection core, not a runnable tool.
//!
//! Each collection activity is a [`Pipeline`](pipeline::Pipeline): a
//! start-able, stoppable, abortable and disposable unit of work with strict
//! lifecycle guarantees (idempotent run/stop, abort-at-most-once, safe
//! concurrent disposal). The pipeline drives a
//! [session processor](session::SessionProcessor) that opens a session
//! through an injected [diagnostics client](client::DiagnosticsClient),
//! decodes the incoming event stream and pushes typed payloads to
//! [sinks](sink).
//!
//! The pipeline is backed by asynchronous **Tokio** tasks.
//!
//! # Collection modes
//! Use the constructors of the [`collect`] module to build a pipeline for a
//! specific mode:
//! - [`collect::counters::counter_pipeline`] — periodic counter samples.
//! - [`collect::logs::logs_pipeline`] — structured log records.
//! - [`collect::gcdump::gcdump_pipeline`] — GC heap object-graph events.
//! - [`collect::trace::trace_pipeline`] — the raw trace byte stream.
//!
//! The surrounding host (CLI parsing, REST hosting, authentication, CSV/JSON
//! rendering, artifact upload) is out of scope: it consumes the outputs of
//! this core through the sink contracts.

pub mod client;
pub mod collect;
pub mod pipeline;
pub mod session;
pub mod sink;
