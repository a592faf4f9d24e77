//! Typed decoding of dynamic event field bags.
//!
//! Events arrive as [`EventRecord`]s whose payload fields are looked up by
//! name. The functions here validate the required fields once, at the
//! boundary, and produce immutable typed payloads; a missing or ill-typed
//! field becomes a single well-defined [`DecodeError`] instead of an untyped
//! lookup failure deep in the dispatch path.

use crate::client::{EventRecord, FieldValue};
use crate::sink::{LogLevel, LogRecord};

use super::payload::CounterPayload;

/// Event name under which counter samples are emitted.
pub const EVENT_COUNTERS: &str = "EventCounters";
/// Event name of JSON-formatted structured log messages.
pub const LOG_MESSAGE_JSON: &str = "MessageJson";

/// GC dump bulk event names.
const GC_BULK_NODE: &str = "GCBulkNode";
const GC_BULK_EDGE: &str = "GCBulkEdge";
const GC_BULK_TYPE: &str = "GCBulkType";

/// A required event field was missing or had an unexpected shape.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("event {event}: missing field {field}")]
    MissingField { event: String, field: &'static str },
    #[error("event {event}: field {field} has an unexpected type")]
    WrongType { event: String, field: &'static str },
    #[error("event {event}: field {field} has unknown value {value:?}")]
    UnknownValue {
        event: String,
        field: &'static str,
        value: String,
    },
}

/// Whether this record is a counter sample.
pub fn is_counter_event(record: &EventRecord) -> bool {
    record.name == EVENT_COUNTERS
}

/// Decodes a counter sample.
///
/// The event-level `CounterType` field declares the kind: `"Mean"` produces a
/// [`Metric`](CounterPayload::Metric) from the `Mean` field, `"Sum"` produces
/// a [`Rate`](CounterPayload::Rate) from the `Increment` field.
/// `DisplayName` and `DisplayUnits` may be absent or empty; the payload
/// constructors substitute their defaults.
pub fn decode_counter(record: &EventRecord, interval_secs: u32) -> Result<CounterPayload, DecodeError> {
    let name = text_field(record, "Name")?;
    let display_name = optional_text_field(record, "DisplayName");
    let display_units = optional_text_field(record, "DisplayUnits");

    match text_field(record, "CounterType")? {
        "Mean" => Ok(CounterPayload::metric(
            &record.provider,
            name,
            float_field(record, "Mean")?,
            display_name,
            display_units,
        )),
        "Sum" => Ok(CounterPayload::rate(
            &record.provider,
            name,
            float_field(record, "Increment")?,
            display_name,
            display_units,
            interval_secs,
        )),
        other => Err(DecodeError::UnknownValue {
            event: record.name.clone(),
            field: "CounterType",
            value: other.to_owned(),
        }),
    }
}

/// Decodes a structured log record from a `MessageJson` event.
pub fn decode_log(record: &EventRecord) -> Result<LogRecord, DecodeError> {
    let level = match text_field(record, "LogLevel")? {
        "Trace" => LogLevel::Trace,
        "Debug" => LogLevel::Debug,
        "Information" => LogLevel::Information,
        "Warning" => LogLevel::Warning,
        "Error" => LogLevel::Error,
        "Critical" => LogLevel::Critical,
        other => {
            return Err(DecodeError::UnknownValue {
                event: record.name.clone(),
                field: "LogLevel",
                value: other.to_owned(),
            })
        }
    };
    let event_id = record
        .field("EventId")
        .and_then(FieldValue::as_i64)
        .unwrap_or(0);
    let arguments = optional_text_field(record, "ArgumentsJson");

    Ok(LogRecord {
        category: text_field(record, "CategoryName")?.to_owned(),
        level,
        event_id,
        message: optional_text_field(record, "FormattedMessage"),
        arguments_json: if arguments.is_empty() {
            None
        } else {
            Some(arguments)
        },
    })
}

/// A chunk of raw GC heap-dump data, forwarded verbatim to the graph builder.
#[derive(Debug, PartialEq, Eq)]
pub enum GcChunk<'a> {
    Nodes(&'a [u8]),
    Edges(&'a [u8]),
    Types(&'a [u8]),
}

/// Decodes a GC dump bulk event. Returns `Ok(None)` for records that are not
/// part of the heap dump (the runtime provider emits plenty of others).
pub fn decode_gc(record: &EventRecord) -> Result<Option<GcChunk<'_>>, DecodeError> {
    let chunk = match record.name.as_str() {
        GC_BULK_NODE => GcChunk::Nodes(bytes_field(record, "Values")?),
        GC_BULK_EDGE => GcChunk::Edges(bytes_field(record, "Values")?),
        GC_BULK_TYPE => GcChunk::Types(bytes_field(record, "Values")?),
        _ => return Ok(None),
    };
    Ok(Some(chunk))
}

fn text_field<'a>(record: &'a EventRecord, field: &'static str) -> Result<&'a str, DecodeError> {
    match record.field(field) {
        Some(value) => value.as_text().ok_or_else(|| DecodeError::WrongType {
            event: record.name.clone(),
            field,
        }),
        None => Err(DecodeError::MissingField {
            event: record.name.clone(),
            field,
        }),
    }
}

/// Missing optional text fields decode to the empty string, which the payload
/// constructors treat as absent.
fn optional_text_field(record: &EventRecord, field: &'static str) -> String {
    record
        .field(field)
        .and_then(FieldValue::as_text)
        .unwrap_or_default()
        .to_owned()
}

fn float_field(record: &EventRecord, field: &'static str) -> Result<f64, DecodeError> {
    match record.field(field) {
        Some(value) => value.as_f64().ok_or_else(|| DecodeError::WrongType {
            event: record.name.clone(),
            field,
        }),
        None => Err(DecodeError::MissingField {
            event: record.name.clone(),
            field,
        }),
    }
}

fn bytes_field<'a>(record: &'a EventRecord, field: &'static str) -> Result<&'a [u8], DecodeError> {
    match record.field(field) {
        Some(value) => value.as_bytes().ok_or_else(|| DecodeError::WrongType {
            event: record.name.clone(),
            field,
        }),
        None => Err(DecodeError::MissingField {
            event: record.name.clone(),
            field,
        }),
    }
}

#[cfg(test)]
mod tests {
    use crate::client::{EventRecord, FieldValue};
    use crate::session::payload::{CounterKind, CounterPayload};
    use crate::sink::LogLevel;

    use super::{decode_counter, decode_gc, decode_log, DecodeError, GcChunk};

    fn counter_event(kind: &str) -> EventRecord {
        EventRecord::new("System.Runtime", super::EVENT_COUNTERS)
            .with_field("Name", FieldValue::Text("cpu-usage".into()))
            .with_field("DisplayName", FieldValue::Text(String::new()))
            .with_field("DisplayUnits", FieldValue::Text(String::new()))
            .with_field("CounterType", FieldValue::Text(kind.into()))
    }

    #[test]
    fn decodes_mean_counter_to_metric() {
        let record = counter_event("Mean").with_field("Mean", FieldValue::Float(41.5));
        let payload = decode_counter(&record, 1).unwrap();
        assert_eq!(payload.kind(), CounterKind::Metric);
        assert_eq!(payload.name(), "cpu-usage");
        assert_eq!(payload.value(), 41.5);
        // Empty DisplayName falls back to the raw counter name.
        assert_eq!(payload.display_name(), "cpu-usage");
    }

    #[test]
    fn decodes_sum_counter_to_rate() {
        let record = counter_event("Sum").with_field("Increment", FieldValue::Float(5.0));
        let payload = decode_counter(&record, 1).unwrap();
        assert_eq!(payload.kind(), CounterKind::Rate);
        assert_eq!(payload.value(), 5.0);
        assert_eq!(payload.unit_label(), "Count");
        assert_eq!(payload.interval_text().as_deref(), Some("1 sec"));
    }

    #[test]
    fn missing_value_field_is_a_decode_error() {
        let record = counter_event("Mean"); // no Mean field
        let err = decode_counter(&record, 1).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { field: "Mean", .. }));
    }

    #[test]
    fn unknown_counter_type_is_a_decode_error() {
        let record = counter_event("Percentile").with_field("Mean", FieldValue::Float(1.0));
        let err = decode_counter(&record, 1).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnknownValue {
                field: "CounterType",
                ..
            }
        ));
    }

    #[test]
    fn ill_typed_field_is_a_decode_error() {
        let record = counter_event("Mean").with_field("Mean", FieldValue::Text("oops".into()));
        let err = decode_counter(&record, 1).unwrap_err();
        assert!(matches!(err, DecodeError::WrongType { field: "Mean", .. }));
    }

    #[test]
    fn payload_is_what_the_sink_sees() {
        let record = counter_event("Mean").with_field("Mean", FieldValue::Float(10.0));
        let payload = decode_counter(&record, 5).unwrap();
        assert_eq!(
            payload,
            CounterPayload::metric("System.Runtime", "cpu-usage", 10.0, "", "")
        );
    }

    #[test]
    fn decodes_log_record() {
        let record = EventRecord::new("Microsoft-Extensions-Logging", super::LOG_MESSAGE_JSON)
            .with_field("LogLevel", FieldValue::Text("Warning".into()))
            .with_field("CategoryName", FieldValue::Text("App.Startup".into()))
            .with_field("EventId", FieldValue::Int(7))
            .with_field("FormattedMessage", FieldValue::Text("slow start".into()))
            .with_field("ArgumentsJson", FieldValue::Text("{\"ms\":1200}".into()));

        let log = decode_log(&record).unwrap();
        assert_eq!(log.level, LogLevel::Warning);
        assert_eq!(log.category, "App.Startup");
        assert_eq!(log.event_id, 7);
        assert_eq!(log.message, "slow start");
        assert_eq!(log.arguments_json.as_deref(), Some("{\"ms\":1200}"));
    }

    #[test]
    fn gc_bulk_events_decode_to_chunks() {
        let record = EventRecord::new("Microsoft-Windows-DotNETRuntime", "GCBulkNode")
            .with_field("Values", FieldValue::Bytes(vec![1, 2, 3]));
        assert_eq!(
            decode_gc(&record).unwrap(),
            Some(GcChunk::Nodes(&[1, 2, 3]))
        );

        let unrelated = EventRecord::new("Microsoft-Windows-DotNETRuntime", "GCStart");
        assert_eq!(decode_gc(&unrelated).unwrap(), None);
    }
}
