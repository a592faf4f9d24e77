//! Immutable decoded counter samples.

/// The two kinds of counter sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    /// An instantaneous value, reported as the mean over the sampling interval.
    Metric,
    /// An incrementing value, reported as the increment over the sampling interval.
    Rate,
}

/// One decoded counter sample.
///
/// Constructed once per decoded event, immutable thereafter, handed to the
/// sinks and discarded.
#[derive(Debug, Clone, PartialEq)]
pub enum CounterPayload {
    Metric {
        name: String,
        /// Mean value over the sampling interval.
        value: f64,
        display_name: String,
        display_units: Option<String>,
        provider: String,
    },
    Rate {
        name: String,
        /// Increment over the sampling interval.
        value: f64,
        display_name: String,
        display_units: Option<String>,
        interval_secs: u32,
        provider: String,
    },
}

/// Default unit label used when the upstream units are absent.
const DEFAULT_UNITS: &str = "Count";

impl CounterPayload {
    /// Builds a metric payload. An empty `display_name` falls back to the raw
    /// counter name; empty `display_units` become `None`.
    pub fn metric(
        provider: impl Into<String>,
        name: impl Into<String>,
        value: f64,
        display_name: impl Into<String>,
        display_units: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let display_name = non_empty(display_name.into()).unwrap_or_else(|| name.clone());
        Self::Metric {
            name,
            value,
            display_name,
            display_units: non_empty(display_units.into()),
            provider: provider.into(),
        }
    }

    /// Builds a rate payload, with the same display fallbacks as
    /// [`metric`](Self::metric).
    pub fn rate(
        provider: impl Into<String>,
        name: impl Into<String>,
        value: f64,
        display_name: impl Into<String>,
        display_units: impl Into<String>,
        interval_secs: u32,
    ) -> Self {
        let name = name.into();
        let display_name = non_empty(display_name.into()).unwrap_or_else(|| name.clone());
        Self::Rate {
            name,
            value,
            display_name,
            display_units: non_empty(display_units.into()),
            interval_secs,
            provider: provider.into(),
        }
    }

    pub fn kind(&self) -> CounterKind {
        match self {
            Self::Metric { .. } => CounterKind::Metric,
            Self::Rate { .. } => CounterKind::Rate,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Metric { name, .. } | Self::Rate { name, .. } => name,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Self::Metric { value, .. } | Self::Rate { value, .. } => *value,
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            Self::Metric { provider, .. } | Self::Rate { provider, .. } => provider,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::Metric { display_name, .. } | Self::Rate { display_name, .. } => display_name,
        }
    }

    /// The unit label, or `"Count"` when the upstream units are absent.
    pub fn unit_label(&self) -> &str {
        match self {
            Self::Metric { display_units, .. } | Self::Rate { display_units, .. } => {
                display_units.as_deref().unwrap_or(DEFAULT_UNITS)
            }
        }
    }

    /// The sampling interval rendered as `"<n> sec"`, for rates only.
    pub fn interval_text(&self) -> Option<String> {
        match self {
            Self::Metric { .. } => None,
            Self::Rate { interval_secs, .. } => Some(format!("{interval_secs} sec")),
        }
    }

    /// Human-readable label: `DisplayName (Units)` for metrics (units omitted
    /// when absent), `DisplayName (Units / N sec)` for rates.
    pub fn display(&self) -> String {
        match self {
            Self::Metric {
                display_name,
                display_units,
                ..
            } => match display_units {
                Some(units) => format!("{display_name} ({units})"),
                None => display_name.clone(),
            },
            Self::Rate {
                display_name,
                interval_secs,
                ..
            } => format!(
                "{display_name} ({} / {interval_secs} sec)",
                self.unit_label()
            ),
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
