use serde::{Deserialize, Serialize};

/// The two metric kinds the engine supports.
///
/// The enum is closed on purpose: any other kind arriving over the wire is
/// rejected during parsing, never dispatched on.
///
/// # Examples
///
/// ```
/// use pulsemon_common::metric::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// assert!("histogram".parse::<MetricKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Gauge => write!(f, "gauge"),
        }
    }
}

impl std::str::FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            _ => Err(format!("unknown metric kind: {s}")),
        }
    }
}

/// A single metric as exchanged between agent, server, and storage.
///
/// A counter carries `delta` (the cumulative total), a gauge carries
/// `reading` (the latest value). Both stay optional at this level so that a
/// value-less payload is representable and can be rejected by validation
/// with a precise message instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Metric {
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            reading: None,
            signature: None,
        }
    }

    pub fn gauge(id: impl Into<String>, reading: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            reading: Some(reading),
            signature: None,
        }
    }

    /// True when the metric carries the value its declared kind requires.
    pub fn has_value(&self) -> bool {
        match self.kind {
            MetricKind::Counter => self.delta.is_some(),
            MetricKind::Gauge => self.reading.is_some(),
        }
    }

    /// The identity of this metric, for retrieval or increment requests.
    pub fn query(&self) -> MetricQuery {
        MetricQuery {
            id: self.id.clone(),
            kind: self.kind,
        }
    }

    /// Human-readable value for plain-text responses; `(nil)` when absent.
    pub fn value_string(&self) -> String {
        match self.kind {
            MetricKind::Counter => self
                .delta
                .map_or_else(|| "(nil)".to_string(), |d| d.to_string()),
            MetricKind::Gauge => self
                .reading
                .map_or_else(|| "(nil)".to_string(), |r| r.to_string()),
        }
    }
}

/// A value-less metric reference: identity plus declared kind.
///
/// Used to request retrieval or to address an increment without redundantly
/// carrying the accumulated value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
}

impl MetricQuery {
    pub fn counter(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
        }
    }

    pub fn gauge(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_serializes_without_reading() {
        let m = Metric::counter("requests", 42);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"id":"requests","type":"counter","delta":42}"#);
    }

    #[test]
    fn gauge_round_trips_through_json() {
        let m = Metric::gauge("cpu_load", 0.75);
        let json = serde_json::to_string(&m).unwrap();
        let back: Metric = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn unknown_kind_is_rejected_at_parse() {
        let res: Result<Metric, _> =
            serde_json::from_str(r#"{"id":"x","type":"histogram","reading":1.0}"#);
        assert!(res.is_err());
    }

    #[test]
    fn value_less_payload_parses_but_reports_missing_value() {
        let m: Metric = serde_json::from_str(r#"{"id":"x","type":"counter"}"#).unwrap();
        assert!(!m.has_value());
        assert_eq!(m.value_string(), "(nil)");
    }
}
