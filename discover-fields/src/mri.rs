//! Metric resource identifiers.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::columns;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_.-]*$").unwrap());
static UNIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").unwrap());

/// The type of a metric, determining its aggregation and evaluation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MetricType {
    /// Counts instances of an event (`c`).
    Counter,
    /// Builds a statistical distribution over values reported (`d`).
    Distribution,
    /// Counts the number of unique reported values (`s`).
    Set,
    /// Stores absolute snapshots of values (`g`).
    Gauge,
}

impl MetricType {
    /// Return the shortcode for this metric type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "c",
            MetricType::Distribution => "d",
            MetricType::Set => "s",
            MetricType::Gauge => "g",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricType {
    type Err = ParseMetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "c" => Self::Counter,
            "d" => Self::Distribution,
            "s" => Self::Set,
            "g" => Self::Gauge,
            _ => return Err(ParseMetricError),
        })
    }
}

/// An error returned when an MRI cannot be parsed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("failed to parse metric resource identifier")]
pub struct ParseMetricError;

/// The namespace of a metric.
///
/// Unlike ingestion, queries only accept namespaces that exist in the backend.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum MetricNamespace {
    /// Metrics extracted from sessions.
    Sessions,
    /// Metrics extracted from transaction events.
    Transactions,
    /// Metrics extracted from spans.
    Spans,
    /// User-defined metrics directly sent by SDKs and applications.
    Custom,
}

impl MetricNamespace {
    /// Returns the string representation for this namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricNamespace::Sessions => "sessions",
            MetricNamespace::Transactions => "transactions",
            MetricNamespace::Spans => "spans",
            MetricNamespace::Custom => "custom",
        }
    }
}

impl std::str::FromStr for MetricNamespace {
    type Err = ParseMetricError;

    fn from_str(ns: &str) -> Result<Self, Self::Err> {
        match ns {
            "sessions" => Ok(MetricNamespace::Sessions),
            "transactions" => Ok(MetricNamespace::Transactions),
            "spans" => Ok(MetricNamespace::Spans),
            "custom" => Ok(MetricNamespace::Custom),
            _ => Err(ParseMetricError),
        }
    }
}

impl fmt::Display for MetricNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unique identifier for metrics including typing and namespacing.
///
/// MRIs have the format `<type>:<namespace>/<name>@<unit>`. In queries, all components are
/// required and the name is not normalized.
///
/// # Example
///
/// ```
/// use discover_fields::MetricResourceIdentifier;
///
/// let string = "d:transactions/duration@millisecond";
/// let mri = MetricResourceIdentifier::parse(string).expect("should parse");
/// assert_eq!(mri.to_string(), string);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MetricResourceIdentifier<'a> {
    /// The type of a metric, determining its aggregation and evaluation.
    pub ty: MetricType,
    /// The namespace for this metric.
    pub namespace: MetricNamespace,
    /// The display name of the metric in the allowed character set.
    pub name: &'a str,
    /// The verbatim unit name of the metric value.
    pub unit: &'a str,
}

impl<'a> MetricResourceIdentifier<'a> {
    /// Parses and validates an MRI.
    pub fn parse(mri: &'a str) -> Result<Self, ParseMetricError> {
        let (raw_ty, rest) = mri.split_once(':').ok_or(ParseMetricError)?;
        let ty = raw_ty.parse()?;

        let (raw_namespace, rest) = rest.split_once('/').ok_or(ParseMetricError)?;
        let namespace = raw_namespace.parse()?;

        let (name, unit) = rest.rsplit_once('@').ok_or(ParseMetricError)?;

        if !NAME_RE.is_match(name) || !UNIT_RE.is_match(unit) {
            return Err(ParseMetricError);
        }

        Ok(Self {
            ty,
            namespace,
            name,
            unit,
        })
    }
}

impl fmt::Display for MetricResourceIdentifier<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `<ty>:<ns>/<name>@<unit>`
        write!(
            f,
            "{}:{}/{}@{}",
            self.ty, self.namespace, self.name, self.unit
        )
    }
}

/// Returns `true` if the string is a valid metric resource identifier.
pub fn is_mri(value: &str) -> bool {
    MetricResourceIdentifier::parse(value).is_ok()
}

/// Translates a public field name to the MRI of the transaction metric it is extracted into.
///
/// Returns `None` for fields that have no metric counterpart.
pub fn transaction_metric_mri(field: &str) -> Option<String> {
    if field == columns::TRANSACTION_DURATION {
        Some("d:transactions/duration@millisecond".to_owned())
    } else if field == "user" {
        Some("s:transactions/user@none".to_owned())
    } else if columns::is_duration_measurement(field) {
        Some(format!("d:transactions/{field}@millisecond"))
    } else if columns::is_measurement(field) {
        Some(format!("d:transactions/{field}@none"))
    } else if let Some(op) = field.strip_prefix("spans.") {
        columns::is_span_op_breakdown(field)
            .then(|| format!("d:transactions/breakdowns.span_ops.ops.{op}@millisecond"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mri() {
        assert_eq!(
            MetricResourceIdentifier::parse("d:transactions/measurements.lcp@millisecond")
                .unwrap(),
            MetricResourceIdentifier {
                ty: MetricType::Distribution,
                namespace: MetricNamespace::Transactions,
                name: "measurements.lcp",
                unit: "millisecond",
            }
        );
    }

    #[test]
    fn test_parse_mri_strict() {
        assert!(MetricResourceIdentifier::parse("c:foo").is_err());
        assert!(MetricResourceIdentifier::parse("c:custom/foo").is_err());
        assert!(MetricResourceIdentifier::parse("x:custom/foo@none").is_err());
        assert!(MetricResourceIdentifier::parse("c:unknown/foo@none").is_err());
        assert!(MetricResourceIdentifier::parse("c:custom/1foo@none").is_err());
        assert!(MetricResourceIdentifier::parse("c:custom/foo@").is_err());
        assert!(is_mri("c:custom/foo@none"));
    }

    #[test]
    fn test_transaction_metric_mri() {
        assert_eq!(
            transaction_metric_mri("transaction.duration").as_deref(),
            Some("d:transactions/duration@millisecond")
        );
        assert_eq!(
            transaction_metric_mri("measurements.cls").as_deref(),
            Some("d:transactions/measurements.cls@none")
        );
        assert_eq!(
            transaction_metric_mri("spans.http").as_deref(),
            Some("d:transactions/breakdowns.span_ops.ops.http@millisecond")
        );
        assert_eq!(transaction_metric_mri("title"), None);
    }
}
