//! Log records flowing through the pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Alphabet for record ids (base 36).
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of a record id.
const ID_LEN: usize = 9;

/// Log severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Normal operation
    Info,
    /// Something looks off
    Warn,
    /// A failure that opens an incident
    Error,
    /// Accepted from external producers; the generator never emits it
    Critical,
}

impl Severity {
    /// Whether a record at this severity opens an incident.
    #[must_use]
    pub const fn is_incident_trigger(&self) -> bool {
        matches!(self, Self::Error | Self::Critical)
    }

    /// Upper-case wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single log line from a (simulated) pod.
///
/// Immutable once created. Field names on the wire follow the analysis
/// backend's schema (`level`, `pod`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Short random identifier; uniqueness is not guaranteed
    pub id: String,
    /// When the record was produced
    pub timestamp: DateTime<Utc>,
    /// Severity
    #[serde(rename = "level")]
    pub severity: Severity,
    /// Pod that produced the line
    #[serde(rename = "pod")]
    pub source_pod: String,
    /// Log message
    pub message: String,
}

impl LogRecord {
    /// Create a record stamped now, with an id drawn from `rng`.
    pub fn with_rng<R: Rng + ?Sized>(
        rng: &mut R,
        severity: Severity,
        source_pod: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: short_id(rng),
            timestamp: Utc::now(),
            severity,
            source_pod: source_pod.into(),
            message: message.into(),
        }
    }

    /// Create a record stamped now, using the thread-local RNG for the id.
    pub fn new(severity: Severity, source_pod: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_rng(&mut rand::thread_rng(), severity, source_pod, message)
    }

    /// Render as `[timestamp] [LEVEL] [pod] message`.
    #[must_use]
    pub fn format_line(&self) -> String {
        format!(
            "[{}] [{}] [{}] {}",
            self.timestamp.to_rfc3339(),
            self.severity,
            self.source_pod,
            self.message
        )
    }
}

/// Draw a 9-character base-36 id.
pub fn short_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ID_LEN)
        .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_short_id_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = short_id(&mut rng);
        assert_eq!(id.len(), 9);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_incident_trigger_levels() {
        assert!(!Severity::Info.is_incident_trigger());
        assert!(!Severity::Warn.is_incident_trigger());
        assert!(Severity::Error.is_incident_trigger());
        assert!(Severity::Critical.is_incident_trigger());
    }

    #[test]
    fn test_wire_field_names() {
        let record = LogRecord::new(Severity::Warn, "api-gateway-6c4d1", "Slow upstream");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["level"], "WARN");
        assert_eq!(json["pod"], "api-gateway-6c4d1");
        assert_eq!(json["message"], "Slow upstream");
        assert!(json.get("severity").is_none());

        let back: LogRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_format_line() {
        let record = LogRecord::new(Severity::Error, "payment-service-7d9cf", "OOMKilled");
        let line = record.format_line();
        assert!(line.ends_with("[ERROR] [payment-service-7d9cf] OOMKilled"));
        assert!(line.starts_with('['));
    }
}
