//! Incident factory: turns ERROR records into incident seeds.

use std::collections::VecDeque;

use crate::logs::LogRecord;

/// Default number of records handed to the analysis backend.
pub const DEFAULT_CONTEXT_WINDOW: usize = 15;

/// Material for a new incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentSeed {
    /// The ERROR record
    pub trigger: LogRecord,
    /// Trailing window ending with the trigger
    pub context: Vec<LogRecord>,
}

/// Watches generated records and snapshots a trailing window whenever one
/// of them should open an incident.
#[derive(Debug, Clone)]
pub struct IncidentFactory {
    window: VecDeque<LogRecord>,
    capacity: usize,
}

impl IncidentFactory {
    /// Create a factory keeping `capacity` records (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Window size.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a log line; returns a seed if it opens an incident.
    pub fn observe(&mut self, record: &LogRecord) -> Option<IncidentSeed> {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(record.clone());

        record.severity.is_incident_trigger().then(|| IncidentSeed {
            trigger: record.clone(),
            context: self.window.iter().cloned().collect(),
        })
    }
}

impl Default for IncidentFactory {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_WINDOW)
    }
}
