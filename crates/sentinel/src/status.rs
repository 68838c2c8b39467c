//! Global system status derived from the incident collection.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::incident::{Incident, IncidentId, IncidentStatus};

/// Aggregate state shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemStatus {
    /// Nothing needs attention
    Healthy,
    /// An incident holds the analysis slot
    Analyzing,
    /// A diagnosis is waiting for a human decision
    IncidentDetected,
    /// An approved remediation is executing
    Remediating,
}

impl SystemStatus {
    /// Derive the status.
    ///
    /// Precedence: an `ANALYZED` incident with no approved remediation in
    /// flight, then any `ANALYZING` incident, then any executing
    /// remediation, else healthy.
    pub fn aggregate<'a, I>(incidents: I, executing: &HashSet<IncidentId>) -> Self
    where
        I: IntoIterator<Item = &'a Incident>,
    {
        let mut analyzing = false;
        for incident in incidents {
            match incident.status {
                IncidentStatus::Analyzed if !executing.contains(&incident.id) => {
                    return Self::IncidentDetected;
                }
                IncidentStatus::Analyzing => analyzing = true,
                _ => {}
            }
        }

        if analyzing {
            Self::Analyzing
        } else if executing.is_empty() {
            Self::Healthy
        } else {
            Self::Remediating
        }
    }

    /// Display name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Analyzing => "ANALYZING",
            Self::IncidentDetected => "INCIDENT_DETECTED",
            Self::Remediating => "REMEDIATING",
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
