//! Scenario log generator.
//!
//! Produces one [`LogRecord`] per tick. Routine ticks pick a random pod and
//! an INFO or WARN message. Critical ticks replay a scripted
//! [`CriticalScenario`] one ERROR line at a time, all attributed to the
//! scenario's target pod, until the script is exhausted.
//!
//! Scenario progress lives in a [`ScenarioCursor`] owned by the caller and
//! threaded through every call, so the generator itself holds no hidden
//! progress state.

pub mod catalog;

pub use catalog::{Catalog, CriticalScenario};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::error::SentinelResult;
use crate::logs::{LogRecord, Severity};

/// Default probability of a routine record being WARN.
pub const DEFAULT_WARN_PROBABILITY: f64 = 0.08;

/// Default probability of a tick starting a critical scenario.
pub const DEFAULT_CRITICAL_PROBABILITY: f64 = 0.05;

/// Position inside the currently replaying scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveScenario {
    /// Index into the catalog's scenario list
    scenario: usize,
    /// Next message to emit; always `< messages.len()`
    next_index: usize,
}

/// Caller-owned scenario progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScenarioCursor {
    active: Option<ActiveScenario>,
}

impl ScenarioCursor {
    /// A cursor with no scenario in progress.
    #[must_use]
    pub const fn new() -> Self {
        Self { active: None }
    }

    /// Whether a scenario is mid-replay.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Index of the next message of the active scenario.
    #[must_use]
    pub fn next_index(&self) -> Option<usize> {
        self.active.map(|a| a.next_index)
    }

    /// Forget any scenario in progress.
    pub fn reset(&mut self) {
        self.active = None;
    }
}

/// Log generator over a validated catalog.
pub struct LogGenerator<R = StdRng> {
    catalog: Catalog,
    rng: R,
    warn_probability: f64,
    critical_probability: f64,
}

impl LogGenerator<StdRng> {
    /// Create a generator seeded from OS entropy.
    pub fn new(catalog: Catalog) -> SentinelResult<Self> {
        Self::with_rng(catalog, StdRng::from_entropy())
    }

    /// Create a deterministic generator.
    pub fn seeded(catalog: Catalog, seed: u64) -> SentinelResult<Self> {
        Self::with_rng(catalog, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> LogGenerator<R> {
    /// Create a generator with an explicit RNG. Validates the catalog.
    pub fn with_rng(catalog: Catalog, rng: R) -> SentinelResult<Self> {
        catalog.validate()?;
        Ok(Self {
            catalog,
            rng,
            warn_probability: DEFAULT_WARN_PROBABILITY,
            critical_probability: DEFAULT_CRITICAL_PROBABILITY,
        })
    }

    /// Override the WARN and critical-trigger probabilities (clamped to 0..=1).
    #[must_use]
    pub fn with_probabilities(mut self, warn: f64, critical: f64) -> Self {
        self.warn_probability = warn.clamp(0.0, 1.0);
        self.critical_probability = critical.clamp(0.0, 1.0);
        self
    }

    /// The scenario the cursor is replaying, if any.
    #[must_use]
    pub fn active_scenario(&self, cursor: &ScenarioCursor) -> Option<&CriticalScenario> {
        cursor
            .active
            .and_then(|a| self.catalog.scenarios.get(a.scenario))
    }

    /// One timer tick: keeps an active scenario going, otherwise rolls the
    /// biased critical trigger.
    pub fn tick(&mut self, cursor: &mut ScenarioCursor) -> LogRecord {
        let force_critical =
            cursor.is_active() || self.rng.gen_bool(self.critical_probability);
        self.next_record(cursor, force_critical)
    }

    /// Produce the next record.
    ///
    /// With `force_critical` the next scenario line is emitted (starting a
    /// freshly chosen scenario if none is active). The cursor is cleared on
    /// the same call that returns a scenario's last line.
    pub fn next_record(&mut self, cursor: &mut ScenarioCursor, force_critical: bool) -> LogRecord {
        if !force_critical {
            return self.routine_record();
        }

        let active = match cursor.active {
            Some(active)
                if self
                    .catalog
                    .scenarios
                    .get(active.scenario)
                    .is_some_and(|s| active.next_index < s.messages.len()) =>
            {
                active
            }
            _ => self.start_scenario(),
        };

        let scenario = &self.catalog.scenarios[active.scenario];
        let record = LogRecord::with_rng(
            &mut self.rng,
            Severity::Error,
            scenario.target_pod,
            scenario.messages[active.next_index],
        );

        let next_index = active.next_index + 1;
        cursor.active = if next_index >= scenario.messages.len() {
            debug!(scenario = scenario.name, "Critical scenario fully emitted");
            None
        } else {
            Some(ActiveScenario {
                scenario: active.scenario,
                next_index,
            })
        };

        record
    }

    fn start_scenario(&mut self) -> ActiveScenario {
        let scenario = self.rng.gen_range(0..self.catalog.scenarios.len());
        let chosen = &self.catalog.scenarios[scenario];
        info!(
            scenario = chosen.name,
            target_pod = chosen.target_pod,
            suggested_tool = chosen.suggested_tool,
            "Critical scenario started"
        );
        ActiveScenario {
            scenario,
            next_index: 0,
        }
    }

    fn routine_record(&mut self) -> LogRecord {
        let (severity, messages) = if self.rng.gen_bool(self.warn_probability) {
            (Severity::Warn, self.catalog.warn_messages)
        } else {
            (Severity::Info, self.catalog.info_messages)
        };
        let pod = pick(&mut self.rng, self.catalog.pods);
        let message = pick(&mut self.rng, messages);
        LogRecord::with_rng(&mut self.rng, severity, pod, message)
    }
}

fn pick<R: Rng>(rng: &mut R, items: &'static [&'static str]) -> &'static str {
    items[rng.gen_range(0..items.len())]
}
