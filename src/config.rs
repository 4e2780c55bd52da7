//! Pipeline configuration.
//!
//! Every knob is an explicit value handed to the component that needs it.
//! Nothing in this crate reads ambient global state or infers behavior from
//! build flags; the binary (or the embedding service) decides once, here.

use serde::{Deserialize, Serialize};

/// How the integrity guard reacts when a sealed bundle fails verification
/// at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardMode {
    /// Refuse to serve the bundle. The read fails with
    /// [`crate::PipelineError::IntegrityViolation`].
    Strict,
    /// Log the violation and let the caller decide.
    Observe,
}

impl GuardMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardMode::Strict => "strict",
            GuardMode::Observe => "observe",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(GuardMode::Strict),
            "observe" => Some(GuardMode::Observe),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Enforcement mode for the integrity guard.
    pub guard_mode: GuardMode,
    /// Page size for `list_replayable`.
    pub replay_page_size: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            guard_mode: GuardMode::Strict,
            replay_page_size: crate::archive::REPLAY_PAGE_SIZE,
        }
    }
}

impl PipelineConfig {
    /// Build a config from `GRIDIRON_GUARD_MODE` / `GRIDIRON_REPLAY_PAGE_SIZE`,
    /// falling back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let guard_mode = std::env::var("GRIDIRON_GUARD_MODE")
            .ok()
            .and_then(|v| GuardMode::parse(&v))
            .unwrap_or(defaults.guard_mode);
        let replay_page_size = std::env::var("GRIDIRON_REPLAY_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.replay_page_size);
        Self {
            guard_mode,
            replay_page_size,
        }
    }
}
