//! Training progress logging.
//!
//! [`TrainingLogger`] gates `tracing` events behind a [`Verbosity`] level so
//! boosters can report per-round progress without forcing a subscriber
//! configuration on the caller.

use serde::{Deserialize, Serialize};

/// How much a booster reports while training.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    #[default]
    Silent,
    Warning,
    Info,
    Debug,
}

impl Verbosity {
    /// Map the integer `silent` flag onto a level.
    pub fn from_silent(silent: bool) -> Self {
        if silent {
            Self::Silent
        } else {
            Self::Info
        }
    }
}

/// Verbosity-gated progress reporter.
#[derive(Debug, Clone)]
pub struct TrainingLogger {
    verbosity: Verbosity,
}

impl TrainingLogger {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    #[inline]
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    #[inline]
    pub fn enabled(&self, level: Verbosity) -> bool {
        level != Verbosity::Silent && self.verbosity >= level
    }

    /// Report named per-round values.
    pub fn log_metrics(&self, round: usize, metrics: &[(&str, f64)]) {
        if !self.enabled(Verbosity::Info) {
            return;
        }
        let rendered = metrics
            .iter()
            .map(|(name, value)| format!("{name}={value:.6}"))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!(round, metrics = %rendered, "round finished");
    }

    pub fn debug(&self, message: &str) {
        if self.enabled(Verbosity::Debug) {
            tracing::debug!("{message}");
        }
    }
}

impl Default for TrainingLogger {
    fn default() -> Self {
        Self::new(Verbosity::Silent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_ordering() {
        assert!(Verbosity::Debug > Verbosity::Info);
        assert!(Verbosity::Warning > Verbosity::Silent);
        assert_eq!(Verbosity::from_silent(true), Verbosity::Silent);
        assert_eq!(Verbosity::from_silent(false), Verbosity::Info);
    }

    #[test]
    fn enabled_levels() {
        let logger = TrainingLogger::new(Verbosity::Info);
        assert!(logger.enabled(Verbosity::Warning));
        assert!(logger.enabled(Verbosity::Info));
        assert!(!logger.enabled(Verbosity::Debug));
        assert!(!TrainingLogger::default().enabled(Verbosity::Warning));
    }

    #[test]
    fn logging_without_subscriber() {
        let logger = TrainingLogger::new(Verbosity::Debug);
        logger.log_metrics(0, &[("leaves", 3.0)]);
        logger.debug("detail");
        TrainingLogger::default().log_metrics(1, &[]);
    }
}
