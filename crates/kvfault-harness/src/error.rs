//! Run abort type.

use kvfault_core::{HarnessError, Phase, TestReport};

/// A run that stopped before reaching `Done`.
///
/// Carries everything measured up to the failing phase so the caller can
/// still print it.
#[derive(Debug, thiserror::Error)]
#[error("run aborted during {phase}: {source}")]
pub struct RunAborted {
    /// Phase that was executing when the run aborted.
    pub phase: Phase,
    /// Fatal error.
    pub source: HarnessError,
    /// Partial report: every phase completed before the abort.
    pub report: Box<TestReport>,
}

impl RunAborted {
    /// Creates an abort record.
    #[must_use]
    pub fn new(phase: Phase, source: HarnessError, report: TestReport) -> Self {
        Self {
            phase,
            source,
            report: Box::new(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display_and_source() {
        let err = RunAborted::new(
            Phase::Setup,
            HarnessError::config("node 4 is a replica"),
            TestReport::default(),
        );
        assert_eq!(
            err.to_string(),
            "run aborted during setup: configuration error: node 4 is a replica"
        );
        assert!(err.source().is_some());
        assert!(err.report.phases.is_empty());
    }
}
