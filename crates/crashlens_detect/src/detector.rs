//! Detector trait and registry.

use std::sync::Arc;

use tracing::debug;

use crashlens_core::{CrashlensConfig, DetectorKind, Trace};

use crate::detectors::{
    FallbackFailureDetector, FallbackStormDetector, OverkillModelDetector, RetryLoopDetector,
};
use crate::error::DetectResult;
use crate::issue::Issue;

/// A waste pattern detector.
///
/// Detectors are pure: the same trace and configuration always produce the
/// same issues, and every issue refers to the trace it was given.
#[cfg_attr(test, mockall::automock)]
pub trait Detector: Send + Sync {
    /// Which pattern this detector finds.
    fn kind(&self) -> DetectorKind;

    /// Scan one trace.
    fn detect(&self, trace: &Trace, config: &CrashlensConfig) -> DetectResult<Vec<Issue>>;
}

/// Detectors in evaluation order.
#[derive(Default)]
pub struct DetectorRegistry {
    detectors: Vec<Arc<dyn Detector>>,
}

impl DetectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// Build the standard pipeline, skipping detectors disabled in `config`.
    pub fn from_config(config: &CrashlensConfig) -> DetectResult<Self> {
        let mut registry = Self::new();
        for kind in DetectorKind::ALL {
            if !config.suppression_rules.is_enabled(kind) {
                debug!("Detector {} disabled by configuration", kind);
                continue;
            }
            let detector: Arc<dyn Detector> = match kind {
                DetectorKind::RetryLoop => Arc::new(RetryLoopDetector::new()),
                DetectorKind::FallbackStorm => Arc::new(FallbackStormDetector::new()),
                DetectorKind::FallbackFailure => Arc::new(FallbackFailureDetector::new()),
                DetectorKind::OverkillModel => {
                    Arc::new(OverkillModelDetector::from_config(&config.thresholds.overkill)?)
                }
            };
            registry.register(detector);
        }
        Ok(registry)
    }

    /// Append a detector; it runs after those already registered.
    pub fn register(&mut self, detector: Arc<dyn Detector>) {
        debug!("Registering detector: {}", detector.kind());
        self.detectors.push(detector);
    }

    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.register(detector);
        self
    }

    pub fn detectors(&self) -> &[Arc<dyn Detector>] {
        &self.detectors
    }

    pub fn kinds(&self) -> Vec<DetectorKind> {
        self.detectors.iter().map(|d| d.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

impl std::fmt::Debug for DetectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorRegistry")
            .field("detectors", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_order() {
        let config = CrashlensConfig::builtin().unwrap();
        let registry = DetectorRegistry::from_config(&config).unwrap();
        assert_eq!(registry.kinds(), DetectorKind::ALL.to_vec());
    }

    #[test]
    fn test_disabled_detector_is_skipped() {
        let mut config = CrashlensConfig::builtin().unwrap();
        config.suppression_rules.fallback_storm.enabled = false;

        let registry = DetectorRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 3);
        assert!(!registry.kinds().contains(&DetectorKind::FallbackStorm));
    }

    #[test]
    fn test_register_mock() {
        let mut mock = MockDetector::new();
        mock.expect_kind().return_const(DetectorKind::OverkillModel);

        let registry = DetectorRegistry::new().with_detector(Arc::new(mock));
        assert_eq!(registry.kinds(), vec![DetectorKind::OverkillModel]);
    }
}
