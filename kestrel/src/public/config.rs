use serde::{Deserialize, Serialize};

/// Per-branch simulation settings. Forks inherit their parent's configuration.
///
/// Deserializes from any serde format; missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Probe every multi-effect commit for order dependence.
    pub check_commutativity: bool,
    /// Relative tolerance for comparing floating point cells in the probe.
    pub float_tolerance: f64,
    /// Compare replayed suspension payloads against the recorded ones, not just their kinds.
    pub check_replay: bool,
    /// Keep a naming and dependency table for resources.
    pub diagnostics: bool,
    /// Give up on [run_to_quiescence][crate::Branch::run_to_quiescence] after this many batches.
    pub step_limit: Option<usize>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            check_commutativity: cfg!(debug_assertions),
            float_tolerance: 1e-9,
            check_replay: cfg!(debug_assertions),
            diagnostics: false,
            step_limit: None,
        }
    }
}

impl SimulationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_commutativity(mut self, enabled: bool) -> Self {
        self.check_commutativity = enabled;
        self
    }

    pub fn float_tolerance(mut self, tolerance: f64) -> Self {
        self.float_tolerance = tolerance;
        self
    }

    pub fn check_replay(mut self, enabled: bool) -> Self {
        self.check_replay = enabled;
        self
    }

    pub fn diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    pub fn step_limit(mut self, limit: usize) -> Self {
        self.step_limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = SimulationConfig::new().step_limit(50).diagnostics(true);
        assert_eq!(Some(50), config.step_limit);
        assert!(config.diagnostics);
        assert_eq!(1e-9, config.float_tolerance);
        assert_eq!(cfg!(debug_assertions), config.check_replay);
    }
}
