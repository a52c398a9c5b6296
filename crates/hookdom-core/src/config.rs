use std::env;

/// Environment variable read by [`EngineConfig::from_env`].
pub const MAX_FLUSH_PASSES_ENV: &str = "HOOKDOM_MAX_FLUSH_PASSES";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on flush + passive-effect passes in one `run_until_idle` call.
    pub max_flush_passes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_flush_passes: 64,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the environment; unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = env::var(MAX_FLUSH_PASSES_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(passes) if passes > 0 => config.max_flush_passes = passes,
                _ => log::warn!("ignoring {MAX_FLUSH_PASSES_ENV}={raw:?}"),
            }
        }
        config
    }

    pub fn with_max_flush_passes(mut self, passes: usize) -> Self {
        self.max_flush_passes = passes.max(1);
        self
    }
}
