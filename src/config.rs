//! Startup configuration for the process-default dispatcher.
//!
//! Only the precision policy is configurable. It is read from
//! [`PRECISION_ENV`] the first time the process-default dispatcher is
//! touched; later changes go through [`set_precision`](crate::set_precision).

use crate::precision::Precision;
use tracing::warn;

/// Environment variable holding the initial precision
/// (`32`, `64` or `match-input`).
pub const PRECISION_ENV: &str = "BRINY_DISPATCH_PRECISION";

/// Settings applied when a dispatcher is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchConfig {
    /// Initial precision policy.
    pub precision: Precision,
}

impl DispatchConfig {
    /// Reads the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = lookup(PRECISION_ENV) {
            match raw.parse::<Precision>() {
                Ok(precision) => config.precision = precision,
                Err(e) => warn!(variable = PRECISION_ENV, error = %e, "ignoring precision"),
            }
        }
        config
    }

    /// Overrides the precision policy.
    #[must_use]
    pub const fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }
}
