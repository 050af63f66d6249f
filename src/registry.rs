//! Backend registry.
//!
//! An ordered set of providers, the default among them and the active
//! precision policy. Registration order is the tie-break used by
//! resolution, so more specific providers should be added before generic
//! ones.
//!
//! The registry is never empty: it is built around a default provider and
//! refuses every mutation that would leave the default dangling. Failed
//! mutations are rejected before anything changes.

use crate::backend::Provider;
use crate::error::DispatchError;
use crate::precision::Precision;
use core::fmt;
use std::sync::Arc;
use tracing::debug;

/// Providers, default provider and precision policy.
///
/// Plain data: synchronisation is the [`Dispatcher`](crate::Dispatcher)'s job.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use briny_dispatch::{CpuProvider, Registry};
///
/// let registry = Registry::new(Arc::new(CpuProvider));
/// assert_eq!(registry.len(), 1);
/// assert_eq!(registry.default_backend().name(), "cpu");
/// ```
#[derive(Clone)]
pub struct Registry {
    providers: Vec<Arc<dyn Provider>>,
    default: Arc<dyn Provider>,
    precision: Precision,
}

impl Registry {
    /// Creates a registry holding only `default`, which is also the default.
    pub fn new(default: Arc<dyn Provider>) -> Self {
        Self {
            providers: vec![Arc::clone(&default)],
            default,
            precision: Precision::default(),
        }
    }

    /// Registers `provider` at the end of the order.
    ///
    /// Idempotent by name: returns `false` and changes nothing if a provider
    /// with the same name is already registered. The default is untouched.
    pub fn add(&mut self, provider: Arc<dyn Provider>) -> bool {
        if self.contains(provider.name()) {
            debug!(backend = provider.name(), "backend already registered");
            return false;
        }
        debug!(backend = provider.name(), "registering backend");
        self.providers.push(provider);
        true
    }

    /// Unregisters the provider called `name`.
    ///
    /// If `replacement` is given it becomes the default once `name` is gone.
    /// Returns `Ok(false)` if `name` was not registered.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidState`] if `name` is the default and no
    ///   replacement is given, or the replacement is `name` itself.
    /// - [`DispatchError::NotRegistered`] if the replacement is unknown.
    pub fn remove(&mut self, name: &str, replacement: Option<&str>) -> Result<bool, DispatchError> {
        if !self.contains(name) {
            return Ok(false);
        }

        let next_default = match replacement {
            Some(r) if r == name => {
                return Err(DispatchError::InvalidState(format!(
                    "backend `{name}` cannot replace itself as default"
                )));
            }
            Some(r) => Some(
                self.get(r)
                    .cloned()
                    .ok_or_else(|| DispatchError::not_registered(r))?,
            ),
            None if self.default.name() == name => {
                return Err(DispatchError::InvalidState(format!(
                    "backend `{name}` is the default; supply a replacement before removing it"
                )));
            }
            None => None,
        };

        debug!(backend = name, "removing backend");
        self.providers.retain(|p| p.name() != name);
        if let Some(default) = next_default {
            debug!(backend = default.name(), "default backend changed");
            self.default = default;
        }
        Ok(true)
    }

    /// Makes the registered provider `name` the default.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NotRegistered`] if no such provider is registered.
    pub fn set_default(&mut self, name: &str) -> Result<(), DispatchError> {
        let provider = self
            .get(name)
            .cloned()
            .ok_or_else(|| DispatchError::not_registered(name))?;
        debug!(backend = name, "default backend changed");
        self.default = provider;
        Ok(())
    }

    /// The default provider. Always registered.
    #[must_use]
    pub fn default_backend(&self) -> &Arc<dyn Provider> {
        &self.default
    }

    /// Looks up a provider by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Provider>> {
        self.providers.iter().find(|p| p.name() == name)
    }

    /// Returns `true` if a provider called `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Providers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.iter()
    }

    /// Provider names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Number of registered providers. Never zero.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Always `false`; present for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Active precision policy.
    #[must_use]
    pub const fn precision(&self) -> Precision {
        self.precision
    }

    /// Replaces the precision policy, returning the previous one.
    pub fn set_precision(&mut self, precision: Precision) -> Precision {
        debug!(%precision, "precision changed");
        core::mem::replace(&mut self.precision, precision)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("backends", &self.names())
            .field("default", &self.default.name())
            .field("precision", &self.precision)
            .finish()
    }
}
