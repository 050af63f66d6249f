//! Dispatcher
//!
//! Owns a [`Registry`] behind a lock and routes every numeric call through
//! [resolution](super::resolve), precision handling and the selected
//! provider.
//!
//! Each call works on one immutable snapshot of the registry, so it sees
//! a single consistent combination of providers, default and precision
//! even while other threads mutate the dispatcher. Mutations copy the
//! snapshot, validate, apply and publish; a rejected mutation publishes
//! nothing.
//!
//! # Example
//! ```rust
//! use briny_dispatch::{Dispatcher, FloatWidth, Op, Precision};
//!
//! let dispatcher = Dispatcher::with_cpu();
//! dispatcher.set_precision(Precision::F32);
//!
//! let t = dispatcher.construct(&vec![1.0_f64, 2.0, 3.0], None).unwrap();
//! assert_eq!(t.dtype().float_width(), Some(FloatWidth::F32));
//!
//! let doubled = dispatcher.execute(Op::Mul, &[&t, &2.0_f32]).unwrap();
//! assert_eq!(doubled.provider(), "cpu");
//! ```

use super::cpu::CpuProvider;
use super::resolve::{self, Operand, Resolution};
use crate::backend::{NativeArray, Op, Provider};
use crate::config::DispatchConfig;
use crate::error::{DispatchError, ProviderError};
use crate::precision::{FloatWidth, Precision, PrecisionGuard};
use crate::registry::Registry;
use crate::tensors::{HostValue, Tensor};
use core::any::Any;
use core::convert::Infallible;
use core::fmt;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Thread-safe front end over a [`Registry`].
pub struct Dispatcher {
    state: RwLock<Arc<Registry>>,
}

impl Dispatcher {
    /// Creates a dispatcher whose only (and default) provider is `default`.
    pub fn new(default: Arc<dyn Provider>) -> Self {
        Self::from_registry(Registry::new(default))
    }

    /// Wraps an existing registry.
    #[must_use]
    pub fn from_registry(registry: Registry) -> Self {
        Self {
            state: RwLock::new(Arc::new(registry)),
        }
    }

    /// Creates a dispatcher with the built-in [`CpuProvider`] as default.
    #[must_use]
    pub fn with_cpu() -> Self {
        Self::new(Arc::new(CpuProvider))
    }

    /// Creates a CPU-backed dispatcher configured by `config`.
    #[must_use]
    pub fn from_config(config: &DispatchConfig) -> Self {
        let mut registry = Registry::new(Arc::new(CpuProvider));
        registry.set_precision(config.precision);
        Self::from_registry(registry)
    }

    /// The current registry snapshot.
    ///
    /// The snapshot never changes; later mutations publish a new one.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Registry> {
        Arc::clone(&self.state.read())
    }

    /// Applies `f` to a copy of the current registry and publishes the copy
    /// only if `f` succeeds.
    fn update<R, E>(&self, f: impl FnOnce(&mut Registry) -> Result<R, E>) -> Result<R, E> {
        let mut state = self.state.write();
        let mut next = Registry::clone(&state);
        let out = f(&mut next)?;
        *state = Arc::new(next);
        Ok(out)
    }

    /// Registers `provider` after the existing ones.
    ///
    /// Returns `false` if a provider with that name is already registered.
    pub fn add_backend(&self, provider: Arc<dyn Provider>) -> bool {
        let Ok(added) = self.update(|r| Ok::<_, Infallible>(r.add(provider)));
        added
    }

    /// Unregisters the provider `name`, optionally naming a new default.
    ///
    /// Removing an unregistered provider is a no-op returning `Ok(false)`.
    ///
    /// # Errors
    ///
    /// See [`Registry::remove`]. The registry is unchanged on error.
    pub fn remove_backend(
        &self,
        name: &str,
        replacement: Option<&str>,
    ) -> Result<bool, DispatchError> {
        self.update(|r| r.remove(name, replacement))
    }

    /// Makes the registered provider `name` the default.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NotRegistered`] if `name` is not registered.
    pub fn set_default_backend(&self, name: &str) -> Result<(), DispatchError> {
        self.update(|r| r.set_default(name))
    }

    /// The current default provider.
    #[must_use]
    pub fn default_backend(&self) -> Arc<dyn Provider> {
        Arc::clone(self.snapshot().default_backend())
    }

    /// Registered providers in order.
    #[must_use]
    pub fn backends(&self) -> Vec<Arc<dyn Provider>> {
        self.snapshot().iter().cloned().collect()
    }

    /// Registered provider names in order.
    #[must_use]
    pub fn backend_names(&self) -> Vec<String> {
        self.snapshot().iter().map(|p| p.name().to_owned()).collect()
    }

    /// Looks up a registered provider.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.snapshot().get(name).cloned()
    }

    /// Active precision policy.
    #[must_use]
    pub fn precision(&self) -> Precision {
        self.state.read().precision()
    }

    /// Sets the precision policy for every later construction.
    ///
    /// Returns the previous policy. Existing values are not touched.
    pub fn set_precision(&self, precision: impl Into<Precision>) -> Precision {
        let precision = precision.into();
        let Ok(previous) = self.update(|r| Ok::<_, Infallible>(r.set_precision(precision)));
        previous
    }

    /// Sets `precision` until the returned guard is dropped.
    pub fn precision_scope(&self, precision: impl Into<Precision>) -> PrecisionGuard<'_> {
        let previous = self.set_precision(precision);
        PrecisionGuard::new(self, previous)
    }

    /// The provider responsible for `operands`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::BackendMismatch`] if operands come from different
    /// providers.
    pub fn resolve(&self, operands: &[&dyn Any]) -> Result<Arc<dyn Provider>, DispatchError> {
        let registry = self.snapshot();
        resolve::resolve(&registry, operands, false).map(Resolution::into_provider)
    }

    /// Like [`resolve`](Self::resolve), but the default provider wins
    /// whenever it can take all operands.
    ///
    /// # Errors
    ///
    /// [`DispatchError::BackendMismatch`] if operands come from different
    /// providers.
    pub fn resolve_preferring_default(
        &self,
        operands: &[&dyn Any],
    ) -> Result<Arc<dyn Provider>, DispatchError> {
        let registry = self.snapshot();
        resolve::resolve(&registry, operands, true).map(Resolution::into_provider)
    }

    /// Builds a tensor from `value`.
    ///
    /// `value` may be a host value, a plain number or vector, or a native
    /// (raw or wrapped in a [`Tensor`]). The width is `width_hint` if given,
    /// otherwise whatever the precision policy dictates for the source.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NoBackendFound`] if no provider can adopt `value`.
    /// - [`DispatchError::PrecisionViolation`] if the provider ignored the
    ///   requested width.
    /// - [`DispatchError::Provider`] for other provider failures.
    pub fn construct(
        &self,
        value: &dyn Any,
        width_hint: Option<FloatWidth>,
    ) -> Result<Tensor, DispatchError> {
        let registry = self.snapshot();
        let resolution = resolve::resolve(&registry, &[value], false)?;
        let provider = resolution.provider();
        let operand = resolution.operands()[0];
        let native = build(&registry, provider.as_ref(), operand, width_hint)?;
        Ok(Tensor::new(provider.name(), native))
    }

    /// Executes `op` over `operands` on the resolved provider.
    ///
    /// Foreign operands are adopted by that provider first, following the
    /// precision policy.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::BackendMismatch`] for operands from different providers.
    /// - [`DispatchError::Unsupported`] if the provider lacks `op`.
    /// - Any error of [`construct`](Self::construct) while adopting.
    /// - [`DispatchError::Provider`] if execution fails.
    pub fn execute(&self, op: Op, operands: &[&dyn Any]) -> Result<Tensor, DispatchError> {
        let registry = self.snapshot();
        let resolution = resolve::resolve(&registry, operands, false)?;
        let provider = resolution.provider();

        if !provider.supports(op) {
            return Err(DispatchError::Unsupported {
                provider: provider.name().to_owned(),
                op,
            });
        }

        let adopted = resolution
            .operands()
            .iter()
            .map(|operand| {
                if operand.is_foreign() {
                    build(&registry, provider.as_ref(), *operand, None).map(Some)
                } else {
                    Ok(None)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let natives: Vec<&dyn Any> = resolution
            .operands()
            .iter()
            .zip(&adopted)
            .map(|(operand, adopted)| match adopted {
                Some(native) => as_any(native.as_ref()),
                None => operand.value(),
            })
            .collect();

        let out = provider
            .execute(op, &natives)
            .map_err(|e| DispatchError::provider(provider.name(), e))?;
        Ok(Tensor::new(provider.name(), out))
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_cpu()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dispatcher").field(&self.snapshot()).finish()
    }
}

fn as_any(native: &dyn NativeArray) -> &dyn Any {
    native
}

/// Width carried by the value being constructed from, if any.
///
/// A [`Tensor`] handle's dtype wins; raw natives ask their provider and
/// host values report their own width.
fn source_width(provider: &dyn Provider, operand: Operand<'_>) -> Option<FloatWidth> {
    let value = operand.value();
    let dtype = operand.dtype().or_else(|| {
        if operand.is_foreign() {
            None
        } else {
            provider.dtype_of(value)
        }
    });
    match dtype {
        Some(dtype) => dtype.float_width(),
        None => HostValue::from_any(value).and_then(|h| h.float_width()),
    }
}

fn build(
    registry: &Registry,
    provider: &dyn Provider,
    operand: Operand<'_>,
    width_hint: Option<FloatWidth>,
) -> Result<Box<dyn NativeArray>, DispatchError> {
    let width = width_hint
        .unwrap_or_else(|| registry.precision().target(source_width(provider, operand)));

    let native = provider
        .construct(operand.value(), width)
        .map_err(|e| match e {
            ProviderError::UnsupportedValue(what) if operand.is_foreign() => {
                debug!(backend = provider.name(), %what, "value could not be adopted");
                DispatchError::NoBackendFound { value: what }
            }
            other => DispatchError::provider(provider.name(), other),
        })?;

    // the policy only governs float widths
    let actual = native.dtype();
    if actual.is_float() && actual.float_width() != Some(width) {
        return Err(DispatchError::PrecisionViolation {
            provider: provider.name().to_owned(),
            expected: width,
            actual,
        });
    }
    Ok(native)
}
