//! # `briny_dispatch`
//!
//! A backend-agnostic execution layer for tensor engines. Application code
//! issues array operations without naming the engine (CPU array library,
//! GPU library, autodiff library, ...) that runs them; a dispatcher picks
//! the engine from the runtime types of the operands and enforces one
//! precision policy across all of them.
//!
//! ## Features
//!
//! - **Registry**: ordered providers with an always-valid default
//! - **Resolution**: first provider that owns every operand, default
//!   fallback for plain numbers, hard error for mixed engines
//! - **Precision**: process-wide `f32`/`f64`/match-input policy, checked on
//!   every construction
//! - **CPU provider**: built-in, rayon-parallel default backend
//!
//! ## Modules
//!
//! - [`backend`]: the provider contract
//! - [`registry`]: provider set, default and precision
//! - [`ops`]: resolution, dispatcher and the CPU provider
//! - [`precision`]: widths and policies
//! - [`tensors`]: tensor handles and host values
//! - [`config`]: environment configuration
//! - [`error`]: error types
//!
//! ## Example
//!
//! ```rust
//! use briny_dispatch::{host, Op, Precision};
//!
//! let a = briny_dispatch::construct(&host![[1.0, 2.0], [3.0, 4.0]], None).unwrap();
//! assert_eq!(a.provider(), "cpu");
//!
//! // plain numbers are adopted by whichever provider owns the other operands
//! let b = briny_dispatch::execute(Op::Add, &[&a, &1.0_f64]).unwrap();
//! assert_eq!(b.shape(), &[2, 2]);
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::cast_precision_loss)]
#![deny(unsafe_code)]
#![deny(missing_docs)]

pub mod backend;
pub mod config;
pub mod error;
pub mod ops;
pub mod precision;
pub mod registry;
pub mod tensors;

pub use backend::{NativeArray, Op, Provider};
pub use config::DispatchConfig;
pub use error::{DispatchError, ParsePrecisionError, ProviderError};
pub use ops::cpu::{CpuArray, CpuData, CpuProvider};
pub use ops::dispatch::Dispatcher;
pub use precision::{FloatWidth, Precision, PrecisionGuard};
pub use registry::Registry;
pub use tensors::{DType, HostValue, Tensor};

use core::any::Any;
use lazy_static::lazy_static;
use std::sync::Arc;

lazy_static! {
    /// Process-default dispatcher, configured from the environment on
    /// first use.
    static ref PROCESS_DISPATCHER: Dispatcher =
        Dispatcher::from_config(&DispatchConfig::from_env());
}

/// The process-default dispatcher.
///
/// Holds the [`CpuProvider`] as default from the start. Code that wants an
/// isolated registry should build its own [`Dispatcher`] instead.
#[must_use]
pub fn dispatcher() -> &'static Dispatcher {
    &PROCESS_DISPATCHER
}

/// Resolves `operands` on the process-default dispatcher.
///
/// # Errors
///
/// See [`Dispatcher::resolve`].
pub fn resolve(operands: &[&dyn Any]) -> Result<Arc<dyn Provider>, DispatchError> {
    dispatcher().resolve(operands)
}

/// Constructs a tensor on the process-default dispatcher.
///
/// # Errors
///
/// See [`Dispatcher::construct`].
pub fn construct(value: &dyn Any, width_hint: Option<FloatWidth>) -> Result<Tensor, DispatchError> {
    dispatcher().construct(value, width_hint)
}

/// Executes `op` on the process-default dispatcher.
///
/// # Errors
///
/// See [`Dispatcher::execute`].
pub fn execute(op: Op, operands: &[&dyn Any]) -> Result<Tensor, DispatchError> {
    dispatcher().execute(op, operands)
}

/// Sets the process-wide precision policy, returning the previous one.
///
/// # Example
/// ```
/// use briny_dispatch::{precision, set_precision, Precision};
///
/// let previous = set_precision(Precision::F32);
/// assert_eq!(precision(), Precision::F32);
/// set_precision(previous);
/// ```
pub fn set_precision(precision: impl Into<Precision>) -> Precision {
    dispatcher().set_precision(precision)
}

/// The process-wide precision policy.
#[must_use]
pub fn precision() -> Precision {
    dispatcher().precision()
}

/// Registers a provider with the process-default dispatcher.
pub fn add_backend(provider: Arc<dyn Provider>) -> bool {
    dispatcher().add_backend(provider)
}

/// Unregisters a provider from the process-default dispatcher.
///
/// # Errors
///
/// See [`Dispatcher::remove_backend`].
pub fn remove_backend(name: &str, replacement: Option<&str>) -> Result<bool, DispatchError> {
    dispatcher().remove_backend(name, replacement)
}

/// Changes the default provider of the process-default dispatcher.
///
/// # Errors
///
/// See [`Dispatcher::set_default_backend`].
pub fn set_default_backend(name: &str) -> Result<(), DispatchError> {
    dispatcher().set_default_backend(name)
}

/// The default provider of the process-default dispatcher.
#[must_use]
pub fn default_backend() -> Arc<dyn Provider> {
    dispatcher().default_backend()
}
