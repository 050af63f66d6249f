//! Backend provider contract.
//!
//! A provider wraps one numeric engine (a CPU array library, a GPU library,
//! an autodiff library, ...). The dispatcher only ever talks to it through
//! three entry points:
//!
//! - [`Provider::recognizes`]: does this native value belong to you?
//! - [`Provider::construct`]: build a native value with a given float width.
//! - [`Provider::execute`]: run an operation over native operands.
//!
//! Providers never see the registry and never read the precision policy
//! themselves: the dispatcher hands them the width it resolved for the call.
//!
//! # Implementing a Provider
//!
//! ```
//! use std::any::Any;
//! use briny_dispatch::{DType, FloatWidth, NativeArray, Op, Provider, ProviderError};
//!
//! #[derive(Debug)]
//! struct Counter(Vec<usize>);
//!
//! impl NativeArray for Counter {
//!     fn dtype(&self) -> DType { DType::I64 }
//!     fn shape(&self) -> &[usize] { &self.0 }
//! }
//!
//! struct CounterProvider;
//!
//! impl Provider for CounterProvider {
//!     fn name(&self) -> &str { "counter" }
//!
//!     fn recognizes(&self, value: &dyn Any) -> bool {
//!         value.is::<Counter>()
//!     }
//!
//!     fn dtype_of(&self, value: &dyn Any) -> Option<DType> {
//!         value.downcast_ref::<Counter>().map(NativeArray::dtype)
//!     }
//!
//!     fn construct(
//!         &self,
//!         _value: &dyn Any,
//!         _width: FloatWidth,
//!     ) -> Result<Box<dyn NativeArray>, ProviderError> {
//!         Err(ProviderError::UnsupportedValue("counter cannot hold floats".into()))
//!     }
//!
//!     fn execute(
//!         &self,
//!         op: Op,
//!         _operands: &[&dyn Any],
//!     ) -> Result<Box<dyn NativeArray>, ProviderError> {
//!         Err(ProviderError::UnsupportedOp(op))
//!     }
//! }
//! ```

use crate::error::ProviderError;
use crate::precision::FloatWidth;
use crate::tensors::DType;
use core::any::Any;
use core::fmt;

/// Operations routed through the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Elementwise `a + b`.
    Add,
    /// Elementwise `a - b`.
    Sub,
    /// Elementwise `a * b`.
    Mul,
    /// Elementwise `a / b`.
    Div,
    /// Elementwise maximum.
    Maximum,
    /// Elementwise minimum.
    Minimum,
    /// Elementwise negation.
    Neg,
    /// Elementwise absolute value.
    Abs,
    /// Elementwise square root.
    Sqrt,
    /// Elementwise `e^x`.
    Exp,
    /// Sum of all elements, producing a scalar.
    Sum,
    /// Matrix product of two 2-D operands.
    MatMul,
}

impl Op {
    /// Number of operands the operation takes.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::Add
            | Self::Sub
            | Self::Mul
            | Self::Div
            | Self::Maximum
            | Self::Minimum
            | Self::MatMul => 2,
            Self::Neg | Self::Abs | Self::Sqrt | Self::Exp | Self::Sum => 1,
        }
    }
}

/// A value owned by a provider.
///
/// Only dtype and shape are introspected by the dispatcher; everything else
/// stays private to the provider, which downcasts through [`Any`].
pub trait NativeArray: Any + Send + Sync + fmt::Debug {
    /// Element type.
    fn dtype(&self) -> DType;

    /// Dimensions, row-major. Scalars have an empty shape.
    fn shape(&self) -> &[usize];
}

/// One numeric engine, as seen by the dispatcher.
///
/// Providers are registered behind an `Arc` and shared; they must be
/// thread-safe and are never mutated by the dispatcher.
pub trait Provider: Send + Sync {
    /// Unique name within a registry. Used as the provider's identity.
    fn name(&self) -> &str;

    /// Returns `true` if `value` is one of this provider's native types.
    ///
    /// `value` is already unwrapped from any [`Tensor`](crate::Tensor)
    /// handle. Host values (plain numbers, lists) should not be claimed.
    fn recognizes(&self, value: &dyn Any) -> bool;

    /// Builds a native value from `value` with elements of `width`.
    ///
    /// `value` is either one of this provider's natives or a foreign value
    /// (usually a [`HostValue`](crate::HostValue) or a plain Rust number)
    /// the provider is asked to adopt.
    ///
    /// # Errors
    ///
    /// [`ProviderError::UnsupportedValue`] if the value cannot be adopted.
    fn construct(
        &self,
        value: &dyn Any,
        width: FloatWidth,
    ) -> Result<Box<dyn NativeArray>, ProviderError>;

    /// Runs `op` over operands that this provider recognizes.
    ///
    /// # Errors
    ///
    /// Provider-specific failures such as shape mismatches or wrong arity.
    fn execute(
        &self,
        op: Op,
        operands: &[&dyn Any],
    ) -> Result<Box<dyn NativeArray>, ProviderError>;

    /// Element type of one of this provider's natives, `None` for values it
    /// does not own.
    ///
    /// Used to preserve widths under [`Precision::MatchInput`](crate::Precision)
    /// when a raw native is passed without its [`Tensor`](crate::Tensor) handle.
    fn dtype_of(&self, value: &dyn Any) -> Option<DType>;

    /// Whether `op` is implemented.
    fn supports(&self, op: Op) -> bool {
        let _ = op;
        true
    }
}

impl fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Provider").field(&self.name()).finish()
    }
}
