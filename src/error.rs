//! Error types raised by the dispatcher and by providers.
//!
//! Every error is returned synchronously at the point it is detected. The
//! dispatcher never retries and never downgrades a provider failure.

use crate::backend::Op;
use crate::precision::FloatWidth;
use crate::tensors::DType;
use thiserror::Error;

/// Errors surfaced by the [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A provider name was referenced that is not in the registered set.
    ///
    /// Register the provider first, then retry.
    #[error("backend `{name}` is not registered")]
    NotRegistered {
        /// Name that failed the lookup.
        name: String,
    },

    /// Operands of a single call belong to two or more different providers.
    ///
    /// Convert the operands to a common backend before retrying.
    #[error("operands belong to different backends: {}", .providers.join(", "))]
    BackendMismatch {
        /// Conflicting providers, in the order their operands appeared.
        providers: Vec<String>,
    },

    /// The mutation would leave the registry without a valid default.
    ///
    /// Nothing was changed.
    #[error("invalid registry state: {0}")]
    InvalidState(String),

    /// No provider, the default included, can handle the value.
    #[error("no backend can adopt the value: {value}")]
    NoBackendFound {
        /// Why the value was refused, as reported by the selected provider.
        value: String,
    },

    /// The resolved provider does not offer the requested operation.
    #[error("backend `{provider}` does not support {op:?}")]
    Unsupported {
        /// Resolved provider.
        provider: String,
        /// Requested operation.
        op: Op,
    },

    /// A provider produced a value with a different float width than asked.
    #[error("backend `{provider}` produced {actual} where {expected} was requested")]
    PrecisionViolation {
        /// Offending provider.
        provider: String,
        /// Width dictated by the precision policy or hint.
        expected: FloatWidth,
        /// Data type actually produced.
        actual: DType,
    },

    /// A provider failed while constructing or executing.
    #[error("backend `{provider}` failed: {source}")]
    Provider {
        /// Failing provider.
        provider: String,
        /// Underlying provider error.
        #[source]
        source: ProviderError,
    },
}

impl DispatchError {
    pub(crate) fn not_registered(name: &str) -> Self {
        Self::NotRegistered {
            name: name.to_owned(),
        }
    }

    pub(crate) fn provider(provider: &str, source: ProviderError) -> Self {
        Self::Provider {
            provider: provider.to_owned(),
            source,
        }
    }
}

/// Errors a provider reports back to the dispatcher.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The operation is not implemented by this provider.
    #[error("operation {0:?} is not implemented")]
    UnsupportedOp(Op),

    /// The value cannot be adopted or read by this provider.
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    /// Operand shapes are incompatible.
    #[error("shape mismatch: {lhs:?} vs {rhs:?}")]
    ShapeMismatch {
        /// Left operand shape.
        lhs: Vec<usize>,
        /// Right operand shape.
        rhs: Vec<usize>,
    },

    /// Anything else: wrong arity, ragged input, and so on.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Failure to parse a [`Precision`](crate::Precision) from text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown precision `{0}`, expected 32, 64 or match-input")]
pub struct ParsePrecisionError(pub String);
