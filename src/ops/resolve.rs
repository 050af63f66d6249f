//! Resolution: which provider executes a call.
//!
//! 1. Every operand is unwrapped from its [`Tensor`] handle, if any. The
//!    handle's dtype travels with the operand.
//! 2. Operands no provider recognizes (plain numbers, lists) are foreign.
//! 3. If nothing is recognized, the default provider is selected.
//! 4. Otherwise the first provider, in registration order, that recognizes
//!    every recognized operand is selected; foreign operands will be
//!    adopted by it.
//! 5. If no single provider recognizes them all, the operands come from
//!    different engines and the call fails with
//!    [`DispatchError::BackendMismatch`].
//!
//! Mixing natives from two engines is never resolved by guessing.

use crate::backend::Provider;
use crate::error::DispatchError;
use crate::registry::Registry;
use crate::tensors::{DType, Tensor};
use core::any::Any;
use std::sync::Arc;
use tracing::trace;

/// An operand after normalisation.
#[derive(Clone, Copy, Debug)]
pub struct Operand<'a> {
    value: &'a dyn Any,
    dtype: Option<DType>,
    foreign: bool,
}

impl<'a> Operand<'a> {
    /// The underlying value, unwrapped from its [`Tensor`] handle.
    #[must_use]
    pub const fn value(&self) -> &'a dyn Any {
        self.value
    }

    /// Element type recorded by the [`Tensor`] handle the operand came in,
    /// `None` for raw values.
    #[must_use]
    pub const fn dtype(&self) -> Option<DType> {
        self.dtype
    }

    /// Returns `true` for operands the selected provider does not
    /// recognize; they must be adopted before execution.
    #[must_use]
    pub const fn is_foreign(&self) -> bool {
        self.foreign
    }
}

/// Selected provider plus normalised operands. Lives for one call.
#[derive(Debug)]
pub struct Resolution<'a> {
    provider: Arc<dyn Provider>,
    operands: Vec<Operand<'a>>,
}

impl<'a> Resolution<'a> {
    /// The provider that must execute the call.
    #[must_use]
    pub const fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Operands in call order.
    #[must_use]
    pub fn operands(&self) -> &[Operand<'a>] {
        &self.operands
    }

    /// Consumes the resolution, keeping the provider.
    #[must_use]
    pub fn into_provider(self) -> Arc<dyn Provider> {
        self.provider
    }
}

/// Unwraps a [`Tensor`] handle to its native payload, keeping the dtype
/// the handle knows.
#[must_use]
pub fn normalize(value: &dyn Any) -> (&dyn Any, Option<DType>) {
    match value.downcast_ref::<Tensor>() {
        Some(tensor) => (tensor.as_any(), Some(tensor.dtype())),
        None => (value, None),
    }
}

/// Runs the resolution algorithm against a registry snapshot.
///
/// With `prefer_default`, the default provider is tried before the others
/// whenever it recognizes every recognized operand.
///
/// # Errors
///
/// [`DispatchError::BackendMismatch`] naming the conflicting providers.
pub fn resolve<'a>(
    registry: &Registry,
    operands: &[&'a dyn Any],
    prefer_default: bool,
) -> Result<Resolution<'a>, DispatchError> {
    let (values, dtypes): (Vec<&'a dyn Any>, Vec<Option<DType>>) =
        operands.iter().map(|v| normalize(*v)).unzip();

    // first recognizer of each operand, `None` for foreign values
    let owners: Vec<Option<&Arc<dyn Provider>>> = values
        .iter()
        .map(|v| registry.iter().find(|p| p.recognizes(*v)))
        .collect();

    let provider = if owners.iter().all(Option::is_none) {
        Arc::clone(registry.default_backend())
    } else {
        let recognized: Vec<&dyn Any> = values
            .iter()
            .zip(&owners)
            .filter(|(_, owner)| owner.is_some())
            .map(|(v, _)| *v)
            .collect();
        let claims_all = |p: &&Arc<dyn Provider>| recognized.iter().all(|v| p.recognizes(*v));

        let default = registry.default_backend();
        let preferred = (prefer_default && claims_all(&default)).then_some(default);
        match preferred.or_else(|| registry.iter().find(claims_all)) {
            Some(p) => Arc::clone(p),
            None => return Err(mismatch(&owners)),
        }
    };

    trace!(
        backend = provider.name(),
        operands = values.len(),
        "resolved backend"
    );

    let operands = values
        .into_iter()
        .zip(dtypes)
        .map(|(value, dtype)| Operand {
            value,
            dtype,
            foreign: !provider.recognizes(value),
        })
        .collect();

    Ok(Resolution { provider, operands })
}

fn mismatch(owners: &[Option<&Arc<dyn Provider>>]) -> DispatchError {
    let mut providers: Vec<String> = Vec::new();
    for owner in owners.iter().flatten() {
        if !providers.iter().any(|n| n == owner.name()) {
            providers.push(owner.name().to_owned());
        }
    }
    DispatchError::BackendMismatch { providers }
}
