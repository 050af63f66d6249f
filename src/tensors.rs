//! Values flowing through the dispatcher.
//!
//! # Tensors and host values
//!
//! - [`Tensor`] is a handle to a provider-owned native array, tagged with
//!   the name of the provider that produced it.
//! - [`HostValue`] is everything no provider owns: plain numbers and nested
//!   lists of them. Host values are adopted by whichever provider a call
//!   resolves to, using the active precision policy.
//!
//! ## Example
//!
//! ```rust
//! use briny_dispatch::{host, HostValue};
//!
//! let v = host![[1.0, 2.0], [3.0, 4.0]];
//! assert_eq!(v.shape().unwrap(), vec![2, 2]);
//! assert_eq!(v.to_f64_vec(), vec![1.0, 2.0, 3.0, 4.0]);
//! ```

use crate::backend::NativeArray;
use crate::error::ProviderError;
use crate::precision::FloatWidth;
use core::any::Any;
use core::fmt;
use std::sync::Arc;

/// Element type of a native array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// Boolean.
    Bool,
}

impl DType {
    /// Float dtype of the given width.
    #[must_use]
    pub const fn float(width: FloatWidth) -> Self {
        match width {
            FloatWidth::F32 => Self::F32,
            FloatWidth::F64 => Self::F64,
        }
    }

    /// Width of a float dtype, `None` for integers and booleans.
    #[must_use]
    pub const fn float_width(self) -> Option<FloatWidth> {
        match self {
            Self::F32 => Some(FloatWidth::F32),
            Self::F64 => Some(FloatWidth::F64),
            Self::I32 | Self::I64 | Self::Bool => None,
        }
    }

    /// Returns `true` for float dtypes.
    #[must_use]
    pub const fn is_float(self) -> bool {
        self.float_width().is_some()
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::Bool => "bool",
        })
    }
}

/// A provider-owned array, tagged with the provider that produced it.
///
/// Cloning is cheap: the native payload is shared.
#[derive(Clone)]
pub struct Tensor {
    provider: Arc<str>,
    native: Arc<dyn NativeArray>,
}

impl Tensor {
    /// Wraps a native array produced by `provider`.
    pub fn new(provider: &str, native: Box<dyn NativeArray>) -> Self {
        Self {
            provider: Arc::from(provider),
            native: Arc::from(native),
        }
    }

    /// Name of the provider that produced this tensor.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.native.dtype()
    }

    /// Dimensions.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.native.shape()
    }

    /// The native payload.
    #[must_use]
    pub fn native(&self) -> &dyn NativeArray {
        self.native.as_ref()
    }

    /// The native payload as [`Any`], as providers see it.
    #[must_use]
    pub fn as_any(&self) -> &dyn Any {
        self.native()
    }

    /// Downcasts the native payload.
    #[must_use]
    pub fn downcast_ref<T: NativeArray>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("provider", &self.provider)
            .field("native", &self.native)
            .finish()
    }
}

/// A value owned by no provider.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    /// An integer; carries no float width.
    Int(i64),
    /// A single-precision number.
    F32(f32),
    /// A double-precision number.
    F64(f64),
    /// A (possibly nested) list. Must be rectangular to be constructed.
    List(Vec<HostValue>),
}

impl HostValue {
    /// Reads a plain Rust number, a vector (or vector of vectors) of
    /// numbers, or a `HostValue`.
    ///
    /// Unsigned integers beyond `i64::MAX` become `F64`, losing precision.
    /// Fixed-size arrays are not read here; convert them with
    /// [`HostValue::from`] or [`host!`](crate::host) first.
    ///
    /// Returns `None` for anything else, including provider natives.
    #[must_use]
    pub fn from_any(value: &dyn Any) -> Option<Self> {
        if let Some(v) = value.downcast_ref::<Self>() {
            return Some(v.clone());
        }
        if let Some(v) = value.downcast_ref::<Vec<Self>>() {
            return Some(Self::List(v.clone()));
        }
        if let Some(v) = value.downcast_ref::<f64>() {
            return Some(Self::F64(*v));
        }
        if let Some(v) = value.downcast_ref::<f32>() {
            return Some(Self::F32(*v));
        }
        if let Some(v) = value.downcast_ref::<i64>() {
            return Some(Self::Int(*v));
        }
        if let Some(v) = value.downcast_ref::<i32>() {
            return Some(Self::Int(i64::from(*v)));
        }
        if let Some(v) = value.downcast_ref::<u32>() {
            return Some(Self::Int(i64::from(*v)));
        }
        if let Some(v) = value.downcast_ref::<u64>() {
            return Some(Self::from_unsigned(*v));
        }
        if let Some(v) = value.downcast_ref::<usize>() {
            return u64::try_from(*v).ok().map(Self::from_unsigned);
        }
        list_of::<f64>(value)
            .or_else(|| list_of::<f32>(value))
            .or_else(|| list_of::<i64>(value))
            .or_else(|| list_of::<i32>(value))
    }

    fn from_unsigned(v: u64) -> Self {
        i64::try_from(v).map_or(Self::F64(v as f64), Self::Int)
    }

    /// Float width carried by the value.
    ///
    /// Lists mixing widths report the widest one; integers carry none.
    #[must_use]
    pub fn float_width(&self) -> Option<FloatWidth> {
        match self {
            Self::Int(_) => None,
            Self::F32(_) => Some(FloatWidth::F32),
            Self::F64(_) => Some(FloatWidth::F64),
            Self::List(items) => items
                .iter()
                .filter_map(Self::float_width)
                .reduce(FloatWidth::widest),
        }
    }

    /// Dimensions of the value. Scalars have an empty shape.
    ///
    /// # Errors
    ///
    /// [`ProviderError::InvalidValue`] for ragged lists.
    pub fn shape(&self) -> Result<Vec<usize>, ProviderError> {
        match self {
            Self::Int(_) | Self::F32(_) | Self::F64(_) => Ok(Vec::new()),
            Self::List(items) => {
                let mut shape = vec![items.len()];
                let mut inner: Option<Vec<usize>> = None;
                for item in items {
                    let s = item.shape()?;
                    if let Some(first) = &inner {
                        if *first != s {
                            return Err(ProviderError::InvalidValue(format!(
                                "ragged list: {first:?} vs {s:?}"
                            )));
                        }
                    } else {
                        inner = Some(s);
                    }
                }
                shape.extend(inner.unwrap_or_default());
                Ok(shape)
            }
        }
    }

    /// Flattens the value row-major into `f64`s.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64_vec(&self) -> Vec<f64> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<f64>) {
        match self {
            Self::Int(v) => out.push(*v as f64),
            Self::F32(v) => out.push(f64::from(*v)),
            Self::F64(v) => out.push(*v),
            Self::List(items) => items.iter().for_each(|i| i.flatten_into(out)),
        }
    }
}

/// `Vec<T>` or `Vec<Vec<T>>` as a host list.
fn list_of<T: Copy + Into<HostValue> + 'static>(value: &dyn Any) -> Option<HostValue> {
    if let Some(v) = value.downcast_ref::<Vec<T>>() {
        return Some(HostValue::from(v.clone()));
    }
    value.downcast_ref::<Vec<Vec<T>>>().map(|rows| {
        HostValue::List(rows.iter().map(|row| HostValue::from(row.clone())).collect())
    })
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<f32> for HostValue {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<i64> for HostValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for HostValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl<T: Into<Self>> From<Vec<T>> for HostValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>, const N: usize> From<[T; N]> for HostValue {
    fn from(v: [T; N]) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

/// Builds a [`HostValue::List`] from elements convertible into host values.
///
/// Elements may be numbers, arrays or vectors; widths may be mixed.
///
/// # Example
/// ```
/// use briny_dispatch::{host, FloatWidth};
///
/// let mixed = host![1.0f32, 2.0f64, 3];
/// assert_eq!(mixed.float_width(), Some(FloatWidth::F64));
/// ```
#[macro_export]
macro_rules! host {
    ($( $elem:expr ),* $(,)?) => {
        $crate::HostValue::List(vec![ $( $crate::HostValue::from($elem) ),* ])
    };
}
