//! Parallel CPU provider
//!
//! # CPU Backend
//!
//! The built-in provider every dispatcher starts with. It owns
//! [`CpuArray`], a row-major array of `f32` or `f64`, and adopts any
//! [`HostValue`] or plain Rust number handed to it.
//!
//! ## Features
//!
//! - Parallel execution using [`rayon`](https://docs.rs/rayon)
//! - Size-1 operands broadcast against anything in binary ops
//! - Mixed `f32`/`f64` operands are computed in `f64`
//!
//! ## Implemented Ops
//!
//! - elementwise: `Add`, `Sub`, `Mul`, `Div`, `Maximum`, `Minimum`
//! - unary: `Neg`, `Abs`, `Sqrt`, `Exp`
//! - `Sum`: reduction to a scalar
//! - `MatMul`: 2-D matrix product, one rayon task per output row

use crate::backend::{NativeArray, Op, Provider};
use crate::error::ProviderError;
use crate::precision::FloatWidth;
use crate::tensors::{DType, HostValue};
use core::any::Any;
use core::iter::Sum;
use core::ops::{Add, Div, Mul, Neg, Sub};
use rayon::prelude::*;
use std::borrow::Cow;

/// Element storage of a [`CpuArray`].
#[derive(Debug, Clone, PartialEq)]
pub enum CpuData {
    /// Single precision.
    F32(Vec<f32>),
    /// Double precision.
    F64(Vec<f64>),
}

impl CpuData {
    fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }
}

/// The native array type of [`CpuProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct CpuArray {
    shape: Vec<usize>,
    data: CpuData,
}

impl CpuArray {
    /// Creates an array from a shape and flat row-major data.
    ///
    /// # Errors
    ///
    /// [`ProviderError::InvalidValue`] if the shape product differs from
    /// the number of elements.
    pub fn new(shape: impl Into<Vec<usize>>, data: CpuData) -> Result<Self, ProviderError> {
        let shape = shape.into();
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ProviderError::InvalidValue(format!(
                "shape {shape:?} is incompatible with {} data elements",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// A 0-D array holding `value` at `width`.
    #[must_use]
    pub fn scalar(value: f64, width: FloatWidth) -> Self {
        Self {
            shape: Vec::new(),
            data: from_f64(vec![value], width),
        }
    }

    /// Dimensions.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Element storage.
    #[must_use]
    pub const fn data(&self) -> &CpuData {
        &self.data
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the array holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Width of the elements.
    #[must_use]
    pub const fn width(&self) -> FloatWidth {
        match self.data {
            CpuData::F32(_) => FloatWidth::F32,
            CpuData::F64(_) => FloatWidth::F64,
        }
    }

    /// Elements as `f64`, borrowed when already double precision.
    #[must_use]
    pub fn as_f64(&self) -> Cow<'_, [f64]> {
        match &self.data {
            CpuData::F64(v) => Cow::Borrowed(v.as_slice()),
            CpuData::F32(v) => Cow::Owned(v.par_iter().map(|&x| f64::from(x)).collect()),
        }
    }

    /// Copy of the array with elements of `width`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn cast(&self, width: FloatWidth) -> Self {
        let data = match (&self.data, width) {
            (CpuData::F32(v), FloatWidth::F32) => CpuData::F32(v.clone()),
            (CpuData::F64(v), FloatWidth::F64) => CpuData::F64(v.clone()),
            (CpuData::F64(v), FloatWidth::F32) => {
                CpuData::F32(v.par_iter().map(|&x| x as f32).collect())
            }
            (CpuData::F32(v), FloatWidth::F64) => {
                CpuData::F64(v.par_iter().map(|&x| f64::from(x)).collect())
            }
        };
        Self {
            shape: self.shape.clone(),
            data,
        }
    }

    /// Builds an array from a host value.
    ///
    /// # Errors
    ///
    /// [`ProviderError::InvalidValue`] for ragged lists.
    pub fn from_host(value: &HostValue, width: FloatWidth) -> Result<Self, ProviderError> {
        let shape = value.shape()?;
        Ok(Self {
            shape,
            data: from_f64(value.to_f64_vec(), width),
        })
    }
}

impl NativeArray for CpuArray {
    fn dtype(&self) -> DType {
        DType::float(self.width())
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }
}

#[allow(clippy::cast_possible_truncation)]
fn from_f64(values: Vec<f64>, width: FloatWidth) -> CpuData {
    match width {
        FloatWidth::F64 => CpuData::F64(values),
        FloatWidth::F32 => CpuData::F32(values.into_par_iter().map(|x| x as f32).collect()),
    }
}

/// The built-in CPU provider, registered as `"cpu"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuProvider;

impl CpuProvider {
    /// Registry name.
    pub const NAME: &'static str = "cpu";
}

impl Provider for CpuProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn recognizes(&self, value: &dyn Any) -> bool {
        value.is::<CpuArray>()
    }

    fn dtype_of(&self, value: &dyn Any) -> Option<DType> {
        value.downcast_ref::<CpuArray>().map(NativeArray::dtype)
    }

    fn construct(
        &self,
        value: &dyn Any,
        width: FloatWidth,
    ) -> Result<Box<dyn NativeArray>, ProviderError> {
        if let Some(array) = value.downcast_ref::<CpuArray>() {
            return Ok(Box::new(array.cast(width)));
        }
        let host = HostValue::from_any(value).ok_or_else(|| {
            ProviderError::UnsupportedValue(
                "expected a number, a (nested) list of numbers or a CpuArray".into(),
            )
        })?;
        Ok(Box::new(CpuArray::from_host(&host, width)?))
    }

    fn execute(
        &self,
        op: Op,
        operands: &[&dyn Any],
    ) -> Result<Box<dyn NativeArray>, ProviderError> {
        if operands.len() != op.arity() {
            return Err(ProviderError::InvalidValue(format!(
                "{op:?} takes {} operands, got {}",
                op.arity(),
                operands.len()
            )));
        }
        let arrays = operands
            .iter()
            .map(|v| {
                v.downcast_ref::<CpuArray>()
                    .ok_or_else(|| ProviderError::UnsupportedValue("expected a CpuArray".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let out = match op {
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Maximum | Op::Minimum => {
                binary(op, arrays[0], arrays[1])?
            }
            Op::Neg | Op::Abs | Op::Sqrt | Op::Exp => unary(op, arrays[0]),
            Op::Sum => sum(arrays[0]),
            Op::MatMul => matmul(arrays[0], arrays[1])?,
        };
        Ok(Box::new(out))
    }
}

/// Float element the kernels are generic over.
trait Element:
    Copy
    + Send
    + Sync
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Sum
    + Default
{
    fn abs(self) -> Self;
    fn sqrt(self) -> Self;
    fn exp(self) -> Self;
}

impl Element for f32 {
    fn abs(self) -> Self {
        f32::abs(self)
    }

    fn sqrt(self) -> Self {
        f32::sqrt(self)
    }

    fn exp(self) -> Self {
        f32::exp(self)
    }
}

impl Element for f64 {
    fn abs(self) -> Self {
        f64::abs(self)
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    fn exp(self) -> Self {
        f64::exp(self)
    }
}

fn binary_fn<T: Element>(op: Op) -> fn(T, T) -> T {
    match op {
        Op::Sub => |a, b| a - b,
        Op::Mul => |a, b| a * b,
        Op::Div => |a, b| a / b,
        Op::Maximum => |a, b| if b > a { b } else { a },
        Op::Minimum => |a, b| if b < a { b } else { a },
        _ => |a, b| a + b,
    }
}

fn unary_fn<T: Element>(op: Op) -> fn(T) -> T {
    match op {
        Op::Abs => <T as Element>::abs,
        Op::Sqrt => <T as Element>::sqrt,
        Op::Exp => <T as Element>::exp,
        _ => |a: T| -a,
    }
}

fn broadcast_shape(a: &CpuArray, b: &CpuArray) -> Result<Vec<usize>, ProviderError> {
    if a.shape == b.shape {
        Ok(a.shape.clone())
    } else if a.len() == 1 {
        Ok(b.shape.clone())
    } else if b.len() == 1 {
        Ok(a.shape.clone())
    } else {
        Err(ProviderError::ShapeMismatch {
            lhs: a.shape.clone(),
            rhs: b.shape.clone(),
        })
    }
}

fn zip_with<T: Element>(x: &[T], y: &[T], f: fn(T, T) -> T) -> Vec<T> {
    if x.len() == y.len() {
        x.par_iter().zip(y.par_iter()).map(|(&a, &b)| f(a, b)).collect()
    } else if x.len() == 1 {
        let a = x[0];
        y.par_iter().map(|&b| f(a, b)).collect()
    } else {
        let b = y[0];
        x.par_iter().map(|&a| f(a, b)).collect()
    }
}

fn binary(op: Op, a: &CpuArray, b: &CpuArray) -> Result<CpuArray, ProviderError> {
    let shape = broadcast_shape(a, b)?;
    let data = match (&a.data, &b.data) {
        (CpuData::F32(x), CpuData::F32(y)) => CpuData::F32(zip_with(x, y, binary_fn(op))),
        _ => CpuData::F64(zip_with::<f64>(&a.as_f64(), &b.as_f64(), binary_fn(op))),
    };
    Ok(CpuArray { shape, data })
}

fn unary(op: Op, a: &CpuArray) -> CpuArray {
    let data = match &a.data {
        CpuData::F32(x) => {
            let f = unary_fn::<f32>(op);
            CpuData::F32(x.par_iter().map(|&v| f(v)).collect())
        }
        CpuData::F64(x) => {
            let f = unary_fn::<f64>(op);
            CpuData::F64(x.par_iter().map(|&v| f(v)).collect())
        }
    };
    CpuArray {
        shape: a.shape.clone(),
        data,
    }
}

fn sum(a: &CpuArray) -> CpuArray {
    let data = match &a.data {
        CpuData::F32(x) => CpuData::F32(vec![x.par_iter().copied().sum()]),
        CpuData::F64(x) => CpuData::F64(vec![x.par_iter().copied().sum()]),
    };
    CpuArray {
        shape: Vec::new(),
        data,
    }
}

/// Performs `C = A × B` on 2-D arrays (`A: m×k`, `B: k×n`).
///
/// Rows of the output are computed in parallel.
fn matmul(a: &CpuArray, b: &CpuArray) -> Result<CpuArray, ProviderError> {
    let (&[m, k], &[k2, n]) = (a.shape(), b.shape()) else {
        return Err(ProviderError::InvalidValue(format!(
            "matmul expects 2-D operands, got {:?} and {:?}",
            a.shape, b.shape
        )));
    };
    if k != k2 {
        return Err(ProviderError::ShapeMismatch {
            lhs: a.shape.clone(),
            rhs: b.shape.clone(),
        });
    }

    let data = match (&a.data, &b.data) {
        (CpuData::F32(x), CpuData::F32(y)) => CpuData::F32(matmul_kernel(x, y, m, k, n)),
        _ => CpuData::F64(matmul_kernel::<f64>(&a.as_f64(), &b.as_f64(), m, k, n)),
    };
    Ok(CpuArray {
        shape: vec![m, n],
        data,
    })
}

fn matmul_kernel<T: Element>(a: &[T], b: &[T], m: usize, k: usize, n: usize) -> Vec<T> {
    let mut out = vec![T::default(); m * n];
    if n == 0 {
        return out;
    }
    out.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        for (j, cell) in row.iter_mut().enumerate() {
            let mut acc = T::default();
            for l in 0..k {
                acc = acc + a[i * k + l] * b[l * n + j];
            }
            *cell = acc;
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_array(shape: &[usize], data: &[f64]) -> CpuArray {
        CpuArray::new(shape, CpuData::F64(data.to_vec())).unwrap()
    }

    fn run(op: Op, operands: &[&CpuArray]) -> CpuArray {
        let operands: Vec<&dyn Any> = operands.iter().map(|a| *a as &dyn Any).collect();
        let out = CpuProvider.execute(op, &operands).unwrap();
        (out as Box<dyn Any>).downcast::<CpuArray>().map(|b| *b).unwrap()
    }

    #[test]
    fn new_rejects_bad_shape() {
        assert!(CpuArray::new([2, 2], CpuData::F32(vec![1.0; 3])).is_err());
    }

    #[test]
    fn recognizes_only_cpu_arrays() {
        assert!(CpuProvider.recognizes(&CpuArray::scalar(1.0, FloatWidth::F64)));
        assert!(!CpuProvider.recognizes(&1.0_f64));
        assert!(!CpuProvider.recognizes(&HostValue::F64(1.0)));
    }

    #[test]
    fn construct_honours_width() {
        let out = CpuProvider.construct(&vec![1.0_f64, 2.0], FloatWidth::F32).unwrap();
        assert_eq!(out.dtype(), DType::F32);
        assert_eq!(out.shape(), &[2]);
    }

    #[test]
    fn construct_rejects_foreign_types() {
        let err = CpuProvider
            .construct(&String::from("x"), FloatWidth::F64)
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedValue(_)));
    }

    #[test]
    fn binary_broadcasts_scalars() {
        let a = f64_array(&[3], &[1.0, 2.0, 3.0]);
        let b = CpuArray::scalar(10.0, FloatWidth::F64);
        let out = run(Op::Add, &[&a, &b]);
        assert_eq!(out.data(), &CpuData::F64(vec![11.0, 12.0, 13.0]));
        let out = run(Op::Sub, &[&b, &a]);
        assert_eq!(out.data(), &CpuData::F64(vec![9.0, 8.0, 7.0]));
    }

    #[test]
    fn binary_widens_mixed_widths() {
        let a = CpuArray::new([2], CpuData::F32(vec![1.0, 2.0])).unwrap();
        let b = f64_array(&[2], &[0.5, 0.5]);
        let out = run(Op::Mul, &[&a, &b]);
        assert_eq!(out.width(), FloatWidth::F64);
        assert_eq!(out.data(), &CpuData::F64(vec![0.5, 1.0]));
    }

    #[test]
    fn binary_rejects_incompatible_shapes() {
        let a = f64_array(&[2], &[1.0, 2.0]);
        let b = f64_array(&[3], &[1.0, 2.0, 3.0]);
        let err = CpuProvider.execute(Op::Add, &[&a, &b]).unwrap_err();
        assert!(matches!(err, ProviderError::ShapeMismatch { .. }));
    }

    #[test]
    fn maximum_and_minimum() {
        let a = f64_array(&[3], &[1.0, 5.0, 3.0]);
        let b = f64_array(&[3], &[4.0, 2.0, 3.0]);
        assert_eq!(run(Op::Maximum, &[&a, &b]).data(), &CpuData::F64(vec![4.0, 5.0, 3.0]));
        assert_eq!(run(Op::Minimum, &[&a, &b]).data(), &CpuData::F64(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn unary_ops_keep_width() {
        let a = CpuArray::new([3], CpuData::F32(vec![-4.0, 0.0, 9.0])).unwrap();
        assert_eq!(run(Op::Abs, &[&a]).data(), &CpuData::F32(vec![4.0, 0.0, 9.0]));
        assert_eq!(run(Op::Neg, &[&a]).data(), &CpuData::F32(vec![4.0, -0.0, -9.0]));
        let b = f64_array(&[2], &[4.0, 0.0]);
        assert_eq!(run(Op::Sqrt, &[&b]).data(), &CpuData::F64(vec![2.0, 0.0]));
        assert_eq!(run(Op::Exp, &[&b]).data(), &CpuData::F64(vec![4.0_f64.exp(), 1.0]));
    }

    #[test]
    fn sum_reduces_to_scalar() {
        let a = f64_array(&[2, 2], &[1.0, 2.0, 3.0, 4.0]);
        let out = run(Op::Sum, &[&a]);
        assert!(out.shape().is_empty());
        assert_eq!(out.data(), &CpuData::F64(vec![10.0]));
    }

    #[test]
    fn matmul_forward_produces_correct_values() {
        let a = f64_array(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = f64_array(&[3, 2], &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let out = run(Op::MatMul, &[&a, &b]);
        assert_eq!(out.shape(), &[2, 2]);
        let expected = vec![
            1.0 * 7.0 + 2.0 * 9.0 + 3.0 * 11.0,
            1.0 * 8.0 + 2.0 * 10.0 + 3.0 * 12.0,
            4.0 * 7.0 + 5.0 * 9.0 + 6.0 * 11.0,
            4.0 * 8.0 + 5.0 * 10.0 + 6.0 * 12.0,
        ];
        assert_eq!(out.data(), &CpuData::F64(expected));
    }

    #[test]
    fn matmul_rejects_invalid_shapes() {
        let a = f64_array(&[2, 3], &[1.0; 6]);
        let b = f64_array(&[4, 2], &[1.0; 8]);
        let err = CpuProvider.execute(Op::MatMul, &[&a, &b]).unwrap_err();
        assert!(matches!(err, ProviderError::ShapeMismatch { .. }));
        let v = f64_array(&[3], &[1.0; 3]);
        let err = CpuProvider.execute(Op::MatMul, &[&v, &v]).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidValue(_)));
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let a = f64_array(&[1], &[1.0]);
        let err = CpuProvider.execute(Op::Add, &[&a]).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidValue(_)));
    }
}
