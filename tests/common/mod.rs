//! Small providers used across the integration tests.

#![allow(dead_code)]

use briny_dispatch::{DType, FloatWidth, HostValue, NativeArray, Op, Provider, ProviderError};
use std::any::Any;
use std::sync::Arc;

/// Installs a test-writer subscriber so `tracing` output shows up with
/// `--nocapture`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntArray {
    pub data: Vec<i64>,
    pub shape: Vec<usize>,
}

impl IntArray {
    pub fn new(data: Vec<i64>) -> Self {
        let shape = vec![data.len()];
        Self { data, shape }
    }
}

impl NativeArray for IntArray {
    fn dtype(&self) -> DType {
        DType::I64
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloatArray {
    pub data: Vec<f64>,
    pub shape: Vec<usize>,
    pub width: FloatWidth,
}

impl FloatArray {
    pub fn new(data: Vec<f64>, width: FloatWidth) -> Self {
        let shape = vec![data.len()];
        Self { data, shape, width }
    }
}

impl NativeArray for FloatArray {
    fn dtype(&self) -> DType {
        DType::float(self.width)
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }
}

/// Owns `IntArray`. Copies its own natives but cannot hold floats, so it
/// never adopts anything.
pub struct IntProvider(pub &'static str);

impl Provider for IntProvider {
    fn name(&self) -> &str {
        self.0
    }

    fn recognizes(&self, value: &dyn Any) -> bool {
        value.is::<IntArray>()
    }

    fn dtype_of(&self, value: &dyn Any) -> Option<DType> {
        value.downcast_ref::<IntArray>().map(NativeArray::dtype)
    }

    fn construct(
        &self,
        value: &dyn Any,
        _width: FloatWidth,
    ) -> Result<Box<dyn NativeArray>, ProviderError> {
        match value.downcast_ref::<IntArray>() {
            Some(native) => Ok(Box::new(native.clone())),
            None => Err(ProviderError::UnsupportedValue("integers only".into())),
        }
    }

    fn execute(
        &self,
        op: Op,
        operands: &[&dyn Any],
    ) -> Result<Box<dyn NativeArray>, ProviderError> {
        match (op, operands) {
            (Op::Add, [a, b]) => {
                let (a, b) = (
                    a.downcast_ref::<IntArray>().ok_or_else(bad)?,
                    b.downcast_ref::<IntArray>().ok_or_else(bad)?,
                );
                let data = a.data.iter().zip(&b.data).map(|(x, y)| x + y).collect();
                Ok(Box::new(IntArray::new(data)))
            }
            _ => Err(ProviderError::UnsupportedOp(op)),
        }
    }
}

/// Owns `FloatArray`; supports `Add` and `Mul` only.
pub struct FloatProvider(pub &'static str);

impl Provider for FloatProvider {
    fn name(&self) -> &str {
        self.0
    }

    fn recognizes(&self, value: &dyn Any) -> bool {
        value.is::<FloatArray>()
    }

    fn dtype_of(&self, value: &dyn Any) -> Option<DType> {
        value.downcast_ref::<FloatArray>().map(NativeArray::dtype)
    }

    fn construct(
        &self,
        value: &dyn Any,
        width: FloatWidth,
    ) -> Result<Box<dyn NativeArray>, ProviderError> {
        if let Some(native) = value.downcast_ref::<FloatArray>() {
            return Ok(Box::new(FloatArray {
                width,
                ..native.clone()
            }));
        }
        let host = HostValue::from_any(value)
            .ok_or_else(|| ProviderError::UnsupportedValue("not a host value".into()))?;
        Ok(Box::new(FloatArray::new(host.to_f64_vec(), width)))
    }

    fn execute(
        &self,
        op: Op,
        operands: &[&dyn Any],
    ) -> Result<Box<dyn NativeArray>, ProviderError> {
        let [a, b] = operands else {
            return Err(ProviderError::InvalidValue("binary ops only".into()));
        };
        let a = a.downcast_ref::<FloatArray>().ok_or_else(bad)?;
        let b = b.downcast_ref::<FloatArray>().ok_or_else(bad)?;
        let f: fn(f64, f64) -> f64 = match op {
            Op::Add => |x, y| x + y,
            Op::Mul => |x, y| x * y,
            _ => return Err(ProviderError::UnsupportedOp(op)),
        };
        let data = if b.data.len() == 1 {
            a.data.iter().map(|x| f(*x, b.data[0])).collect()
        } else {
            a.data.iter().zip(&b.data).map(|(x, y)| f(*x, *y)).collect()
        };
        Ok(Box::new(FloatArray::new(data, a.width.widest(b.width))))
    }

    fn supports(&self, op: Op) -> bool {
        matches!(op, Op::Add | Op::Mul)
    }
}

/// Claims both `IntArray` and `FloatArray`.
pub struct GenericProvider(pub &'static str);

impl Provider for GenericProvider {
    fn name(&self) -> &str {
        self.0
    }

    fn recognizes(&self, value: &dyn Any) -> bool {
        value.is::<IntArray>() || value.is::<FloatArray>()
    }

    fn dtype_of(&self, value: &dyn Any) -> Option<DType> {
        IntProvider(self.0)
            .dtype_of(value)
            .or_else(|| FloatProvider(self.0).dtype_of(value))
    }

    fn construct(
        &self,
        value: &dyn Any,
        width: FloatWidth,
    ) -> Result<Box<dyn NativeArray>, ProviderError> {
        FloatProvider(self.0).construct(value, width)
    }

    fn execute(
        &self,
        op: Op,
        _operands: &[&dyn Any],
    ) -> Result<Box<dyn NativeArray>, ProviderError> {
        Err(ProviderError::UnsupportedOp(op))
    }
}

/// Recognizes nothing.
pub struct NoiseProvider(pub String);

impl Provider for NoiseProvider {
    fn name(&self) -> &str {
        &self.0
    }

    fn recognizes(&self, _value: &dyn Any) -> bool {
        false
    }

    fn dtype_of(&self, _value: &dyn Any) -> Option<DType> {
        None
    }

    fn construct(
        &self,
        _value: &dyn Any,
        _width: FloatWidth,
    ) -> Result<Box<dyn NativeArray>, ProviderError> {
        Err(ProviderError::UnsupportedValue("noise".into()))
    }

    fn execute(
        &self,
        op: Op,
        _operands: &[&dyn Any],
    ) -> Result<Box<dyn NativeArray>, ProviderError> {
        Err(ProviderError::UnsupportedOp(op))
    }
}

/// Adopts host values but always in double precision, whatever it is asked.
pub struct SloppyProvider;

impl Provider for SloppyProvider {
    fn name(&self) -> &str {
        "sloppy"
    }

    fn recognizes(&self, _value: &dyn Any) -> bool {
        false
    }

    fn dtype_of(&self, _value: &dyn Any) -> Option<DType> {
        None
    }

    fn construct(
        &self,
        value: &dyn Any,
        _width: FloatWidth,
    ) -> Result<Box<dyn NativeArray>, ProviderError> {
        FloatProvider("sloppy").construct(value, FloatWidth::F64)
    }

    fn execute(
        &self,
        op: Op,
        _operands: &[&dyn Any],
    ) -> Result<Box<dyn NativeArray>, ProviderError> {
        Err(ProviderError::UnsupportedOp(op))
    }
}

/// Owns `FloatArray` like [`FloatProvider`] but cannot report the width of
/// a raw native.
pub struct OpaqueProvider(pub &'static str);

impl Provider for OpaqueProvider {
    fn name(&self) -> &str {
        self.0
    }

    fn recognizes(&self, value: &dyn Any) -> bool {
        value.is::<FloatArray>()
    }

    fn dtype_of(&self, _value: &dyn Any) -> Option<DType> {
        None
    }

    fn construct(
        &self,
        value: &dyn Any,
        width: FloatWidth,
    ) -> Result<Box<dyn NativeArray>, ProviderError> {
        FloatProvider(self.0).construct(value, width)
    }

    fn execute(
        &self,
        op: Op,
        operands: &[&dyn Any],
    ) -> Result<Box<dyn NativeArray>, ProviderError> {
        FloatProvider(self.0).execute(op, operands)
    }
}

fn bad() -> ProviderError {
    ProviderError::UnsupportedValue("foreign operand".into())
}

pub fn ints() -> Arc<dyn Provider> {
    Arc::new(IntProvider("A"))
}

pub fn floats() -> Arc<dyn Provider> {
    Arc::new(FloatProvider("B"))
}
