//! Precision policy.
//!
//! A single process-wide knob decides which float width providers use when
//! they create new values. It is read fresh on every construction, so a
//! change is visible to the very next call on every provider. Values that
//! already exist are never touched.
//!
//! # Widths
//!
//! - `F32`: single precision.
//! - `F64`: double precision, also the documented default whenever the
//!   source of a value carries no width of its own (plain integers).
//!
//! # Policies
//!
//! - `Fixed(width)`: every new value gets `width`.
//! - `MatchInput`: keep the width of the source; fall back to `F64`.

use crate::error::ParsePrecisionError;
use crate::ops::dispatch::Dispatcher;
use core::convert::TryFrom;
use core::fmt;
use core::str::FromStr;

/// Floating-point width of tensor elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum FloatWidth {
    /// 32-bit IEEE float.
    F32 = 32,
    /// 64-bit IEEE float.
    #[default]
    F64 = 64,
}

impl FloatWidth {
    /// Width used when the source value has none.
    pub const DEFAULT: Self = Self::F64;

    /// Number of bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self as u32
    }

    /// The wider of two widths.
    #[must_use]
    pub fn widest(self, other: Self) -> Self {
        self.max(other)
    }
}

impl TryFrom<u32> for FloatWidth {
    type Error = ParsePrecisionError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            32 => Ok(Self::F32),
            64 => Ok(Self::F64),
            other => Err(ParsePrecisionError(other.to_string())),
        }
    }
}

impl fmt::Display for FloatWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.bits())
    }
}

/// The active precision policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Precision {
    /// Always construct with this width.
    Fixed(FloatWidth),
    /// Preserve the width of the source value, `F64` if it has none.
    #[default]
    MatchInput,
}

impl Precision {
    /// Single precision.
    pub const F32: Self = Self::Fixed(FloatWidth::F32);
    /// Double precision.
    pub const F64: Self = Self::Fixed(FloatWidth::F64);

    /// Width to construct with, given the width carried by the source value.
    ///
    /// ```
    /// use briny_dispatch::{FloatWidth, Precision};
    ///
    /// assert_eq!(Precision::F32.target(Some(FloatWidth::F64)), FloatWidth::F32);
    /// assert_eq!(Precision::MatchInput.target(Some(FloatWidth::F32)), FloatWidth::F32);
    /// assert_eq!(Precision::MatchInput.target(None), FloatWidth::F64);
    /// ```
    #[must_use]
    pub fn target(self, source: Option<FloatWidth>) -> FloatWidth {
        match self {
            Self::Fixed(width) => width,
            Self::MatchInput => source.unwrap_or(FloatWidth::DEFAULT),
        }
    }

    /// The fixed width, if any.
    #[must_use]
    pub const fn width(self) -> Option<FloatWidth> {
        match self {
            Self::Fixed(width) => Some(width),
            Self::MatchInput => None,
        }
    }
}

impl From<FloatWidth> for Precision {
    fn from(width: FloatWidth) -> Self {
        Self::Fixed(width)
    }
}

impl TryFrom<u32> for Precision {
    type Error = ParsePrecisionError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        FloatWidth::try_from(bits).map(Self::Fixed)
    }
}

impl FromStr for Precision {
    type Err = ParsePrecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "32" | "f32" => Ok(Self::F32),
            "64" | "f64" => Ok(Self::F64),
            "match-input" | "match_input" | "match" => Ok(Self::MatchInput),
            _ => Err(ParsePrecisionError(s.to_owned())),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(width) => write!(f, "{}", width.bits()),
            Self::MatchInput => f.write_str("match-input"),
        }
    }
}

/// Restores the previous precision of a dispatcher when dropped.
///
/// Created by [`Dispatcher::precision_scope`]. The override is still
/// process-wide while the guard lives; it is not thread-local.
#[must_use = "the previous precision is restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct PrecisionGuard<'a> {
    dispatcher: &'a Dispatcher,
    previous: Precision,
}

impl<'a> PrecisionGuard<'a> {
    pub(crate) const fn new(dispatcher: &'a Dispatcher, previous: Precision) -> Self {
        Self {
            dispatcher,
            previous,
        }
    }

    /// Policy that will be restored.
    #[must_use]
    pub const fn previous(&self) -> Precision {
        self.previous
    }
}

impl Drop for PrecisionGuard<'_> {
    fn drop(&mut self) {
        self.dispatcher.set_precision(self.previous);
    }
}
