//! Sample data types.
//!
//! | Type | Rust | Size | Class |
//! |------|------|------|-------|
//! | `bin` | [`Bin`] | 1 | binary |
//! | `uint8` / `uint16` / `uint32` | `u8` / `u16` / `u32` | 1 / 2 / 4 | unsigned integer |
//! | `sint8` / `sint16` / `sint32` | `i8` / `i16` / `i32` | 1 / 2 / 4 | signed integer |
//! | `sfloat` / `dfloat` | `f32` / `f64` | 4 / 8 | float |
//! | `scomplex` / `dcomplex` | `Complex32` / `Complex64` | 8 / 16 | complex |
//!
//! Conversions between types saturate ("clamp cast"): integers clamp to their
//! range and truncate, complex to real takes the modulus, anything to binary
//! tests for non-zero.

use std::fmt;

use num_complex::{Complex32, Complex64};
use num_traits::Bounded;

use crate::error::{Error, Result};

/// Runtime tag for the sample type stored in an image or buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Bin,
    UInt8,
    UInt16,
    UInt32,
    SInt8,
    SInt16,
    SInt32,
    SFloat,
    DFloat,
    SComplex,
    DComplex,
}

impl DataType {
    /// All data types, in order of increasing "size".
    pub const ALL: [DataType; 11] = [
        DataType::Bin,
        DataType::UInt8,
        DataType::UInt16,
        DataType::UInt32,
        DataType::SInt8,
        DataType::SInt16,
        DataType::SInt32,
        DataType::SFloat,
        DataType::DFloat,
        DataType::SComplex,
        DataType::DComplex,
    ];

    /// Number of bytes in one sample.
    pub fn size_of(self) -> usize {
        match self {
            DataType::Bin | DataType::UInt8 | DataType::SInt8 => 1,
            DataType::UInt16 | DataType::SInt16 => 2,
            DataType::UInt32 | DataType::SInt32 | DataType::SFloat => 4,
            DataType::DFloat | DataType::SComplex => 8,
            DataType::DComplex => 16,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Bin => "bin",
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::SInt8 => "sint8",
            DataType::SInt16 => "sint16",
            DataType::SInt32 => "sint32",
            DataType::SFloat => "sfloat",
            DataType::DFloat => "dfloat",
            DataType::SComplex => "scomplex",
            DataType::DComplex => "dcomplex",
        }
    }

    pub fn is_binary(self) -> bool {
        self == DataType::Bin
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, DataType::UInt8 | DataType::UInt16 | DataType::UInt32)
    }

    pub fn is_signed(self) -> bool {
        !self.is_binary() && !self.is_unsigned()
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::SInt8
                | DataType::SInt16
                | DataType::SInt32
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, DataType::SFloat | DataType::DFloat)
    }

    pub fn is_complex(self) -> bool {
        matches!(self, DataType::SComplex | DataType::DComplex)
    }

    pub fn is_real(self) -> bool {
        !self.is_complex()
    }

    /// The floating-point type that can hold any value of this type: `dfloat` or `dcomplex`.
    pub fn flex(self) -> DataType {
        if self.is_complex() {
            DataType::DComplex
        } else {
            DataType::DFloat
        }
    }

    /// The type of one component of a complex sample. Real types map to themselves.
    pub fn real(self) -> DataType {
        match self {
            DataType::SComplex => DataType::SFloat,
            DataType::DComplex => DataType::DFloat,
            other => other,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DataType::ALL
            .iter()
            .copied()
            .find(|dt| dt.name() == s)
            .ok_or_else(|| Error::parameter(format!("unknown data type \"{s}\"")))
    }
}

/// A binary sample. Stored as one byte, `0` is false and anything else is true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Bin(pub u8);

impl Bin {
    pub const FALSE: Bin = Bin(0);
    pub const TRUE: Bin = Bin(1);

    pub fn is_set(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for Bin {
    fn from(v: bool) -> Self {
        Bin(v as u8)
    }
}

impl From<Bin> for bool {
    fn from(v: Bin) -> Self {
        v.is_set()
    }
}

/// A Rust type that can be stored as an image sample.
///
/// Implemented for exactly the types listed in [`DataType`]. All conversions
/// go through `f64` or `Complex64`, which hold every value of every sample
/// type exactly.
pub trait Sample: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    const DATA_TYPE: DataType;

    /// Value as a real number. Complex values return their modulus.
    fn to_f64(self) -> f64;

    fn to_complex(self) -> Complex64;

    /// Saturating conversion from a real number.
    fn from_f64(v: f64) -> Self;

    /// Saturating conversion from a complex number. Real types take the modulus.
    fn from_complex(v: Complex64) -> Self;

    /// Smallest representable value (most negative for signed and float types).
    fn lowest() -> Self;

    /// Largest representable value.
    fn highest() -> Self;

    /// Saturated negation: `max - v` for unsigned, `-v` for signed, logical not for binary.
    fn saturated_inv(self) -> Self;
}

macro_rules! impl_sample_unsigned {
    ($t:ty, $dt:ident) => {
        impl Sample for $t {
            const DATA_TYPE: DataType = DataType::$dt;

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn to_complex(self) -> Complex64 {
                Complex64::new(self as f64, 0.0)
            }

            fn from_f64(v: f64) -> Self {
                // `as` saturates and maps NaN to 0
                v as $t
            }

            fn from_complex(v: Complex64) -> Self {
                v.norm() as $t
            }

            fn lowest() -> Self {
                <$t as Bounded>::min_value()
            }

            fn highest() -> Self {
                <$t as Bounded>::max_value()
            }

            fn saturated_inv(self) -> Self {
                <$t as Bounded>::max_value() - self
            }
        }
    };
}

macro_rules! impl_sample_signed {
    ($t:ty, $dt:ident) => {
        impl Sample for $t {
            const DATA_TYPE: DataType = DataType::$dt;

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn to_complex(self) -> Complex64 {
                Complex64::new(self as f64, 0.0)
            }

            fn from_f64(v: f64) -> Self {
                v as $t
            }

            fn from_complex(v: Complex64) -> Self {
                v.norm() as $t
            }

            fn lowest() -> Self {
                <$t as Bounded>::min_value()
            }

            fn highest() -> Self {
                <$t as Bounded>::max_value()
            }

            fn saturated_inv(self) -> Self {
                if self == <$t as Bounded>::min_value() {
                    <$t as Bounded>::max_value()
                } else {
                    -self
                }
            }
        }
    };
}

macro_rules! impl_sample_float {
    ($t:ty, $dt:ident) => {
        impl Sample for $t {
            const DATA_TYPE: DataType = DataType::$dt;

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn to_complex(self) -> Complex64 {
                Complex64::new(self as f64, 0.0)
            }

            fn from_f64(v: f64) -> Self {
                v as $t
            }

            fn from_complex(v: Complex64) -> Self {
                v.norm() as $t
            }

            fn lowest() -> Self {
                <$t>::MIN
            }

            fn highest() -> Self {
                <$t>::MAX
            }

            fn saturated_inv(self) -> Self {
                -self
            }
        }
    };
}

impl_sample_unsigned!(u8, UInt8);
impl_sample_unsigned!(u16, UInt16);
impl_sample_unsigned!(u32, UInt32);
impl_sample_signed!(i8, SInt8);
impl_sample_signed!(i16, SInt16);
impl_sample_signed!(i32, SInt32);
impl_sample_float!(f32, SFloat);
impl_sample_float!(f64, DFloat);

impl Sample for Bin {
    const DATA_TYPE: DataType = DataType::Bin;

    fn to_f64(self) -> f64 {
        if self.is_set() {
            1.0
        } else {
            0.0
        }
    }

    fn to_complex(self) -> Complex64 {
        Complex64::new(self.to_f64(), 0.0)
    }

    fn from_f64(v: f64) -> Self {
        Bin::from(v != 0.0)
    }

    fn from_complex(v: Complex64) -> Self {
        Bin::from(v.re != 0.0 || v.im != 0.0)
    }

    fn lowest() -> Self {
        Bin::FALSE
    }

    fn highest() -> Self {
        Bin::TRUE
    }

    fn saturated_inv(self) -> Self {
        Bin::from(!self.is_set())
    }
}

impl Sample for Complex32 {
    const DATA_TYPE: DataType = DataType::SComplex;

    fn to_f64(self) -> f64 {
        self.norm() as f64
    }

    fn to_complex(self) -> Complex64 {
        Complex64::new(self.re as f64, self.im as f64)
    }

    fn from_f64(v: f64) -> Self {
        Complex32::new(v as f32, 0.0)
    }

    fn from_complex(v: Complex64) -> Self {
        Complex32::new(v.re as f32, v.im as f32)
    }

    // Complex limits apply to each component separately.
    fn lowest() -> Self {
        Complex32::new(f32::MIN, f32::MIN)
    }

    fn highest() -> Self {
        Complex32::new(f32::MAX, f32::MAX)
    }

    fn saturated_inv(self) -> Self {
        -self
    }
}

impl Sample for Complex64 {
    const DATA_TYPE: DataType = DataType::DComplex;

    fn to_f64(self) -> f64 {
        self.norm()
    }

    fn to_complex(self) -> Complex64 {
        self
    }

    fn from_f64(v: f64) -> Self {
        Complex64::new(v, 0.0)
    }

    fn from_complex(v: Complex64) -> Self {
        v
    }

    fn lowest() -> Self {
        Complex64::new(f64::MIN, f64::MIN)
    }

    fn highest() -> Self {
        Complex64::new(f64::MAX, f64::MAX)
    }

    fn saturated_inv(self) -> Self {
        -self
    }
}

/// Saturating conversion between any two sample types.
#[inline]
pub fn clamp_cast<S: Sample, D: Sample>(v: S) -> D {
    if D::DATA_TYPE.is_complex() {
        D::from_complex(v.to_complex())
    } else {
        D::from_f64(v.to_f64())
    }
}

/// Expands to `$body` with `$t` bound to the Rust type for the data type `$dt`.
///
/// This is the single place where a runtime [`DataType`] turns into a static type.
macro_rules! dispatch_data_type {
    ($dt:expr, $t:ident => $body:expr) => {
        match $dt {
            $crate::image::DataType::Bin => {
                type $t = $crate::image::Bin;
                $body
            }
            $crate::image::DataType::UInt8 => {
                type $t = u8;
                $body
            }
            $crate::image::DataType::UInt16 => {
                type $t = u16;
                $body
            }
            $crate::image::DataType::UInt32 => {
                type $t = u32;
                $body
            }
            $crate::image::DataType::SInt8 => {
                type $t = i8;
                $body
            }
            $crate::image::DataType::SInt16 => {
                type $t = i16;
                $body
            }
            $crate::image::DataType::SInt32 => {
                type $t = i32;
                $body
            }
            $crate::image::DataType::SFloat => {
                type $t = f32;
                $body
            }
            $crate::image::DataType::DFloat => {
                type $t = f64;
                $body
            }
            $crate::image::DataType::SComplex => {
                type $t = ::num_complex::Complex32;
                $body
            }
            $crate::image::DataType::DComplex => {
                type $t = ::num_complex::Complex64;
                $body
            }
        }
    };
}

pub(crate) use dispatch_data_type;
