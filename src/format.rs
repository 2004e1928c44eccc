//! Element type descriptors for stream ports.
//!
//! A [`DType`] tells a stage how the bytes it moves are grouped into
//! elements. File stages move raw bytes, but the scheduler asks for work in
//! elements, so sources convert between the two with [`DType::size`].
//!
//! ```rust
//! use parallax_filestream::format::DType;
//!
//! let dtype = DType::parse("complex_float32").unwrap();
//! assert_eq!(dtype.size(), 8);
//!
//! let vec4 = DType::parse("int16:4").unwrap();
//! assert_eq!(vec4.size(), 8);
//! assert_eq!(vec4.dimension(), 4);
//! ```

use crate::error::{Error, Result};
use std::fmt;

/// Scalar kind of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// Signed integer.
    Int,
    /// Unsigned integer.
    UInt,
    /// IEEE-754 floating point.
    Float,
}

/// Element type of a stream: scalar kind, width, complexity and dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DType {
    kind: ScalarKind,
    /// Width of one scalar component in bytes.
    width: usize,
    complex: bool,
    dimension: usize,
}

impl DType {
    /// Create a new element type.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for widths the kind cannot have or a
    /// zero dimension.
    pub fn new(kind: ScalarKind, width: usize, complex: bool, dimension: usize) -> Result<Self> {
        let valid_width = match kind {
            ScalarKind::Int | ScalarKind::UInt => matches!(width, 1 | 2 | 4 | 8),
            ScalarKind::Float => matches!(width, 4 | 8),
        };
        if !valid_width {
            return Err(Error::Configuration(format!(
                "unsupported {kind:?} width of {width} bytes"
            )));
        }
        if dimension == 0 {
            return Err(Error::Configuration("dtype dimension must be >= 1".into()));
        }
        Ok(Self {
            kind,
            width,
            complex,
            dimension,
        })
    }

    /// Raw bytes (`uint8`).
    pub const fn bytes() -> Self {
        Self {
            kind: ScalarKind::UInt,
            width: 1,
            complex: false,
            dimension: 1,
        }
    }

    /// Parse a dtype name such as `int32`, `uint8`, `float64`,
    /// `complex_int16` or `complex_float64`, optionally followed by
    /// `:<dimension>`.
    pub fn parse(name: &str) -> Result<Self> {
        let bad = || Error::Configuration(format!("unknown dtype '{name}'"));

        let (base, dimension) = match name.split_once(':') {
            Some((base, dim)) => (base, dim.trim().parse::<usize>().map_err(|_| bad())?),
            None => (name, 1),
        };
        let base = base.trim();

        let (complex, scalar) = match base.strip_prefix("complex_") {
            Some(rest) => (true, rest),
            None => (false, base),
        };

        let (kind, bits) = if let Some(bits) = scalar.strip_prefix("uint") {
            (ScalarKind::UInt, bits)
        } else if let Some(bits) = scalar.strip_prefix("int") {
            (ScalarKind::Int, bits)
        } else if let Some(bits) = scalar.strip_prefix("float") {
            (ScalarKind::Float, bits)
        } else {
            return Err(bad());
        };

        let bits: usize = bits.parse().map_err(|_| bad())?;
        if bits % 8 != 0 {
            return Err(bad());
        }
        Self::new(kind, bits / 8, complex, dimension)
    }

    /// Scalar kind.
    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    /// Width of a single scalar component in bytes.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Whether each component is a complex pair.
    pub fn is_complex(&self) -> bool {
        self.complex
    }

    /// Whether the scalar kind is floating point.
    pub fn is_float(&self) -> bool {
        self.kind == ScalarKind::Float
    }

    /// Number of components per element.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        let parts = if self.complex { 2 } else { 1 };
        self.width * parts * self.dimension
    }

    /// Number of whole elements contained in `bytes` bytes.
    pub fn elements_in(&self, bytes: usize) -> usize {
        bytes / self.size()
    }
}

impl Default for DType {
    fn default() -> Self {
        Self::bytes()
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.complex {
            f.write_str("complex_")?;
        }
        let kind = match self.kind {
            ScalarKind::Int => "int",
            ScalarKind::UInt => "uint",
            ScalarKind::Float => "float",
        };
        write!(f, "{}{}", kind, self.width * 8)?;
        if self.dimension != 1 {
            write!(f, ":{}", self.dimension)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for DType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
