//! # IR Types
//!
//! Scalar element types and the lane-carrying [`DataType`] attached to every
//! expression node. `lanes > 1` is a vector type, as produced by vectorized
//! element accesses and the `broadcast` intrinsic.

/// Scalar element types supported by the kernel IR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElemType {
    Bool,
    S32,
    U32,
    F32,
}

impl std::fmt::Display for ElemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::S32 => write!(f, "s32"),
            Self::U32 => write!(f, "u32"),
            Self::F32 => write!(f, "f32"),
        }
    }
}

/// The type of an expression: an element type plus a lane count.
///
/// A `DataType` with `lanes == 1` is a scalar; `lanes > 1` is a SIMD vector
/// of `lanes` elements. Cache variables introduced by optimization passes
/// take the exact `DataType` of the access they replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataType {
    pub elem: ElemType,
    pub lanes: u32,
}

impl DataType {
    /// Creates a scalar type
    pub const fn scalar(elem: ElemType) -> Self {
        Self { elem, lanes: 1 }
    }

    /// Creates a vector type with the given lane count
    pub const fn vector(elem: ElemType, lanes: u32) -> Self {
        Self { elem, lanes }
    }

    /// Scalar `bool`
    pub const fn bool_() -> Self {
        Self::scalar(ElemType::Bool)
    }

    /// Scalar `s32`
    pub const fn s32() -> Self {
        Self::scalar(ElemType::S32)
    }

    /// Scalar `u32`
    pub const fn u32_() -> Self {
        Self::scalar(ElemType::U32)
    }

    /// Scalar `f32`
    pub const fn f32() -> Self {
        Self::scalar(ElemType::F32)
    }

    /// Returns true if this is a single-lane type
    pub const fn is_scalar(&self) -> bool {
        self.lanes == 1
    }

    /// Returns the same element type with a different lane count
    pub const fn with_lanes(self, lanes: u32) -> Self {
        Self {
            elem: self.elem,
            lanes,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.lanes > 1 {
            write!(f, "{}x{}", self.elem, self.lanes)
        } else {
            write!(f, "{}", self.elem)
        }
    }
}
