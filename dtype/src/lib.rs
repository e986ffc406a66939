//! Element types for tessera tensors.
//!
//! [`DType`] is the closed set of element types a tensor variable may declare. Indexing
//! cares about three families: booleans (masks), integers (indices), and everything else
//! (data that can only be indexed, never used as an index).

pub mod cast;


/// Tensor element type.
#[derive(Debug, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::FromRepr, strum::IntoStaticStr)]
#[derive(enumset::EnumSetType)]
#[cfg_attr(any(test, feature = "proptest"), derive(proptest_derive::Arbitrary))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[enumset(repr = "u32")]
#[strum(serialize_all = "lowercase")]
pub enum DType {
    Bool = 0,

    Int8 = 1,
    UInt8 = 2,
    Int16 = 3,
    UInt16 = 4,
    Int32 = 5,
    UInt32 = 6,
    Int64 = 7,
    UInt64 = 8,

    Float16 = 9,
    Float32 = 10,
    Float64 = 11,

    Complex64 = 12,
    Complex128 = 13,
}

impl DType {
    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }

    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64)
    }

    pub const fn is_int(&self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float16 | Self::Float32 | Self::Float64)
    }

    pub const fn is_complex(&self) -> bool {
        matches!(self, Self::Complex64 | Self::Complex128)
    }

    /// Booleans and integers: the dtypes whose gradient is identically zero.
    pub const fn is_discrete(&self) -> bool {
        self.is_bool() || self.is_int()
    }

    /// NumPy-style name (`"int64"`, `"float32"`, ...).
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DType {
    type Err = UnknownDType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use strum::IntoEnumIterator;

        Self::iter().find(|dtype| dtype.name() == s).ok_or_else(|| UnknownDType(s.to_string()))
    }
}

/// Returned by [`DType::from_str`](std::str::FromStr) for unrecognised names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDType(pub String);

impl std::fmt::Display for UnknownDType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown dtype name {:?}", self.0)
    }
}

impl std::error::Error for UnknownDType {}
