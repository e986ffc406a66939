use super::*;
use enumset::EnumSet;

impl DType {
    const fn promotion_lattice(self) -> &'static [Self] {
        use DType::*;
        match self {
            Bool => &[Int8, UInt8],
            Int8 => &[Int16],
            Int16 => &[Int32, Float32],
            Int32 => &[Int64, Float64],
            Int64 => &[Float64],
            UInt8 => &[Int16, UInt16],
            UInt16 => &[Int32, UInt32],
            UInt32 => &[Int64, UInt64],
            UInt64 => &[Float64],
            Float16 => &[Float32],
            Float32 => &[Float64, Complex64],
            Float64 => &[Complex128],
            Complex64 => &[Complex128],
            Complex128 => &[],
        }
    }

    fn get_recursive_parents(self) -> EnumSet<Self> {
        self.promotion_lattice()
            .iter()
            .fold(EnumSet::only(self), |dtypes, &parent| dtypes.union(parent.get_recursive_parents()))
    }

    /// Check if casting from `self` to `to` preserves every value.
    ///
    /// Used to validate the value operand of increment/set operators: `x[idx] += y` is only
    /// accepted when `y` fits into `x`'s dtype.
    pub fn can_safe_cast(self, to: Self) -> bool {
        self.get_recursive_parents().contains(to)
    }
}
