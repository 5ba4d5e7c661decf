//! Heavy Work
//!
//! The CPU-bound payload every scenario runs: the sum of `[0, n)`.
//! Accumulation is checked, so an accumulator that is too narrow reports
//! [`LabError::ArithmeticOverflow`] instead of wrapping.

use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, LabError, Result};

/// Magnitude of the heavy computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkSize(u64);

impl WorkSize {
    /// The size the demonstration runs with.
    pub const DEFAULT: Self = Self(1_000_000_000);

    pub const fn new(size: u64) -> Self {
        Self(size)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Default for WorkSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for WorkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkSize {
    type Err = ConfigError;

    /// Accepts plain integers with optional `_` digit separators (`1_000_000`).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let digits: String = s.trim().chars().filter(|c| *c != '_').collect();
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ConfigError::InvalidWorkSize { value: s.to_string() })
    }
}

/// Integer type the sum is accumulated in
pub trait Accumulator: Copy + fmt::Debug {
    const BITS: u32;
    const ZERO: Self;

    /// Convert a range element, `None` if it does not fit.
    fn from_index(index: u64) -> Option<Self>;

    fn checked_add(self, rhs: Self) -> Option<Self>;
}

impl Accumulator for i32 {
    const BITS: u32 = i32::BITS;
    const ZERO: Self = 0;

    fn from_index(index: u64) -> Option<Self> {
        i32::try_from(index).ok()
    }

    fn checked_add(self, rhs: Self) -> Option<Self> {
        i32::checked_add(self, rhs)
    }
}

impl Accumulator for i64 {
    const BITS: u32 = i64::BITS;
    const ZERO: Self = 0;

    fn from_index(index: u64) -> Option<Self> {
        i64::try_from(index).ok()
    }

    fn checked_add(self, rhs: Self) -> Option<Self> {
        i64::checked_add(self, rhs)
    }
}

/// Sum of `[0, size)` accumulated in `A`.
pub fn sum_range_in<A: Accumulator>(size: WorkSize) -> Result<A> {
    let n = size.get();
    (0..n)
        .try_fold(A::ZERO, |acc, i| acc.checked_add(A::from_index(i)?))
        .ok_or(LabError::ArithmeticOverflow { size: n, width: A::BITS })
}

/// Sum of `[0, size)` in a 64-bit signed accumulator.
pub fn sum_range(size: WorkSize) -> Result<i64> {
    sum_range_in::<i64>(size)
}

/// Same computation behind an `async` signature.
///
/// The body never awaits anything, so the first poll runs the whole loop
/// and returns `Ready`. Awaiting this occupies the caller's context exactly
/// like calling [`sum_range`] directly.
pub async fn sum_range_async(size: WorkSize) -> Result<i64> {
    sum_range(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangular(n: u64) -> i64 {
        if n == 0 {
            return 0;
        }
        (u128::from(n) * u128::from(n - 1) / 2) as i64
    }

    #[test]
    fn test_sum_small_sizes() {
        for n in [0u64, 1, 2, 3, 10, 1_000, 65_537] {
            assert_eq!(sum_range(WorkSize::new(n)).unwrap(), triangular(n), "n = {n}");
        }
    }

    #[test]
    fn test_sum_zero_is_zero() {
        assert_eq!(sum_range(WorkSize::new(0)).unwrap(), 0);
        assert_eq!(sum_range_in::<i32>(WorkSize::new(0)).unwrap(), 0);
    }

    #[test]
    fn test_sum_full_work_size() {
        assert_eq!(sum_range(WorkSize::DEFAULT).unwrap(), 499_999_999_500_000_000);
    }

    #[test]
    fn test_narrow_accumulator_overflows() {
        let err = sum_range_in::<i32>(WorkSize::DEFAULT).unwrap_err();
        assert_eq!(err, LabError::ArithmeticOverflow { size: 1_000_000_000, width: 32 });
    }

    #[test]
    fn test_narrow_accumulator_boundary() {
        // 65_536 * 65_535 / 2 = 2_147_450_880 still fits i32; one more element does not.
        assert_eq!(sum_range_in::<i32>(WorkSize::new(65_536)).unwrap(), 2_147_450_880);
        assert!(sum_range_in::<i32>(WorkSize::new(65_537)).is_err());
    }

    #[test]
    fn test_async_form_matches() {
        let size = WorkSize::new(12_345);
        let direct = sum_range(size).unwrap();
        let awaited = smol::block_on(sum_range_async(size)).unwrap();
        assert_eq!(direct, awaited);
    }

    #[test]
    fn test_parse_work_size() {
        assert_eq!("1_000_000_000".parse::<WorkSize>().unwrap(), WorkSize::DEFAULT);
        assert_eq!(" 42 ".parse::<WorkSize>().unwrap(), WorkSize::new(42));
        assert!("-5".parse::<WorkSize>().is_err());
        assert!("lots".parse::<WorkSize>().is_err());
    }
}
