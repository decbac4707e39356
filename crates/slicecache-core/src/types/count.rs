use derive_more::{Add, AddAssign, Sum};
use serde::{Deserialize, Serialize};

///
/// DayCount
///
/// Additive denominator/numerator pair (`n` entered, `k` converted).
/// Any additive count pair fits; rates are derived, never stored.
///

#[derive(
    Add, AddAssign, Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize, Sum,
)]
pub struct DayCount {
    pub n: u64,
    pub k: u64,
}

impl DayCount {
    pub const ZERO: Self = Self { n: 0, k: 0 };

    #[must_use]
    pub const fn new(n: u64, k: u64) -> Self {
        Self { n, k }
    }

    /// `k / n`, or `None` when the denominator is zero.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn rate(&self) -> Option<f64> {
        (self.n > 0).then(|| self.k as f64 / self.n as f64)
    }

    /// Scale both counts by `part / whole`, rounding half up.
    #[must_use]
    pub fn prorate(&self, part: u32, whole: u32) -> Self {
        Self {
            n: scale_half_up(self.n, part, whole),
            k: scale_half_up(self.k, part, whole),
        }
    }
}

#[expect(clippy::cast_possible_truncation)]
fn scale_half_up(value: u64, part: u32, whole: u32) -> u64 {
    if whole == 0 {
        return 0;
    }
    let scaled = u128::from(value) * u128::from(part);
    let whole = u128::from(whole);

    ((scaled * 2 + whole) / (whole * 2)) as u64
}

///
/// TESTS
///
