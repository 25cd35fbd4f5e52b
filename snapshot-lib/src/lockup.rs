use crate::registrar::RegistrarConfig;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of decimal places multipliers are rounded to.
pub const MULTIPLIER_DECIMALS: u32 = 3;

/// Unix timestamp in seconds.
pub type Timestamp = i64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LockupKind {
    #[default]
    None,
    /// Unlocks linearly, one period at a time.
    Vesting,
    Monthly,
    Cliff,
    Constant,
}

impl LockupKind {
    /// Kind as stored on chain: 0 none, 1 daily vesting, 2 monthly, 3 cliff, 4 constant.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Vesting),
            2 => Some(Self::Monthly),
            3 => Some(Self::Cliff),
            4 => Some(Self::Constant),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Vesting => 1,
            Self::Monthly => 2,
            Self::Cliff => 3,
            Self::Constant => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lockup {
    pub kind: LockupKind,
    pub start_ts: Timestamp,
    pub end_ts: Timestamp,
}

impl Lockup {
    pub fn new(kind: LockupKind, start_ts: Timestamp, end_ts: Timestamp) -> Self {
        Self {
            kind,
            start_ts,
            end_ts,
        }
    }

    /// Absent or finished lockups earn no bonus.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.kind == LockupKind::None || now >= self.end_ts
    }
}

/// Voting power multiplier of `lockup` at `now`, rounded to [`MULTIPLIER_DECIMALS`].
///
/// The result lies in `[1, (baseline + max_extra) / baseline]` and is exactly 1
/// for any lockup that is absent or has ended.
pub fn multiplier_exact(lockup: &Lockup, now: Timestamp, config: &RegistrarConfig) -> Decimal {
    if lockup.is_expired(now) {
        return Decimal::ONE;
    }

    let remaining = Decimal::from(lockup.end_ts.abs_diff(now));
    let duration = Decimal::from(
        lockup
            .end_ts
            .checked_sub(lockup.start_ts)
            .unwrap_or(i64::MAX)
            .max(1),
    );
    let saturation = Decimal::from(config.lockup_saturation_secs());

    let ratio = match lockup.kind {
        LockupKind::Cliff | LockupKind::Monthly => remaining / saturation,
        LockupKind::Constant | LockupKind::Vesting => {
            let elapsed = Decimal::from(now.saturating_sub(lockup.start_ts));
            let unlocked = (elapsed / duration).clamp(Decimal::ZERO, Decimal::ONE);
            (Decimal::ONE - unlocked) * duration / saturation
        }
        LockupKind::None => Decimal::ZERO,
    }
    .min(Decimal::ONE);

    let baseline = Decimal::from(config.baseline_weight());
    let max_extra = Decimal::from(config.max_extra_weight());
    ((baseline + max_extra * ratio) / baseline)
        .round_dp_with_strategy(MULTIPLIER_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
}

pub fn multiplier(lockup: &Lockup, now: Timestamp, config: &RegistrarConfig) -> f64 {
    multiplier_exact(lockup, now, config)
        .to_f64()
        .unwrap_or(f64::MAX)
}

#[cfg(any(test, feature = "proptest"))]
mod arbitrary {
    use super::*;
    use proptest::prelude::*;

    // about 30 years either side of the epoch keeps timestamps realistic
    const SPAN: i64 = 1_000_000_000;

    impl Arbitrary for LockupKind {
        type Parameters = ();
        type Strategy = BoxedStrategy<LockupKind>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            (0u8..5)
                .prop_map(|kind| LockupKind::from_u8(kind).unwrap_or_default())
                .boxed()
        }
    }

    impl Arbitrary for Lockup {
        type Parameters = ();
        type Strategy = BoxedStrategy<Lockup>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            (any::<LockupKind>(), -SPAN..SPAN, 0..SPAN)
                .prop_map(|(kind, start_ts, length)| Lockup::new(kind, start_ts, start_ts + length))
                .boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registrar::SCALED_FACTOR_BASE;
    use rust_decimal_macros::dec;
    use test_strategy::proptest;

    const DAY: i64 = 86_400;
    const YEAR: u64 = 31_557_600;
    const NOW: i64 = 1_700_000_000;

    fn config() -> RegistrarConfig {
        RegistrarConfig::new(SCALED_FACTOR_BASE, SCALED_FACTOR_BASE, YEAR).unwrap()
    }

    #[test]
    fn constant_lockup_partially_elapsed() {
        let lockup = Lockup::new(LockupKind::Constant, NOW - 100 * DAY, NOW + 200 * DAY);
        // 200 days still locked out of a 365.25 day saturation: 1.54757...
        assert_eq!(multiplier_exact(&lockup, NOW, &config()), dec!(1.548));
        assert_eq!(multiplier(&lockup, NOW, &config()), 1.548);
    }

    #[test]
    fn expired_lockup_is_exactly_baseline() {
        let lockup = Lockup::new(LockupKind::Constant, NOW - 100 * DAY, NOW - 1);
        assert_eq!(multiplier_exact(&lockup, NOW, &config()), Decimal::ONE);
        assert_eq!(multiplier(&lockup, NOW, &config()), 1.0);

        let ends_now = Lockup::new(LockupKind::Cliff, NOW - DAY, NOW);
        assert_eq!(multiplier_exact(&ends_now, NOW, &config()), Decimal::ONE);
    }

    #[test]
    fn no_lockup_ignores_timestamps() {
        let lockup = Lockup::new(LockupKind::None, NOW, NOW + 10 * 365 * DAY);
        assert_eq!(multiplier_exact(&lockup, NOW, &config()), Decimal::ONE);
    }

    #[test]
    fn cliff_saturates_at_max_extra() {
        let lockup = Lockup::new(LockupKind::Cliff, NOW, NOW + 5 * 365 * DAY);
        assert_eq!(multiplier_exact(&lockup, NOW, &config()), dec!(2));

        let half = Lockup::new(LockupKind::Monthly, NOW, NOW + (YEAR / 2) as i64);
        assert_eq!(multiplier_exact(&half, NOW, &config()), dec!(1.5));
    }

    #[test]
    fn constant_lockup_not_started_counts_full_duration() {
        let lockup = Lockup::new(LockupKind::Vesting, NOW + DAY, NOW + DAY + (YEAR / 4) as i64);
        assert_eq!(multiplier_exact(&lockup, NOW, &config()), dec!(1.25));
    }

    #[test]
    fn zero_length_lockup_does_not_divide_by_zero() {
        let lockup = Lockup::new(LockupKind::Constant, NOW + 10, NOW + 10);
        assert_eq!(multiplier_exact(&lockup, NOW, &config()), dec!(1));
    }

    #[test]
    fn rounds_half_away_from_zero() {
        // ratio 0.0005 lands exactly on the rounding midpoint
        let config = RegistrarConfig::new(SCALED_FACTOR_BASE, SCALED_FACTOR_BASE, 10_000).unwrap();
        let lockup = Lockup::new(LockupKind::Cliff, NOW, NOW + 5);
        assert_eq!(multiplier_exact(&lockup, NOW, &config), dec!(1.001));
    }

    #[proptest]
    fn multiplier_is_bounded(lockup: Lockup, #[strategy(-1_000_000_000i64..1_000_000_000)] now: i64) {
        let config = RegistrarConfig::new(SCALED_FACTOR_BASE, 3 * SCALED_FACTOR_BASE, YEAR).unwrap();
        let m = multiplier_exact(&lockup, now, &config);
        assert!(m >= Decimal::ONE);
        assert!(m <= dec!(4));
    }

    #[proptest]
    fn multiplier_never_increases_with_time(
        lockup: Lockup,
        #[strategy(-1_000_000_000i64..1_000_000_000)] now: i64,
        #[strategy(0i64..100_000_000)] later: i64,
    ) {
        let config = config();
        let before = multiplier_exact(&lockup, now, &config);
        let after = multiplier_exact(&lockup, now + later, &config);
        assert!(after <= before);
        if now + later >= lockup.end_ts {
            assert_eq!(after, Decimal::ONE);
        }
    }
}
