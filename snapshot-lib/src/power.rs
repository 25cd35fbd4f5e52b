use crate::address::{Address, WalletId};
use crate::lockup::{multiplier_exact, LockupKind, Timestamp};
use crate::registrar::RegistrarConfig;
use crate::voter::{DepositSlot, VoterRecord};
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerSource {
    /// The wallet owns the deposit.
    Native,
    /// The wallet votes with someone else's deposit.
    Delegated,
}

/// How a single deposit slot adds up to the final result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DepositContribution {
    pub record: Address,
    pub slot_index: u8,
    pub amount: u64,
    pub multiplier: Decimal,
    pub power: Decimal,
    pub lockup_kind: LockupKind,
    /// Whether the lockup still earns a bonus.
    pub is_active: bool,
    pub source: PowerSource,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PowerResult {
    pub native: Decimal,
    pub delegated: Decimal,
    /// Ordered by record address, then slot index.
    pub deposits: Vec<DepositContribution>,
}

impl PowerResult {
    pub fn native_power(&self) -> f64 {
        to_f64(self.native)
    }

    pub fn delegated_power(&self) -> f64 {
        to_f64(self.delegated)
    }

    pub fn total(&self) -> Decimal {
        self.native.saturating_add(self.delegated)
    }

    /// Sum of the two converted components, so it always matches them
    /// exactly once out of the crate.
    pub fn total_power(&self) -> f64 {
        self.native_power() + self.delegated_power()
    }
}

/// Lossy conversion used when handing results out of the crate.
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::MAX)
}

type SlotKey = (Address, u8);

/// Deposit slots `wallet` can vote with, keyed by identity.
///
/// The same account may show up more than once when pages were re-fetched;
/// only its first occurrence is considered. Keys are computed here, before
/// any sharding, so no two workers can ever see the same slot.
fn slots_for_wallet<'a>(
    records: &'a [VoterRecord],
    wallet: &WalletId,
) -> BTreeMap<SlotKey, (PowerSource, &'a DepositSlot)> {
    let mut seen = BTreeSet::new();
    let mut slots = BTreeMap::new();
    for record in records {
        if !seen.insert(record.address) {
            continue;
        }
        let source = if record.authority == *wallet {
            PowerSource::Native
        } else if record.delegate_authority == *wallet {
            PowerSource::Delegated
        } else {
            continue;
        };
        for (index, deposit) in record.used_deposits() {
            slots.insert((record.address, index), (source, deposit));
        }
    }
    slots
}

fn evaluate(
    slots: &[(SlotKey, (PowerSource, &DepositSlot))],
    now: Timestamp,
    config: &RegistrarConfig,
) -> PowerResult {
    slots.iter().fold(
        PowerResult::default(),
        |mut acc, ((record, slot_index), (source, deposit))| {
            let multiplier = multiplier_exact(&deposit.lockup, now, config);
            let power = Decimal::from(deposit.amount).saturating_mul(multiplier);
            match source {
                PowerSource::Native => acc.native = acc.native.saturating_add(power),
                PowerSource::Delegated => acc.delegated = acc.delegated.saturating_add(power),
            }
            acc.deposits.push(DepositContribution {
                record: *record,
                slot_index: *slot_index,
                amount: deposit.amount,
                multiplier,
                power,
                lockup_kind: deposit.lockup.kind,
                is_active: !deposit.lockup.is_expired(now),
                source: *source,
            });
            acc
        },
    )
}

/// Voting power of `wallet` over a snapshot of voter records.
pub fn aggregate(
    records: &[VoterRecord],
    wallet: &WalletId,
    now: Timestamp,
    config: &RegistrarConfig,
) -> PowerResult {
    aggregate_parallel(records, wallet, now, config, 1)
}

/// Same as [`aggregate`], with the deposit evaluation split into up to
/// `workers` shards run on the rayon pool. The partial results are reduced
/// in shard order, so the outcome does not depend on the number of workers.
pub fn aggregate_parallel(
    records: &[VoterRecord],
    wallet: &WalletId,
    now: Timestamp,
    config: &RegistrarConfig,
    workers: usize,
) -> PowerResult {
    let slots = slots_for_wallet(records, wallet)
        .into_iter()
        .collect::<Vec<_>>();

    let workers = workers.clamp(1, slots.len().max(1));
    if workers == 1 {
        return evaluate(&slots, now, config);
    }

    let shard_size = (slots.len() + workers - 1) / workers;
    let partials = slots
        .par_chunks(shard_size)
        .map(|shard| evaluate(shard, now, config))
        .collect::<Vec<_>>();

    partials
        .into_iter()
        .fold(PowerResult::default(), |mut acc, partial| {
            acc.native = acc.native.saturating_add(partial.native);
            acc.delegated = acc.delegated.saturating_add(partial.delegated);
            acc.deposits.extend(partial.deposits);
            acc
        })
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WalletPower {
    pub native: Decimal,
    pub delegated: Decimal,
}

impl WalletPower {
    pub fn total(&self) -> Decimal {
        self.native.saturating_add(self.delegated)
    }
}

/// Voting power of every wallet appearing in `records`, either as authority
/// or as delegate, attributed the same way [`aggregate`] does.
pub fn voting_power_table(
    records: &[VoterRecord],
    now: Timestamp,
    config: &RegistrarConfig,
) -> BTreeMap<WalletId, WalletPower> {
    let mut seen = BTreeSet::new();
    let mut table: BTreeMap<WalletId, WalletPower> = BTreeMap::new();
    for record in records {
        if !seen.insert(record.address) {
            continue;
        }
        let power = record
            .used_deposits()
            .map(|(_, deposit)| {
                Decimal::from(deposit.amount)
                    .saturating_mul(multiplier_exact(&deposit.lockup, now, config))
            })
            .fold(Decimal::ZERO, Decimal::saturating_add);

        let owner = table.entry(record.authority).or_default();
        owner.native = owner.native.saturating_add(power);
        if record.is_delegated() {
            let delegate = table.entry(record.delegate_authority).or_default();
            delegate.delegated = delegate.delegated.saturating_add(power);
        }
    }
    table
}
