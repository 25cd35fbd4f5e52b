use crate::address::{Address, WalletId};
use crate::layout::DecodeError;
use crate::lockup::Timestamp;
use crate::power::{aggregate_parallel, voting_power_table, PowerResult, WalletPower};
use crate::registrar::RegistrarConfig;
use crate::voter::VoterRecord;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// An account as returned by the chain, before decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawAccount {
    pub address: Address,
    pub data: Vec<u8>,
}

/// An account left out of the snapshot, with the reason why.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedAccount {
    pub address: Address,
    #[serde(serialize_with = "serialize_display")]
    pub reason: DecodeError,
}

fn serialize_display<S: Serializer>(value: &DecodeError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Decoded voter accounts of one scan of the registry program.
///
/// Malformed accounts do not abort the scan: they are kept aside in
/// [`Snapshot::skipped`] so a partial view can never pass for a complete one.
#[derive(Clone, Debug)]
pub struct Snapshot {
    records: Vec<VoterRecord>,
    skipped: BTreeMap<Address, DecodeError>,
    captured_at: Timestamp,
}

impl Snapshot {
    pub fn from_raw_accounts<I>(accounts: I, captured_at: Timestamp) -> Self
    where
        I: IntoIterator<Item = RawAccount>,
    {
        accounts.into_iter().fold(
            Self {
                records: Vec::new(),
                skipped: BTreeMap::new(),
                captured_at,
            },
            |mut acc, RawAccount { address, data }| {
                match VoterRecord::decode(address, &data) {
                    Ok(record) => acc.records.push(record),
                    Err(reason) => {
                        acc.skipped.entry(address).or_insert(reason);
                    }
                }
                acc
            },
        )
    }

    pub fn records(&self) -> &[VoterRecord] {
        &self.records
    }

    pub fn skipped(&self) -> Vec<SkippedAccount> {
        self.skipped
            .iter()
            .map(|(address, reason)| SkippedAccount {
                address: *address,
                reason: reason.clone(),
            })
            .collect()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Unix time at which the accounts were fetched.
    pub fn captured_at(&self) -> Timestamp {
        self.captured_at
    }

    pub fn power_for(
        &self,
        wallet: &WalletId,
        now: Timestamp,
        config: &RegistrarConfig,
        workers: usize,
    ) -> PowerResult {
        aggregate_parallel(&self.records, wallet, now, config, workers)
    }

    pub fn voting_power_table(
        &self,
        now: Timestamp,
        config: &RegistrarConfig,
    ) -> BTreeMap<WalletId, WalletPower> {
        voting_power_table(&self.records, now, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockup::Lockup;
    use crate::registrar::SCALED_FACTOR_BASE;
    use crate::testing::VoterAccountBuilder;
    use crate::voter::{DepositSlot, SchemaVersion};
    use rust_decimal_macros::dec;

    const NOW: i64 = 1_700_000_000;

    fn account(tag: u8, data: Vec<u8>) -> RawAccount {
        RawAccount {
            address: Address::new([tag; 32]),
            data,
        }
    }

    #[test]
    fn malformed_accounts_are_skipped_and_reported() {
        let wallet = Address::new([1; 32]);
        let good = VoterAccountBuilder::new(SchemaVersion::V1, wallet)
            .deposit(
                0,
                DepositSlot {
                    used: true,
                    amount: 77,
                    lockup: Lockup::default(),
                    ..Default::default()
                },
            )
            .build();
        let mut foreign = good.clone();
        foreign[0] ^= 1;

        let snapshot = Snapshot::from_raw_accounts(
            vec![
                account(10, good),
                account(11, vec![0; 16]),
                account(12, foreign.clone()),
                account(12, foreign),
            ],
            NOW,
        );

        assert_eq!(snapshot.records().len(), 1);
        assert_eq!(snapshot.skipped_count(), 2);
        let skipped = snapshot.skipped();
        assert_eq!(skipped[0].address, Address::new([11; 32]));
        assert!(matches!(skipped[0].reason, DecodeError::WrongSize { .. }));
        assert!(matches!(
            skipped[1].reason,
            DecodeError::WrongDiscriminator { .. }
        ));

        let config = RegistrarConfig::new(SCALED_FACTOR_BASE, 0, 1).unwrap();
        assert_eq!(snapshot.power_for(&wallet, NOW, &config, 4).native, dec!(77));
        assert_eq!(snapshot.voting_power_table(NOW, &config)[&wallet].native, dec!(77));
    }

    #[test]
    fn skipped_account_reason_is_readable() {
        let skipped = SkippedAccount {
            address: Address::new([11; 32]),
            reason: DecodeError::WrongSize {
                expected: 2728,
                actual: 16,
            },
        };
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(
            json["reason"],
            "account is 16 bytes long, expected 2728"
        );
    }
}
