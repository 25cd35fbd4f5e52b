use crate::address::Address;
use crate::layout::{account_discriminator, check_size, DecodeError, Discriminator, Reader};
use crate::lockup::{Lockup, LockupKind};
use serde::Serialize;

pub const MAX_DEPOSITS: usize = 32;
pub const DEPOSIT_ENTRY_SIZE: usize = 80;
/// Both schema versions share the same account size, so a single `dataSize`
/// filter selects every voter account of the program.
pub const VOTER_ACCOUNT_SIZE: usize = 2728;

/// Layout versions of the voter account, told apart by their discriminator.
///
/// `V1` is the original Voter Stake Registry layout, which has no notion of
/// delegation. `V2` stores a delegate authority in what used to be reserved
/// space right after the bump seeds. Decoding for every listed version stays
/// available: a layout change always comes with a new discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SchemaVersion {
    V1,
    V2,
}

impl SchemaVersion {
    pub const ALL: [SchemaVersion; 2] = [SchemaVersion::V1, SchemaVersion::V2];

    pub fn account_name(self) -> &'static str {
        match self {
            Self::V1 => "Voter",
            Self::V2 => "VoterV2",
        }
    }

    pub fn discriminator(self) -> Discriminator {
        account_discriminator(self.account_name())
    }

    pub fn from_discriminator(discriminator: &Discriminator) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|version| version.discriminator() == *discriminator)
    }
}

/// One of the fixed deposit slots of a voter account.
///
/// Slots are reused in place, so an unused slot may still carry the amount
/// and lockup of a previous deposit. Only `used` says whether those bytes mean
/// anything.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DepositSlot {
    pub used: bool,
    pub amount: u64,
    pub amount_initially_locked: u64,
    pub lockup: Lockup,
    pub allow_clawback: bool,
    pub voting_mint_config_idx: u8,
}

impl DepositSlot {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let start_ts = reader.i64("lockup.start_ts")?;
        let end_ts = reader.i64("lockup.end_ts")?;
        let kind = reader.u8("lockup.kind")?;
        reader.skip("lockup.reserved", 15)?;
        let amount = reader.u64("amount_deposited_native")?;
        let amount_initially_locked = reader.u64("amount_initially_locked_native")?;
        let used = reader.bool("is_used")?;
        let allow_clawback = reader.u8("allow_clawback")? != 0;
        let voting_mint_config_idx = reader.u8("voting_mint_config_idx")?;
        reader.skip("deposit.reserved", 29)?;

        let kind = match LockupKind::from_u8(kind) {
            Some(kind) => kind,
            // stale bytes of a free slot are never interpreted
            None if !used => LockupKind::None,
            None => {
                return Err(DecodeError::InvalidField {
                    field: "lockup.kind",
                    value: kind.into(),
                })
            }
        };
        if used && kind != LockupKind::None && start_ts > end_ts {
            return Err(DecodeError::InvalidField {
                field: "lockup.end_ts",
                value: end_ts,
            });
        }

        Ok(Self {
            used,
            amount,
            amount_initially_locked,
            lockup: Lockup::new(kind, start_ts, end_ts),
            allow_clawback,
            voting_mint_config_idx,
        })
    }
}

/// A decoded voter account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VoterRecord {
    /// Address the account was fetched from.
    pub address: Address,
    pub version: SchemaVersion,
    /// Owner of the deposits.
    pub authority: Address,
    /// Who currently exercises the voting rights; equals `authority` when no
    /// delegation is active.
    pub delegate_authority: Address,
    pub registrar: Address,
    pub deposits: [DepositSlot; MAX_DEPOSITS],
}

impl VoterRecord {
    pub fn decode(address: Address, data: &[u8]) -> Result<Self, DecodeError> {
        check_size(data, VOTER_ACCOUNT_SIZE)?;
        let mut reader = Reader::new(data);
        let found = reader.discriminator()?;
        let version = SchemaVersion::from_discriminator(&found)
            .ok_or(DecodeError::WrongDiscriminator { found })?;

        let authority = reader.address("voter_authority")?;
        let registrar = reader.address("registrar")?;
        let mut deposits = [DepositSlot::default(); MAX_DEPOSITS];
        for deposit in deposits.iter_mut() {
            *deposit = DepositSlot::decode(&mut reader)?;
        }
        reader.skip("voter_bump", 1)?;
        reader.skip("voter_weight_record_bump", 1)?;

        let delegate_authority = match version {
            SchemaVersion::V1 => authority,
            SchemaVersion::V2 => {
                let delegate = reader.address("delegate_authority")?;
                if delegate.is_zeroed() {
                    authority
                } else {
                    delegate
                }
            }
        };

        Ok(Self {
            address,
            version,
            authority,
            delegate_authority,
            registrar,
            deposits,
        })
    }

    pub fn is_delegated(&self) -> bool {
        self.delegate_authority != self.authority
    }

    /// Slots holding a live deposit, with their index.
    pub fn used_deposits(&self) -> impl Iterator<Item = (u8, &DepositSlot)> {
        self.deposits
            .iter()
            .enumerate()
            .filter(|(_, deposit)| deposit.used)
            .map(|(index, deposit)| (index as u8, deposit))
    }
}
