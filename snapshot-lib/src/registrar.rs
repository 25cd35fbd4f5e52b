use crate::address::Address;
use crate::layout::{account_discriminator, check_size, DecodeError, Reader};
use crate::lockup::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_VOTING_MINTS: usize = 4;
pub const REGISTRAR_ACCOUNT_SIZE: usize = 880;

/// Scale of the vote weight factors: `1_000_000_000` means 1.0x.
pub const SCALED_FACTOR_BASE: u64 = 1_000_000_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrarConfigError {
    #[error("baseline weight must be positive")]
    ZeroBaseline,
    #[error("lockup saturation period must be positive")]
    ZeroSaturation,
    #[error("registrar has no voting mint configured at index {0}")]
    UnknownVotingMint(usize),
}

/// Network-wide parameters of the multiplier formula.
///
/// A value of this type is always valid: the baseline and the saturation
/// period are both non-zero, so the multiplier never divides by zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RegistrarParams", into = "RegistrarParams")]
pub struct RegistrarConfig {
    baseline_weight: u64,
    max_extra_weight: u64,
    lockup_saturation_secs: u64,
    time_offset: i64,
}

/// Unvalidated form of [`RegistrarConfig`], as found in configuration files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrarParams {
    pub baseline_weight: u64,
    pub max_extra_weight: u64,
    pub lockup_saturation_secs: u64,
    /// Seconds added to the wall clock before evaluating lockups.
    #[serde(default)]
    pub time_offset: i64,
}

impl RegistrarConfig {
    pub fn new(
        baseline_weight: u64,
        max_extra_weight: u64,
        lockup_saturation_secs: u64,
    ) -> Result<Self, RegistrarConfigError> {
        if baseline_weight == 0 {
            return Err(RegistrarConfigError::ZeroBaseline);
        }
        if lockup_saturation_secs == 0 {
            return Err(RegistrarConfigError::ZeroSaturation);
        }
        Ok(Self {
            baseline_weight,
            max_extra_weight,
            lockup_saturation_secs,
            time_offset: 0,
        })
    }

    pub fn with_time_offset(mut self, time_offset: i64) -> Self {
        self.time_offset = time_offset;
        self
    }

    pub fn baseline_weight(&self) -> u64 {
        self.baseline_weight
    }

    pub fn max_extra_weight(&self) -> u64 {
        self.max_extra_weight
    }

    pub fn lockup_saturation_secs(&self) -> u64 {
        self.lockup_saturation_secs
    }

    pub fn time_offset(&self) -> i64 {
        self.time_offset
    }

    /// Registrar time at wall-clock time `now`.
    pub fn clock(&self, now: Timestamp) -> Timestamp {
        now.saturating_add(self.time_offset)
    }
}

impl TryFrom<RegistrarParams> for RegistrarConfig {
    type Error = RegistrarConfigError;

    fn try_from(params: RegistrarParams) -> Result<Self, Self::Error> {
        Self::new(
            params.baseline_weight,
            params.max_extra_weight,
            params.lockup_saturation_secs,
        )
        .map(|config| config.with_time_offset(params.time_offset))
    }
}

impl From<RegistrarConfig> for RegistrarParams {
    fn from(config: RegistrarConfig) -> Self {
        Self {
            baseline_weight: config.baseline_weight,
            max_extra_weight: config.max_extra_weight,
            lockup_saturation_secs: config.lockup_saturation_secs,
            time_offset: config.time_offset,
        }
    }
}

/// Per-mint vote weight settings of a registrar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VotingMintConfig {
    pub mint: Address,
    pub grant_authority: Address,
    pub baseline_vote_weight: u64,
    pub max_extra_lockup_vote_weight: u64,
    pub lockup_saturation_secs: u64,
    pub digit_shift: i8,
}

impl VotingMintConfig {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let config = Self {
            mint: reader.address("voting_mint.mint")?,
            grant_authority: reader.address("voting_mint.grant_authority")?,
            baseline_vote_weight: reader.u64("voting_mint.baseline_vote_weight")?,
            max_extra_lockup_vote_weight: reader.u64("voting_mint.max_extra_lockup_vote_weight")?,
            lockup_saturation_secs: reader.u64("voting_mint.lockup_saturation_secs")?,
            digit_shift: reader.i8("voting_mint.digit_shift")?,
        };
        reader.skip("voting_mint.reserved", 7 + 7 * 8)?;
        Ok(config)
    }

    pub fn is_configured(&self) -> bool {
        !self.mint.is_zeroed()
    }
}

/// The registrar account: one per governance realm.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registrar {
    pub governance_program_id: Address,
    pub realm: Address,
    pub realm_governing_token_mint: Address,
    pub realm_authority: Address,
    pub voting_mints: [VotingMintConfig; MAX_VOTING_MINTS],
    pub time_offset: i64,
    pub bump: u8,
}

impl Registrar {
    pub const ACCOUNT_NAME: &'static str = "Registrar";

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        check_size(data, REGISTRAR_ACCOUNT_SIZE)?;
        let mut reader = Reader::new(data);
        let found = reader.discriminator()?;
        if found != account_discriminator(Self::ACCOUNT_NAME) {
            return Err(DecodeError::WrongDiscriminator { found });
        }

        let governance_program_id = reader.address("governance_program_id")?;
        let realm = reader.address("realm")?;
        let realm_governing_token_mint = reader.address("realm_governing_token_mint")?;
        let realm_authority = reader.address("realm_authority")?;
        reader.skip("reserved1", 32)?;

        let mut voting_mints = [VotingMintConfig::default(); MAX_VOTING_MINTS];
        for voting_mint in voting_mints.iter_mut() {
            *voting_mint = VotingMintConfig::decode(&mut reader)?;
        }

        let time_offset = reader.i64("time_offset")?;
        let bump = reader.u8("bump")?;
        reader.skip("reserved2", 7 + 11 * 8)?;

        Ok(Self {
            governance_program_id,
            realm,
            realm_governing_token_mint,
            realm_authority,
            voting_mints,
            time_offset,
            bump,
        })
    }

    /// Multiplier parameters of the voting mint at `index`.
    pub fn registrar_config(&self, index: usize) -> Result<RegistrarConfig, RegistrarConfigError> {
        let voting_mint = self
            .voting_mints
            .get(index)
            .filter(|mint| mint.is_configured())
            .ok_or(RegistrarConfigError::UnknownVotingMint(index))?;
        RegistrarConfig::new(
            voting_mint.baseline_vote_weight,
            voting_mint.max_extra_lockup_vote_weight,
            voting_mint.lockup_saturation_secs,
        )
        .map(|config| config.with_time_offset(self.time_offset))
    }
}
