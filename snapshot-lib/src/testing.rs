//! Encoders producing account buffers in the on-chain layouts, for tests.

use crate::address::Address;
use crate::layout::{account_discriminator, DISCRIMINATOR_LEN};
use crate::registrar::{Registrar, MAX_VOTING_MINTS, REGISTRAR_ACCOUNT_SIZE};
use crate::voter::{
    DepositSlot, SchemaVersion, DEPOSIT_ENTRY_SIZE, MAX_DEPOSITS, VOTER_ACCOUNT_SIZE,
};

const DEPOSITS_OFFSET: usize = DISCRIMINATOR_LEN + 32 + 32;

#[derive(Clone, Debug)]
pub struct VoterAccountBuilder {
    version: SchemaVersion,
    authority: Address,
    registrar: Address,
    delegate: Option<Address>,
    deposits: [DepositSlot; MAX_DEPOSITS],
}

impl VoterAccountBuilder {
    pub fn new(version: SchemaVersion, authority: Address) -> Self {
        Self {
            version,
            authority,
            registrar: Address::default(),
            delegate: None,
            deposits: [DepositSlot::default(); MAX_DEPOSITS],
        }
    }

    /// Byte offset of the deposit slot `index` inside the account.
    pub fn deposit_offset(index: usize) -> usize {
        DEPOSITS_OFFSET + index * DEPOSIT_ENTRY_SIZE
    }

    pub fn registrar(mut self, registrar: Address) -> Self {
        self.registrar = registrar;
        self
    }

    /// Only encoded by layouts that know about delegation.
    pub fn delegate(mut self, delegate: Address) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn deposit(mut self, index: usize, deposit: DepositSlot) -> Self {
        self.deposits[index] = deposit;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(VOTER_ACCOUNT_SIZE);
        data.extend_from_slice(&self.version.discriminator());
        data.extend_from_slice(self.authority.as_bytes());
        data.extend_from_slice(self.registrar.as_bytes());
        for deposit in &self.deposits {
            encode_deposit(&mut data, deposit);
        }
        // voter bump and voter weight record bump
        data.extend_from_slice(&[255, 254]);
        if let (SchemaVersion::V2, Some(delegate)) = (self.version, self.delegate) {
            data.extend_from_slice(delegate.as_bytes());
        }
        data.resize(VOTER_ACCOUNT_SIZE, 0);
        data
    }
}

fn encode_deposit(data: &mut Vec<u8>, deposit: &DepositSlot) {
    let start = data.len();
    data.extend_from_slice(&deposit.lockup.start_ts.to_le_bytes());
    data.extend_from_slice(&deposit.lockup.end_ts.to_le_bytes());
    data.push(deposit.lockup.kind.to_u8());
    data.extend_from_slice(&[0; 15]);
    data.extend_from_slice(&deposit.amount.to_le_bytes());
    data.extend_from_slice(&deposit.amount_initially_locked.to_le_bytes());
    data.push(deposit.used.into());
    data.push(deposit.allow_clawback.into());
    data.push(deposit.voting_mint_config_idx);
    data.resize(start + DEPOSIT_ENTRY_SIZE, 0);
}

#[derive(Clone, Copy, Debug, Default)]
struct VotingMintEntry {
    mint: Address,
    baseline: u64,
    max_extra: u64,
    saturation_secs: u64,
}

#[derive(Clone, Debug, Default)]
pub struct RegistrarAccountBuilder {
    voting_mints: [VotingMintEntry; MAX_VOTING_MINTS],
    time_offset: i64,
}

impl RegistrarAccountBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn voting_mint(
        mut self,
        index: usize,
        mint: Address,
        baseline: u64,
        max_extra: u64,
        saturation_secs: u64,
    ) -> Self {
        self.voting_mints[index] = VotingMintEntry {
            mint,
            baseline,
            max_extra,
            saturation_secs,
        };
        self
    }

    pub fn time_offset(mut self, time_offset: i64) -> Self {
        self.time_offset = time_offset;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(REGISTRAR_ACCOUNT_SIZE);
        data.extend_from_slice(&account_discriminator(Registrar::ACCOUNT_NAME));
        // governance program id, realm, realm governing token mint, realm authority, reserved
        data.extend_from_slice(&[0; 5 * 32]);
        for entry in &self.voting_mints {
            let start = data.len();
            data.extend_from_slice(entry.mint.as_bytes());
            // grant authority
            data.extend_from_slice(&[0; 32]);
            data.extend_from_slice(&entry.baseline.to_le_bytes());
            data.extend_from_slice(&entry.max_extra.to_le_bytes());
            data.extend_from_slice(&entry.saturation_secs.to_le_bytes());
            data.resize(start + 152, 0);
        }
        data.extend_from_slice(&self.time_offset.to_le_bytes());
        data.push(255);
        data.resize(REGISTRAR_ACCOUNT_SIZE, 0);
        data
    }
}

#[cfg(any(test, feature = "proptest"))]
mod arbitrary {
    use super::*;
    use crate::lockup::Lockup;
    use proptest::collection::vec;
    use proptest::prelude::*;

    impl Arbitrary for DepositSlot {
        type Parameters = ();
        type Strategy = BoxedStrategy<DepositSlot>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            (any::<bool>(), 0..1_000_000_000_000u64, any::<Lockup>(), 0u8..4)
                .prop_map(|(used, amount, lockup, voting_mint_config_idx)| DepositSlot {
                    used,
                    amount,
                    amount_initially_locked: amount,
                    lockup,
                    allow_clawback: false,
                    voting_mint_config_idx,
                })
                .boxed()
        }
    }

    impl Arbitrary for VoterAccountBuilder {
        type Parameters = ();
        type Strategy = BoxedStrategy<VoterAccountBuilder>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            (
                prop::sample::select(SchemaVersion::ALL.to_vec()),
                any::<Address>(),
                any::<Option<Address>>(),
                vec(any::<DepositSlot>(), MAX_DEPOSITS),
            )
                .prop_map(|(version, authority, delegate, deposits)| {
                    let mut builder = VoterAccountBuilder::new(version, authority);
                    builder.delegate = delegate;
                    for (index, deposit) in deposits.into_iter().enumerate() {
                        builder.deposits[index] = deposit;
                    }
                    builder
                })
                .boxed()
        }
    }
}
