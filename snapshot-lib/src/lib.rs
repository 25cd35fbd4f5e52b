//! Voting power of Voter Stake Registry deposits.
//!
//! Everything in this crate is pure: account buffers go in, decoded records
//! and voting power come out. Fetching accounts from the chain is left to the
//! caller.

pub mod address;
pub mod layout;
pub mod lockup;
pub mod power;
pub mod registrar;
pub mod snapshot;
pub mod voter;

#[cfg(any(test, feature = "test-api"))]
pub mod testing;

pub use address::{Address, AddressError, WalletId};
pub use layout::DecodeError;
pub use lockup::{multiplier, multiplier_exact, Lockup, LockupKind, Timestamp};
pub use power::{
    aggregate, aggregate_parallel, to_f64, voting_power_table, DepositContribution, PowerResult,
    PowerSource, WalletPower,
};
pub use registrar::{Registrar, RegistrarConfig, RegistrarConfigError, RegistrarParams};
pub use snapshot::{RawAccount, SkippedAccount, Snapshot};
pub use voter::{DepositSlot, SchemaVersion, VoterRecord, VOTER_ACCOUNT_SIZE};
