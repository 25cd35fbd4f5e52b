use crate::account_source::AccountSource;
use crate::cache::Cache;
use crate::config::Config;
use crate::error::Error;
use crate::registrar_store::RegistrarStore;
use crate::rpc::{JsonRpcClient, ProgramAccountsRpc};
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use vsr_snapshot_lib::{
    to_f64, Address, DepositContribution, LockupKind, PowerResult, PowerSource, RegistrarConfig,
    SkippedAccount, Snapshot, Timestamp, WalletId, WalletPower,
};

/// Voting power of one wallet, as handed out to callers.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernancePower {
    pub wallet: WalletId,
    /// Registrar time the lockups were evaluated at.
    pub evaluated_at: Timestamp,
    pub native_power: f64,
    pub delegated_power: f64,
    pub total_power: f64,
    pub deposits: Vec<DepositReport>,
    /// Accounts of the scan that could not be decoded.
    pub skipped_accounts: Vec<SkippedAccount>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositReport {
    pub record: Address,
    pub slot_index: u8,
    pub amount: u64,
    pub multiplier: f64,
    pub power: f64,
    pub lockup_kind: LockupKind,
    pub is_active: bool,
    pub source: PowerSource,
}

impl From<&DepositContribution> for DepositReport {
    fn from(contribution: &DepositContribution) -> Self {
        Self {
            record: contribution.record,
            slot_index: contribution.slot_index,
            amount: contribution.amount,
            multiplier: to_f64(contribution.multiplier),
            power: to_f64(contribution.power),
            lockup_kind: contribution.lockup_kind,
            is_active: contribution.is_active,
            source: contribution.source,
        }
    }
}

impl GovernancePower {
    fn new(wallet: WalletId, evaluated_at: Timestamp, result: &PowerResult, snapshot: &Snapshot) -> Self {
        Self {
            wallet,
            evaluated_at,
            native_power: result.native_power(),
            delegated_power: result.delegated_power(),
            total_power: result.total_power(),
            deposits: result.deposits.iter().map(DepositReport::from).collect(),
            skipped_accounts: snapshot.skipped(),
        }
    }
}

pub fn unix_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as Timestamp)
}

/// Answers governance power queries from fresh scans of the registry program.
pub struct GovernanceService<R> {
    accounts: AccountSource<R>,
    program_id: Address,
    registrar: RegistrarStore,
    workers: usize,
    cache: Option<Mutex<Cache<GovernancePower>>>,
}

impl GovernanceService<JsonRpcClient> {
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let rpc = JsonRpcClient::new(config.json_rpc_url.clone(), config.request_timeout())?;
        let accounts = AccountSource::new(rpc)
            .with_pagination(config.pagination)
            .with_retry_policy(config.retry)
            .with_min_request_interval(config.min_request_interval());
        let registrar = RegistrarStore::new(config.registrar_source()?);

        let service = Self::new(accounts, config.program_id, registrar).with_workers(config.workers);
        Ok(match config.cache_ttl() {
            Some(ttl) => service.with_cache(Cache::new(ttl)),
            None => service,
        })
    }
}

impl<R: ProgramAccountsRpc> GovernanceService<R> {
    pub fn new(accounts: AccountSource<R>, program_id: Address, registrar: RegistrarStore) -> Self {
        Self {
            accounts,
            program_id,
            registrar,
            workers: 1,
            cache: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_cache(mut self, cache: Cache<GovernancePower>) -> Self {
        self.cache = Some(Mutex::new(cache));
        self
    }

    pub fn accounts(&self) -> &AccountSource<R> {
        &self.accounts
    }

    fn cache(&self) -> Option<MutexGuard<'_, Cache<GovernancePower>>> {
        self.cache
            .as_ref()
            .map(|cache| cache.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Fetches and decodes every voter account of the program, or returns
    /// the cached scan while it is fresh.
    pub fn scan(&self) -> Result<Arc<Snapshot>, Error> {
        if let Some(snapshot) = self.cache().and_then(|cache| cache.snapshot()) {
            return Ok(snapshot);
        }

        let captured_at = unix_now();
        info!("scanning voter accounts of {}", self.program_id);
        let mut scan = self.accounts.fetch_all(self.program_id);
        let accounts = scan.by_ref().collect::<Result<Vec<_>, _>>()?;
        let pages = scan.pages_fetched();

        let snapshot = Arc::new(Snapshot::from_raw_accounts(accounts, captured_at));
        for skipped in snapshot.skipped() {
            warn!("skipping account {}: {}", skipped.address, skipped.reason);
        }
        info!(
            "scan done: {} voter records, {} skipped, {} pages",
            snapshot.records().len(),
            snapshot.skipped_count(),
            pages
        );

        if let Some(mut cache) = self.cache() {
            cache.set_snapshot(Arc::clone(&snapshot));
        }
        Ok(snapshot)
    }

    pub fn registrar_config(&self) -> Result<Arc<RegistrarConfig>, Error> {
        self.registrar.snapshot(&self.accounts)
    }

    /// Voting power of `wallet` over a fresh scan, with lockups evaluated at
    /// the time the scan was captured.
    pub fn compute_governance_power(&self, wallet: &WalletId) -> Result<GovernancePower, Error> {
        let snapshot = self.scan()?;
        let evaluated_at = snapshot.captured_at();
        if let Some(result) = self.cache().and_then(|cache| cache.result(wallet, evaluated_at)) {
            return Ok(result);
        }

        let config = self.registrar_config()?;
        let power = self.power_over(&snapshot, &config, wallet, evaluated_at);
        if let Some(mut cache) = self.cache() {
            cache.insert_result(*wallet, evaluated_at, power.clone());
        }
        Ok(power)
    }

    /// Same as [`GovernanceService::compute_governance_power`], with lockups
    /// evaluated at `now` instead. Never cached.
    pub fn compute_governance_power_at(
        &self,
        wallet: &WalletId,
        now: Timestamp,
    ) -> Result<GovernancePower, Error> {
        let snapshot = self.scan()?;
        let config = self.registrar_config()?;
        Ok(self.power_over(&snapshot, &config, wallet, now))
    }

    /// Power of several wallets over a single scan, evaluated at `now` or
    /// at the time of the scan.
    pub fn compute_governance_power_batch(
        &self,
        wallets: &[WalletId],
        now: Option<Timestamp>,
    ) -> Result<Vec<GovernancePower>, Error> {
        let snapshot = self.scan()?;
        let config = self.registrar_config()?;
        let now = now.unwrap_or_else(|| snapshot.captured_at());
        Ok(wallets
            .iter()
            .map(|wallet| self.power_over(&snapshot, &config, wallet, now))
            .collect())
    }

    fn power_over(
        &self,
        snapshot: &Snapshot,
        config: &RegistrarConfig,
        wallet: &WalletId,
        now: Timestamp,
    ) -> GovernancePower {
        let now = config.clock(now);
        let result = snapshot.power_for(wallet, now, config, self.workers);
        info!(
            "{}: native {}, delegated {} over {} deposits",
            wallet,
            result.native,
            result.delegated,
            result.deposits.len()
        );
        GovernancePower::new(*wallet, now, &result, snapshot)
    }

    /// Power of every wallet found in a fresh scan.
    pub fn voting_power_table(
        &self,
        now: Option<Timestamp>,
    ) -> Result<(Arc<Snapshot>, BTreeMap<WalletId, WalletPower>), Error> {
        let snapshot = self.scan()?;
        let config = self.registrar_config()?;
        let now = now.unwrap_or_else(|| snapshot.captured_at());
        let table = snapshot.voting_power_table(config.clock(now), &config);
        Ok((snapshot, table))
    }

    /// Reads the registrar configuration again. Cached results computed with
    /// the previous one are dropped.
    pub fn reload_registrar(&self) -> Result<Arc<RegistrarConfig>, Error> {
        let config = self.registrar.reload(&self.accounts)?;
        self.invalidate_cache();
        Ok(config)
    }

    pub fn invalidate_cache(&self) {
        if let Some(mut cache) = self.cache() {
            cache.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account_source::{FetchError, RetryPolicy};
    use crate::config::RegistrarSource;
    use crate::rpc::Pagination;
    use crate::testing::FakeRpc;
    use proptest::collection::vec;
    use proptest::prelude::*;
    use std::time::Duration;
    use test_strategy::proptest;
    use vsr_snapshot_lib::registrar::SCALED_FACTOR_BASE;
    use vsr_snapshot_lib::testing::{RegistrarAccountBuilder, VoterAccountBuilder};
    use vsr_snapshot_lib::{DepositSlot, Lockup, RawAccount, SchemaVersion};

    const DAY: i64 = 86_400;
    const YEAR: u64 = 31_557_600;
    const NOW: i64 = 1_700_000_000;
    const REGISTRAR: Address = Address::new([200; 32]);
    const WALLET: Address = Address::new([1; 32]);
    const OTHER: Address = Address::new([2; 32]);

    fn deposit(amount: u64, lockup: Lockup) -> DepositSlot {
        DepositSlot {
            used: true,
            amount,
            amount_initially_locked: amount,
            lockup,
            ..Default::default()
        }
    }

    fn raw(tag: u8, data: Vec<u8>) -> RawAccount {
        RawAccount {
            address: Address::new([tag; 32]),
            data,
        }
    }

    fn service(pages: Vec<Vec<RawAccount>>) -> GovernanceService<FakeRpc> {
        let rpc = FakeRpc::with_pages(pages);
        rpc.insert_account(
            REGISTRAR,
            RegistrarAccountBuilder::new()
                .voting_mint(0, Address::new([9; 32]), SCALED_FACTOR_BASE, SCALED_FACTOR_BASE, YEAR)
                .build(),
        );
        let accounts = AccountSource::new(rpc)
            .with_pagination(Pagination::Cursor { limit: 2 })
            .with_retry_policy(RetryPolicy {
                max_attempts: 2,
                initial_backoff_ms: 0,
                max_backoff_ms: 0,
            });
        let registrar = RegistrarStore::new(RegistrarSource::Account {
            address: REGISTRAR,
            voting_mint_index: 0,
        });
        GovernanceService::new(accounts, Address::new([100; 32]), registrar).with_workers(3)
    }

    #[test]
    fn locked_deposit_gets_its_bonus() {
        let lockup = Lockup::new(
            vsr_snapshot_lib::LockupKind::Constant,
            NOW - 100 * DAY,
            NOW + 200 * DAY,
        );
        let record = VoterAccountBuilder::new(SchemaVersion::V1, WALLET)
            .deposit(0, deposit(1_000_000, lockup))
            .build();
        let service = service(vec![vec![raw(10, record)]]);

        let power = service.compute_governance_power_at(&WALLET, NOW).unwrap();
        assert_eq!(power.native_power, 1_548_000.0);
        assert_eq!(power.delegated_power, 0.0);
        assert_eq!(power.total_power, 1_548_000.0);
        assert_eq!(power.deposits.len(), 1);
        assert!((power.deposits[0].multiplier - 1.548).abs() < 1e-12);
        assert!(power.deposits[0].is_active);

        let expired = service
            .compute_governance_power_at(&WALLET, NOW + 200 * DAY + 1)
            .unwrap();
        assert_eq!(expired.total_power, 1_000_000.0);
        assert!(!expired.deposits[0].is_active);
    }

    #[test]
    fn lockups_follow_the_registrar_clock() {
        let lockup = Lockup::new(vsr_snapshot_lib::LockupKind::Cliff, NOW - DAY, NOW + DAY);
        let record = VoterAccountBuilder::new(SchemaVersion::V1, WALLET)
            .deposit(0, deposit(1_000_000, lockup))
            .build();
        let service = service(vec![vec![raw(10, record)]]);
        service.accounts().rpc().insert_account(
            REGISTRAR,
            RegistrarAccountBuilder::new()
                .voting_mint(0, Address::new([9; 32]), SCALED_FACTOR_BASE, SCALED_FACTOR_BASE, YEAR)
                .time_offset(2 * DAY)
                .build(),
        );

        let power = service.compute_governance_power_at(&WALLET, NOW).unwrap();
        assert_eq!(power.evaluated_at, NOW + 2 * DAY);
        assert_eq!(power.total_power, 1_000_000.0);
        assert!(!power.deposits[0].is_active);
    }

    #[test]
    fn native_and_delegated_power_across_pages() {
        let delegated = VoterAccountBuilder::new(SchemaVersion::V2, OTHER)
            .delegate(WALLET)
            .deposit(0, deposit(500_000, Lockup::default()))
            .build();
        let owned = VoterAccountBuilder::new(SchemaVersion::V1, WALLET)
            .deposit(4, deposit(200_000, Lockup::default()))
            .build();
        let unrelated = VoterAccountBuilder::new(SchemaVersion::V1, OTHER)
            .deposit(0, deposit(9_999, Lockup::default()))
            .build();
        let service = service(vec![
            vec![raw(10, delegated), raw(11, unrelated)],
            vec![raw(12, owned), raw(13, vec![1, 2, 3])],
        ]);

        let power = service.compute_governance_power(&WALLET).unwrap();
        assert_eq!(power.native_power, 200_000.0);
        assert_eq!(power.delegated_power, 500_000.0);
        assert_eq!(power.total_power, 700_000.0);
        assert_eq!(power.skipped_accounts.len(), 1);
        assert_eq!(power.skipped_accounts[0].address, Address::new([13; 32]));

        let sources: Vec<_> = power.deposits.iter().map(|d| (d.slot_index, d.source)).collect();
        assert_eq!(
            sources,
            vec![(0, PowerSource::Delegated), (4, PowerSource::Native)]
        );
    }

    #[test]
    fn unknown_wallet_has_no_power() {
        let service = service(vec![]);
        let power = service.compute_governance_power(&WALLET).unwrap();
        assert_eq!(power.total_power, 0.0);
        assert!(power.deposits.is_empty());
    }

    #[test]
    fn json_shape() {
        let record = VoterAccountBuilder::new(SchemaVersion::V1, WALLET)
            .deposit(0, deposit(10, Lockup::default()))
            .build();
        let service = service(vec![vec![raw(10, record)]]);
        let json = serde_json::to_value(service.compute_governance_power_at(&WALLET, NOW).unwrap())
            .unwrap();
        assert_eq!(json["nativePower"], 10.0);
        assert_eq!(json["totalPower"], 10.0);
        assert_eq!(json["evaluatedAt"], NOW);
        assert_eq!(json["skippedAccounts"], serde_json::json!([]));
        let deposit = &json["deposits"][0];
        assert_eq!(deposit["slotIndex"], 0);
        assert_eq!(deposit["lockupKind"], "none");
        assert_eq!(deposit["source"], "native");
        assert_eq!(deposit["isActive"], false);
        assert_eq!(deposit["record"], Address::new([10; 32]).to_string());
    }

    #[test]
    fn failed_scan_is_an_error() {
        let service = service(vec![vec![]]);
        service
            .accounts()
            .rpc()
            .fail_next(FetchError::Rejected("forbidden".to_string()));
        assert!(matches!(
            service.compute_governance_power(&WALLET),
            Err(Error::Fetch(FetchError::Rejected(_)))
        ));
    }

    #[test]
    fn cached_results_until_invalidated() {
        let owned = |amount| {
            VoterAccountBuilder::new(SchemaVersion::V1, WALLET)
                .deposit(0, deposit(amount, Lockup::default()))
                .build()
        };
        let service = service(vec![vec![raw(10, owned(100))]])
            .with_cache(Cache::new(Duration::from_secs(3600)));

        let first = service.compute_governance_power(&WALLET).unwrap();
        assert_eq!(first.total_power, 100.0);
        let requests = service.accounts().rpc().requests().len();

        service.accounts().rpc().set_pages(vec![vec![raw(10, owned(300))]]);
        assert_eq!(service.compute_governance_power(&WALLET).unwrap(), first);
        assert_eq!(service.accounts().rpc().requests().len(), requests);

        service.invalidate_cache();
        let refreshed = service.compute_governance_power(&WALLET).unwrap();
        assert_eq!(refreshed.total_power, 300.0);
    }

    #[test]
    fn batch_uses_one_scan() {
        let owned = VoterAccountBuilder::new(SchemaVersion::V1, WALLET)
            .deposit(0, deposit(100, Lockup::default()))
            .build();
        let other = VoterAccountBuilder::new(SchemaVersion::V1, OTHER)
            .deposit(0, deposit(5, Lockup::default()))
            .build();
        let service = service(vec![vec![raw(10, owned), raw(11, other)]]);

        let results = service
            .compute_governance_power_batch(&[WALLET, OTHER], Some(NOW))
            .unwrap();
        assert_eq!(results[0].total_power, 100.0);
        assert_eq!(results[1].total_power, 5.0);
        assert_eq!(service.accounts().rpc().requests().len(), 1);
    }

    #[proptest]
    fn batch_agrees_with_single_queries(
        #[strategy(vec(any::<VoterAccountBuilder>(), 1..6))] accounts: Vec<VoterAccountBuilder>,
    ) {
        let raws = accounts
            .iter()
            .enumerate()
            .map(|(i, account)| raw(i as u8 + 10, account.build()))
            .collect::<Vec<_>>();
        let service = service(raws.chunks(2).map(<[_]>::to_vec).collect());
        let (_, table) = service.voting_power_table(Some(NOW)).unwrap();
        let mut wallets = table.keys().copied().collect::<Vec<_>>();
        wallets.push(Address::new([77; 32]));

        let batch = service
            .compute_governance_power_batch(&wallets, Some(NOW))
            .unwrap();
        prop_assert_eq!(batch.len(), wallets.len());
        for (wallet, power) in wallets.iter().zip(&batch) {
            if let Some(row) = table.get(wallet) {
                prop_assert_eq!(power.native_power, to_f64(row.native));
                prop_assert_eq!(power.delegated_power, to_f64(row.delegated));
            }
            prop_assert_eq!(power, &service.compute_governance_power_at(wallet, NOW).unwrap());
            prop_assert_eq!(power.total_power, power.native_power + power.delegated_power);
        }
    }

    #[test]
    fn table_covers_every_wallet() {
        let delegated = VoterAccountBuilder::new(SchemaVersion::V2, OTHER)
            .delegate(WALLET)
            .deposit(0, deposit(500_000, Lockup::default()))
            .build();
        let service = service(vec![vec![raw(10, delegated)]]);
        let (snapshot, table) = service.voting_power_table(Some(NOW)).unwrap();
        assert_eq!(snapshot.records().len(), 1);
        assert_eq!(table[&OTHER].native, rust_decimal_macros::dec!(500000));
        assert_eq!(table[&WALLET].delegated, rust_decimal_macros::dec!(500000));
    }
}
