//! In-memory RPC node used by the tests of this crate.

use crate::account_source::FetchError;
use crate::rpc::{AccountsPage, PageRequest, ProgramAccountsRpc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use vsr_snapshot_lib::{Address, RawAccount};

#[derive(Default)]
pub struct FakeRpc {
    pages: Mutex<Vec<Vec<RawAccount>>>,
    accounts: Mutex<HashMap<Address, Vec<u8>>>,
    failures: Mutex<VecDeque<FetchError>>,
    requests: Mutex<Vec<PageRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

impl FakeRpc {
    pub fn with_pages(pages: Vec<Vec<RawAccount>>) -> Self {
        Self {
            pages: Mutex::new(pages),
            ..Default::default()
        }
    }

    pub fn set_pages(&self, pages: Vec<Vec<RawAccount>>) {
        *lock(&self.pages) = pages;
    }

    pub fn insert_account(&self, address: Address, data: Vec<u8>) {
        lock(&self.accounts).insert(address, data);
    }

    /// Makes the next request, whatever it is, fail with `error`.
    pub fn fail_next(&self, error: FetchError) {
        lock(&self.failures).push_back(error);
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        lock(&self.requests).clone()
    }

    fn pop_failure(&self) -> Result<(), FetchError> {
        match lock(&self.failures).pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl ProgramAccountsRpc for FakeRpc {
    fn program_accounts_page(&self, request: &PageRequest) -> Result<AccountsPage, FetchError> {
        lock(&self.requests).push(request.clone());
        self.pop_failure()?;

        let pages = lock(&self.pages);
        if request.limit.is_none() {
            return Ok(AccountsPage {
                accounts: pages.iter().flatten().cloned().collect(),
                next_cursor: None,
            });
        }
        let index: usize = request
            .cursor
            .as_deref()
            .map(|cursor| cursor.parse().unwrap())
            .unwrap_or(0);
        Ok(AccountsPage {
            accounts: pages.get(index).cloned().unwrap_or_default(),
            next_cursor: (index + 1 < pages.len()).then(|| (index + 1).to_string()),
        })
    }

    fn account(&self, address: &Address) -> Result<Option<Vec<u8>>, FetchError> {
        self.pop_failure()?;
        Ok(lock(&self.accounts).get(address).cloned())
    }
}
