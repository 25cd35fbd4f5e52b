//! Retried, rate-limited and cancellable scan of program accounts.

use crate::rpc::{PageRequest, Pagination, ProgramAccountsRpc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use vsr_snapshot_lib::{Address, RawAccount, VOTER_ACCOUNT_SIZE};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transient RPC failure: {0}")]
    Transient(String),

    #[error("giving up after {attempts} attempts, last error: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("malformed RPC response: {0}")]
    MalformedResponse(String),

    #[error("fetch cancelled")]
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per request, the first one included.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 250,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (starting at 0): doubles every time,
    /// capped at `max_backoff_ms`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Shared flag stopping a scan before its next request.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct Throttle {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Throttle {
    fn wait(&self) {
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                thread::sleep(self.min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

pub struct AccountSource<R> {
    rpc: R,
    pagination: Pagination,
    retry: RetryPolicy,
    throttle: Throttle,
    cancel: CancelToken,
}

impl<R: ProgramAccountsRpc> AccountSource<R> {
    pub fn new(rpc: R) -> Self {
        Self {
            rpc,
            pagination: Pagination::default(),
            retry: RetryPolicy::default(),
            throttle: Throttle::default(),
            cancel: CancelToken::default(),
        }
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_min_request_interval(mut self, min_interval: Duration) -> Self {
        self.throttle.min_interval = min_interval;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    /// Every voter-sized account owned by `program_id`, page after page.
    ///
    /// Nothing is requested until the iterator is polled. Calling this again
    /// starts a new scan from the first page.
    pub fn fetch_all(&self, program_id: Address) -> ProgramAccounts<'_, R> {
        ProgramAccounts {
            source: self,
            program_id,
            buffered: Vec::new().into_iter(),
            cursor: None,
            pages: 0,
            done: false,
        }
    }

    pub fn fetch_account(&self, address: &Address) -> Result<Option<Vec<u8>>, FetchError> {
        self.with_retry("getAccountInfo", |rpc| rpc.account(address))
    }

    fn with_retry<T>(
        &self,
        what: &str,
        request: impl Fn(&R) -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        let attempts = self.retry.attempts();
        let mut attempt = 1;
        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            self.throttle.wait();
            match request(&self.rpc) {
                Err(FetchError::Transient(reason)) if attempt < attempts => {
                    let delay = self.retry.backoff(attempt - 1);
                    warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {:?}",
                        what, attempt, attempts, reason, delay
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(FetchError::Transient(last)) => {
                    debug!("{} failed {} times, giving up", what, attempt);
                    return Err(FetchError::Exhausted {
                        attempts: attempt,
                        last,
                    });
                }
                result => return result,
            }
        }
    }
}

/// Iterator returned by [`AccountSource::fetch_all`].
///
/// `None` means every page has been read. After yielding an error the
/// iterator is exhausted: a scan is never resumed past a failure.
pub struct ProgramAccounts<'a, R> {
    source: &'a AccountSource<R>,
    program_id: Address,
    buffered: std::vec::IntoIter<RawAccount>,
    cursor: Option<String>,
    pages: usize,
    done: bool,
}

impl<'a, R: ProgramAccountsRpc> ProgramAccounts<'a, R> {
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    fn next_request(&mut self) -> PageRequest {
        PageRequest {
            program_id: self.program_id,
            data_size: Some(VOTER_ACCOUNT_SIZE),
            limit: match self.source.pagination {
                Pagination::Single => None,
                Pagination::Cursor { limit } => Some(limit.max(1)),
            },
            cursor: self.cursor.take(),
        }
    }
}

impl<'a, R: ProgramAccountsRpc> Iterator for ProgramAccounts<'a, R> {
    type Item = Result<RawAccount, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(account) = self.buffered.next() {
                return Some(Ok(account));
            }
            if self.done {
                return None;
            }

            let request = self.next_request();
            match self
                .source
                .with_retry("getProgramAccounts", |rpc| rpc.program_accounts_page(&request))
            {
                Ok(page) => {
                    self.pages += 1;
                    debug!(
                        "page {} of {}: {} accounts, more: {}",
                        self.pages,
                        self.program_id,
                        page.accounts.len(),
                        page.next_cursor.is_some()
                    );
                    self.done = request.limit.is_none()
                        || page.accounts.is_empty()
                        || page.next_cursor.is_none();
                    self.cursor = page.next_cursor;
                    self.buffered = page.accounts.into_iter();
                }
                Err(error) => {
                    self.done = true;
                    return Some(Err(error));
                }
            }
        }
    }
}

impl<'a, R: ProgramAccountsRpc> FusedIterator for ProgramAccounts<'a, R> {}
