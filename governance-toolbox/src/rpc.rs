//! Solana JSON-RPC access to program accounts.
//!
//! Only the handful of calls needed to scan a program are implemented:
//! `getProgramAccounts` in one shot, the cursor-paged `getProgramAccountsV2`
//! offered by some providers, and `getAccountInfo`.

use crate::account_source::FetchError;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use vsr_snapshot_lib::{Address, RawAccount};

/// JSON-RPC error codes meaning "try again later".
const TRANSIENT_RPC_CODES: [i64; 5] = [-32004, -32005, -32014, -32016, 429];

/// How the program accounts are requested from the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Pagination {
    /// A single `getProgramAccounts` call returning everything.
    Single,
    /// `getProgramAccountsV2` pages of at most `limit` accounts.
    Cursor { limit: usize },
}

impl Default for Pagination {
    fn default() -> Self {
        Self::Single
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub program_id: Address,
    /// Server-side `dataSize` filter.
    pub data_size: Option<usize>,
    /// `None` asks for everything in one response.
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountsPage {
    pub accounts: Vec<RawAccount>,
    /// `None` once the last page has been served.
    pub next_cursor: Option<String>,
}

pub trait ProgramAccountsRpc {
    fn program_accounts_page(&self, request: &PageRequest) -> Result<AccountsPage, FetchError>;

    /// Data of a single account, `None` if it does not exist.
    fn account(&self, address: &Address) -> Result<Option<Vec<u8>>, FetchError>;
}

pub struct JsonRpcClient {
    url: String,
    client: Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Rejected(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, FetchError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(FetchError::Transient(format!("{} returned {}", method, status)));
        }
        if !status.is_success() {
            return Err(FetchError::Rejected(format!("{} returned {}", method, status)));
        }
        let text = response.text().map_err(transport_error)?;
        parse_response(&text)
    }
}

fn transport_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
        FetchError::Transient(error.to_string())
    } else {
        FetchError::Rejected(error.to_string())
    }
}

#[derive(Deserialize)]
struct Envelope {
    result: Option<Value>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

fn parse_response<T: DeserializeOwned>(text: &str) -> Result<T, FetchError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| FetchError::MalformedResponse(e.to_string()))?;
    if let Some(RpcErrorObject { code, message }) = envelope.error {
        let message = format!("RPC error {}: {}", code, message);
        return Err(if TRANSIENT_RPC_CODES.contains(&code) {
            FetchError::Transient(message)
        } else {
            FetchError::Rejected(message)
        });
    }
    let result = envelope
        .result
        .ok_or_else(|| FetchError::MalformedResponse("response has no result".to_string()))?;
    serde_json::from_value(result).map_err(|e| FetchError::MalformedResponse(e.to_string()))
}

#[derive(Deserialize)]
struct UiAccount {
    data: (String, String),
}

impl UiAccount {
    fn decode_data(self) -> Result<Vec<u8>, FetchError> {
        let (data, encoding) = self.data;
        if encoding != "base64" {
            return Err(FetchError::MalformedResponse(format!(
                "unexpected account encoding `{}`",
                encoding
            )));
        }
        base64::decode(data).map_err(|e| FetchError::MalformedResponse(e.to_string()))
    }
}

#[derive(Deserialize)]
struct KeyedAccount {
    pubkey: String,
    account: UiAccount,
}

impl TryFrom<KeyedAccount> for RawAccount {
    type Error = FetchError;

    fn try_from(keyed: KeyedAccount) -> Result<Self, Self::Error> {
        let address = Address::from_str(&keyed.pubkey)
            .map_err(|e| FetchError::MalformedResponse(e.to_string()))?;
        Ok(RawAccount {
            address,
            data: keyed.account.decode_data()?,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgramAccountsV2 {
    accounts: Vec<KeyedAccount>,
    pagination_key: Option<String>,
}

#[derive(Deserialize)]
struct WithContext<T> {
    value: T,
}

fn into_raw_accounts(accounts: Vec<KeyedAccount>) -> Result<Vec<RawAccount>, FetchError> {
    accounts.into_iter().map(RawAccount::try_from).collect()
}

fn program_accounts_params(request: &PageRequest) -> Value {
    let mut config = json!({ "encoding": "base64" });
    if let Some(data_size) = request.data_size {
        config["filters"] = json!([{ "dataSize": data_size }]);
    }
    if let Some(limit) = request.limit {
        config["limit"] = json!(limit);
        if let Some(cursor) = &request.cursor {
            config["paginationKey"] = json!(cursor);
        }
    }
    json!([request.program_id.to_string(), config])
}

impl ProgramAccountsRpc for JsonRpcClient {
    fn program_accounts_page(&self, request: &PageRequest) -> Result<AccountsPage, FetchError> {
        let params = program_accounts_params(request);
        if request.limit.is_none() {
            let accounts: Vec<KeyedAccount> = self.call("getProgramAccounts", params)?;
            return Ok(AccountsPage {
                accounts: into_raw_accounts(accounts)?,
                next_cursor: None,
            });
        }
        let page: ProgramAccountsV2 = self.call("getProgramAccountsV2", params)?;
        Ok(AccountsPage {
            accounts: into_raw_accounts(page.accounts)?,
            next_cursor: page.pagination_key,
        })
    }

    fn account(&self, address: &Address) -> Result<Option<Vec<u8>>, FetchError> {
        let response: WithContext<Option<UiAccount>> = self.call(
            "getAccountInfo",
            json!([address.to_string(), { "encoding": "base64" }]),
        )?;
        response.value.map(UiAccount::decode_data).transpose()
    }
}
