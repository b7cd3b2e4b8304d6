//! The banking service's HTTP contract and its reqwest client.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CallError, CallResult};

/// Service-side user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Service-side account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw response of a transfer call.
///
/// Any HTTP response is a `TransferResponse`, whatever its status; only a
/// missing response is an error.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferResponse {
    pub status: u16,
    pub body: String,
    pub elapsed: Duration,
}

impl TransferResponse {
    pub fn is_success(&self) -> bool {
        self.status == StatusCode::OK.as_u16()
    }
}

/// Calls the load test issues against the banking service.
#[async_trait]
pub trait BankApi: Send + Sync {
    /// `POST /users`, expects 201 with `{"id": ..}`.
    async fn create_user(&self, username: &str) -> CallResult<UserId>;

    /// `POST /accounts`, expects 201 with `{"id": ..}`.
    async fn create_account(&self, user_id: UserId) -> CallResult<AccountId>;

    /// `PATCH /accounts`, expects 200.
    async fn deposit(&self, account_id: AccountId, amount: i64) -> CallResult<()>;

    /// `POST /accounts/transfer`.
    async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: i64,
    ) -> CallResult<TransferResponse>;
}

#[derive(Deserialize)]
struct Created<T> {
    id: T,
}

/// HTTP implementation of [`BankApi`].
#[derive(Debug, Clone)]
pub struct HttpBankClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBankClient {
    /// Create a client for `base_url` with a per-request timeout and an idle
    /// pool sized for `pool_size` concurrent users.
    pub fn new(base_url: &str, timeout: Duration, pool_size: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(pool_size)
            .build()?;

        Ok(Self::with_client(client, base_url))
    }

    /// Wrap an existing reqwest client.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Read status and body, then decode `{"id": ..}` when the status matches.
    async fn expect_created<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> CallResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::CREATED {
            return Err(CallError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<Created<T>>(&body)
            .map(|created| created.id)
            .map_err(|e| CallError::Decode(e.to_string()))
    }
}

#[async_trait]
impl BankApi for HttpBankClient {
    async fn create_user(&self, username: &str) -> CallResult<UserId> {
        let response = self
            .client
            .post(self.url("/users"))
            .json(&json!({ "username": username }))
            .send()
            .await?;

        Self::expect_created(response).await
    }

    async fn create_account(&self, user_id: UserId) -> CallResult<AccountId> {
        let response = self
            .client
            .post(self.url("/accounts"))
            .json(&json!({ "user_id": user_id }))
            .send()
            .await?;

        Self::expect_created(response).await
    }

    async fn deposit(&self, account_id: AccountId, amount: i64) -> CallResult<()> {
        let response = self
            .client
            .patch(self.url("/accounts"))
            .json(&json!({ "account_id": account_id, "amount": amount }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }

        Err(CallError::UnexpectedStatus {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }

    async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: i64,
    ) -> CallResult<TransferResponse> {
        let start = Instant::now();

        let response = self
            .client
            .post(self.url("/accounts/transfer"))
            .json(&json!({
                "from_account_id": from,
                "to_account_id": to,
                "amount": amount,
            }))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(TransferResponse {
            status,
            body,
            elapsed: start.elapsed(),
        })
    }
}
