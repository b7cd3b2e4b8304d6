//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use bank_load_test::{AccountId, BankApi, CallError, CallResult, TransferResponse, UserId};

/// One call observed by [`ScriptedBank`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateUser(String),
    CreateAccount(UserId),
    Deposit(AccountId, i64),
    Transfer(AccountId, AccountId, i64),
}

pub fn bad_status(status: u16, body: &str) -> CallError {
    CallError::UnexpectedStatus {
        status,
        body: body.to_string(),
    }
}

pub fn transport(msg: &str) -> CallError {
    CallError::Transport(msg.to_string())
}

pub fn transfer_response(status: u16, body: &str, elapsed_ms: u64) -> TransferResponse {
    TransferResponse {
        status,
        body: body.to_string(),
        elapsed: Duration::from_millis(elapsed_ms),
    }
}

/// In-memory [`BankApi`] that replays scripted results and logs every call.
///
/// When a script queue runs dry the call succeeds: users get ids 1, 2, ..,
/// accounts get ids 10, 11, .., deposits return Ok and transfers return 200.
pub struct ScriptedBank {
    calls: Mutex<Vec<Call>>,
    users: Mutex<VecDeque<CallResult<UserId>>>,
    accounts: Mutex<VecDeque<CallResult<AccountId>>>,
    deposits: Mutex<VecDeque<CallResult<()>>>,
    transfers: Mutex<VecDeque<CallResult<TransferResponse>>>,
    next_user: AtomicI64,
    next_account: AtomicI64,
}

impl Default for ScriptedBank {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            users: Mutex::new(VecDeque::new()),
            accounts: Mutex::new(VecDeque::new()),
            deposits: Mutex::new(VecDeque::new()),
            transfers: Mutex::new(VecDeque::new()),
            next_user: AtomicI64::new(1),
            next_account: AtomicI64::new(10),
        }
    }
}

impl ScriptedBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(self, results: Vec<CallResult<UserId>>) -> Self {
        self.users.lock().unwrap().extend(results);
        self
    }

    pub fn with_accounts(self, results: Vec<CallResult<AccountId>>) -> Self {
        self.accounts.lock().unwrap().extend(results);
        self
    }

    pub fn with_deposits(self, results: Vec<CallResult<()>>) -> Self {
        self.deposits.lock().unwrap().extend(results);
        self
    }

    pub fn with_transfers(self, results: Vec<CallResult<TransferResponse>>) -> Self {
        self.transfers.lock().unwrap().extend(results);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    pub fn usernames(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::CreateUser(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    fn log(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Bank whose user creation always fails.
pub fn failing_users_bank() -> ScriptedBank {
    let bank = ScriptedBank::new();
    bank.users
        .lock()
        .unwrap()
        .extend((0..10_000).map(|_| Err(bad_status(500, "database unavailable"))));
    bank
}

/// Bank whose transfers never get a response.
pub fn unreachable_transfers_bank() -> ScriptedBank {
    let bank = ScriptedBank::new();
    bank.transfers
        .lock()
        .unwrap()
        .extend((0..10_000).map(|_| Err(transport("connection reset by peer"))));
    bank
}

#[async_trait]
impl BankApi for ScriptedBank {
    async fn create_user(&self, username: &str) -> CallResult<UserId> {
        self.log(Call::CreateUser(username.to_string()));
        let scripted = self.users.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(UserId(self.next_user.fetch_add(1, Ordering::SeqCst))))
    }

    async fn create_account(&self, user_id: UserId) -> CallResult<AccountId> {
        self.log(Call::CreateAccount(user_id));
        let scripted = self.accounts.lock().unwrap().pop_front();
        scripted
            .unwrap_or_else(|| Ok(AccountId(self.next_account.fetch_add(1, Ordering::SeqCst))))
    }

    async fn deposit(&self, account_id: AccountId, amount: i64) -> CallResult<()> {
        self.log(Call::Deposit(account_id, amount));
        let scripted = self.deposits.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(()))
    }

    async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: i64,
    ) -> CallResult<TransferResponse> {
        self.log(Call::Transfer(from, to, amount));
        let scripted = self.transfers.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(transfer_response(200, r#"{"status":"ok"}"#, 2)))
    }
}

/// A request received by the stub HTTP server.
#[derive(Debug, Clone)]
pub struct Received {
    pub method: &'static str,
    pub path: &'static str,
    pub body: Value,
}

/// Minimal in-memory banking service speaking the real HTTP contract.
#[derive(Default)]
pub struct StubBank {
    pub received: Mutex<Vec<Received>>,
    users: Mutex<HashMap<String, i64>>,
    balances: Mutex<HashMap<i64, i64>>,
    next_id: AtomicI64,
}

impl StubBank {
    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    pub fn balance(&self, account_id: i64) -> Option<i64> {
        self.balances.lock().unwrap().get(&account_id).copied()
    }

    fn record(&self, method: &'static str, path: &'static str, body: &Value) {
        self.received.lock().unwrap().push(Received {
            method,
            path,
            body: body.clone(),
        });
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

async fn stub_create_user(State(bank): State<Arc<StubBank>>, Json(body): Json<Value>) -> Response {
    bank.record("POST", "/users", &body);
    let Some(username) = body["username"].as_str() else {
        return (StatusCode::BAD_REQUEST, "Invalid request payload").into_response();
    };
    if username.starts_with("fail") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "cannot create user").into_response();
    }

    let mut users = bank.users.lock().unwrap();
    if users.contains_key(username) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "username already exists").into_response();
    }
    let id = bank.allocate_id();
    users.insert(username.to_string(), id);

    (StatusCode::CREATED, Json(json!({ "id": id, "username": username }))).into_response()
}

async fn stub_create_account(
    State(bank): State<Arc<StubBank>>,
    Json(body): Json<Value>,
) -> Response {
    bank.record("POST", "/accounts", &body);
    if body["user_id"].as_i64().is_none() {
        return (StatusCode::BAD_REQUEST, "Invalid request payload").into_response();
    }
    let id = bank.allocate_id();
    bank.balances.lock().unwrap().insert(id, 0);

    (
        StatusCode::CREATED,
        Json(json!({ "id": id, "user_id": body["user_id"], "balance": 0 })),
    )
        .into_response()
}

async fn stub_deposit(State(bank): State<Arc<StubBank>>, Json(body): Json<Value>) -> Response {
    bank.record("PATCH", "/accounts", &body);
    let (Some(account_id), Some(amount)) = (body["account_id"].as_i64(), body["amount"].as_i64())
    else {
        return (StatusCode::BAD_REQUEST, "Invalid request payload").into_response();
    };

    let mut balances = bank.balances.lock().unwrap();
    match balances.get_mut(&account_id) {
        Some(balance) => {
            *balance += amount;
            (StatusCode::OK, Json(json!({ "id": account_id, "balance": *balance }))).into_response()
        }
        None => (StatusCode::INTERNAL_SERVER_ERROR, "account not found").into_response(),
    }
}

async fn stub_transfer(State(bank): State<Arc<StubBank>>, Json(body): Json<Value>) -> Response {
    bank.record("POST", "/accounts/transfer", &body);
    let (Some(from), Some(to), Some(amount)) = (
        body["from_account_id"].as_i64(),
        body["to_account_id"].as_i64(),
        body["amount"].as_i64(),
    ) else {
        return (StatusCode::BAD_REQUEST, "Invalid request payload").into_response();
    };

    let mut balances = bank.balances.lock().unwrap();
    let available = balances.get(&from).copied().unwrap_or(0);
    if available < amount || !balances.contains_key(&to) {
        return (StatusCode::BAD_REQUEST, "insufficient funds").into_response();
    }
    *balances.entry(from).or_insert(0) -= amount;
    *balances.entry(to).or_insert(0) += amount;

    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

/// Start the stub service on an ephemeral port and return its base URL.
pub async fn spawn_stub_bank() -> (String, Arc<StubBank>) {
    let bank = Arc::new(StubBank::default());
    let app = Router::new()
        .route("/users", post(stub_create_user))
        .route("/accounts", post(stub_create_account).patch(stub_deposit))
        .route("/accounts/transfer", post(stub_transfer))
        .with_state(bank.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), bank)
}

/// A base URL nothing is listening on.
pub async fn unused_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
