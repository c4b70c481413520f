//! A scripted in-process driver for unit tests.
//!
//! Expectations are consumed in the order they were declared; every driver
//! call is recorded, matched or not, so tests can assert on exactly what the
//! adapter sent.
//!
//! ```ignore
//! use easql::mock::MockDriver;
//! use easql::{Database, Queryer, Record, qb};
//!
//! let mock = MockDriver::new();
//! mock.expect_query("SELECT id FROM users")
//!     .with_args(["1"])
//!     .will_return_rows(vec![Record::new([("id", 1_i64)])]);
//!
//! let db = Database::new(mock.clone());
//! let mut id = 0_i64;
//! db.get(&mut id, &qb::select("users").select("id").eq("id", 1_i64)).await?;
//! mock.expectations_were_met()?;
//! ```

use crate::driver::{CallOptions, ExecResult, RawDatabase, RawQueryer, RawTransaction};
use crate::error::{DriverError, DriverResult};
use crate::row::{NameMapper, Record};
use crate::transaction::TransactionOptions;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tokio_postgres::types::ToSql;

/// Which driver entry point was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// `fetch_one` or `fetch_many`
    Query,
    /// `execute`
    Exec,
    Begin,
    Commit,
    Rollback,
    Ping,
    Close,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Query => "query",
            Self::Exec => "exec",
            Self::Begin => "begin",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
            Self::Ping => "ping",
            Self::Close => "close",
        };
        f.write_str(name)
    }
}

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub kind: CallKind,
    pub sql: String,
    /// Arguments rendered with `Debug`, e.g. `1` or `"leo"`.
    pub args: Vec<String>,
    /// Whether the call went through a transaction.
    pub in_tx: bool,
    pub deadline: Option<Instant>,
}

enum Outcome {
    Nothing,
    Rows(Vec<Record>),
    Result(ExecResult),
    Error(DriverError),
}

struct Expectation {
    kind: CallKind,
    sql: Option<String>,
    args: Option<Vec<String>>,
    outcome: Outcome,
}

impl Expectation {
    fn describe(&self) -> String {
        match &self.sql {
            Some(sql) => format!("{} matching '{}'", self.kind, sql),
            None => self.kind.to_string(),
        }
    }

    fn check(&self, call: &Call) -> Result<(), String> {
        if self.kind != call.kind {
            return Err(format!(
                "expected {}, got {} '{}'",
                self.describe(),
                call.kind,
                call.sql
            ));
        }
        if let Some(pattern) = &self.sql {
            if !call.sql.contains(pattern.as_str()) {
                return Err(format!(
                    "{} '{}' does not match '{}'",
                    call.kind, call.sql, pattern
                ));
            }
        }
        if let Some(args) = &self.args {
            if *args != call.args {
                return Err(format!(
                    "{} '{}' called with args {:?}, expected {:?}",
                    call.kind, call.sql, call.args, args
                ));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct MockState {
    expected: VecDeque<Expectation>,
    calls: Vec<Call>,
}

type Shared = Arc<Mutex<MockState>>;

fn lock(state: &Shared) -> MutexGuard<'_, MockState> {
    // a failed assertion in one test task must not hide the call log
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a declared expectation, used to refine it.
pub struct Expected {
    state: Shared,
    index: usize,
}

impl Expected {
    fn update(self, f: impl FnOnce(&mut Expectation)) -> Self {
        {
            let mut state = lock(&self.state);
            if let Some(expectation) = state.expected.get_mut(self.index) {
                f(expectation);
            }
        }
        self
    }

    /// Require these arguments, compared by their `Debug` rendering.
    pub fn with_args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args = args.into_iter().map(Into::into).collect();
        self.update(|e| e.args = Some(args))
    }

    /// Rows handed back by a query expectation.
    pub fn will_return_rows(self, rows: Vec<Record>) -> Self {
        self.update(|e| e.outcome = Outcome::Rows(rows))
    }

    /// Summary handed back by an exec expectation.
    pub fn will_return_result(self, result: ExecResult) -> Self {
        self.update(|e| e.outcome = Outcome::Result(result))
    }

    /// Fail the matching call with `error`.
    pub fn will_return_error(self, error: DriverError) -> Self {
        self.update(|e| e.outcome = Outcome::Error(error))
    }
}

/// Scripted pool-level driver. Clones share expectations and the call log.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Shared,
    mapper: NameMapper,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapper(mut self, mapper: NameMapper) -> Self {
        self.mapper = mapper;
        self
    }

    fn expect(&self, kind: CallKind, sql: Option<&str>) -> Expected {
        let mut state = lock(&self.state);
        state.expected.push_back(Expectation {
            kind,
            sql: sql.map(str::to_string),
            args: None,
            outcome: Outcome::Nothing,
        });
        Expected {
            state: Arc::clone(&self.state),
            index: state.expected.len() - 1,
        }
    }

    /// Expect a row fetch whose SQL contains `sql`.
    pub fn expect_query(&self, sql: &str) -> Expected {
        self.expect(CallKind::Query, Some(sql))
    }

    /// Expect a statement execution whose SQL contains `sql`.
    pub fn expect_exec(&self, sql: &str) -> Expected {
        self.expect(CallKind::Exec, Some(sql))
    }

    pub fn expect_begin(&self) -> Expected {
        self.expect(CallKind::Begin, None)
    }

    pub fn expect_commit(&self) -> Expected {
        self.expect(CallKind::Commit, None)
    }

    pub fn expect_rollback(&self) -> Expected {
        self.expect(CallKind::Rollback, None)
    }

    pub fn expect_ping(&self) -> Expected {
        self.expect(CallKind::Ping, None)
    }

    pub fn expect_close(&self) -> Expected {
        self.expect(CallKind::Close, None)
    }

    /// Fails with the list of expectations that were never consumed.
    pub fn expectations_were_met(&self) -> DriverResult<()> {
        let state = lock(&self.state);
        if state.expected.is_empty() {
            return Ok(());
        }
        let pending: Vec<String> = state.expected.iter().map(Expectation::describe).collect();
        Err(DriverError::Mock(format!(
            "there are remaining expectations: {}",
            pending.join(", ")
        )))
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.state).calls.clone()
    }
}

impl fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("MockDriver")
            .field("pending", &state.expected.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

/// Record `call` and consume the next expectation if it matches.
///
/// A mismatched expectation stays queued so `expectations_were_met` still
/// reports it.
fn dispatch(state: &Shared, call: Call) -> DriverResult<Outcome> {
    let mut state = lock(state);
    state.calls.push(call.clone());

    let Some(next) = state.expected.pop_front() else {
        return Err(DriverError::Mock(format!(
            "unexpected {} call '{}': no expectations left",
            call.kind, call.sql
        )));
    };
    if let Err(message) = next.check(&call) {
        state.expected.push_front(next);
        return Err(DriverError::Mock(message));
    }
    match next.outcome {
        Outcome::Error(e) => Err(e),
        outcome => Ok(outcome),
    }
}

fn new_call(
    kind: CallKind,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
    in_tx: bool,
    opts: &CallOptions,
) -> Call {
    Call {
        kind,
        sql: sql.to_string(),
        args: params.iter().map(|p| format!("{p:?}")).collect(),
        in_tx,
        deadline: opts.deadline,
    }
}

fn into_rows(outcome: Outcome) -> DriverResult<Vec<Record>> {
    match outcome {
        Outcome::Nothing => Ok(Vec::new()),
        Outcome::Rows(rows) => Ok(rows),
        Outcome::Result(_) => Err(DriverError::Mock(
            "query expectation was scripted with an exec result".to_string(),
        )),
        Outcome::Error(e) => Err(e),
    }
}

fn into_exec_result(outcome: Outcome) -> DriverResult<ExecResult> {
    match outcome {
        Outcome::Nothing => Ok(ExecResult::default()),
        Outcome::Result(result) => Ok(result),
        Outcome::Rows(_) => Err(DriverError::Mock(
            "exec expectation was scripted with rows".to_string(),
        )),
        Outcome::Error(e) => Err(e),
    }
}

async fn fetch_one(
    state: &Shared,
    in_tx: bool,
    opts: &CallOptions,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> DriverResult<Record> {
    let outcome = dispatch(state, new_call(CallKind::Query, sql, params, in_tx, opts))?;
    into_rows(outcome)?
        .into_iter()
        .next()
        .ok_or(DriverError::NoRows)
}

async fn fetch_many(
    state: &Shared,
    in_tx: bool,
    opts: &CallOptions,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> DriverResult<Vec<Record>> {
    into_rows(dispatch(
        state,
        new_call(CallKind::Query, sql, params, in_tx, opts),
    )?)
}

async fn execute(
    state: &Shared,
    in_tx: bool,
    opts: &CallOptions,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> DriverResult<ExecResult> {
    into_exec_result(dispatch(
        state,
        new_call(CallKind::Exec, sql, params, in_tx, opts),
    )?)
}

fn control(state: &Shared, kind: CallKind, sql: &str, in_tx: bool, opts: &CallOptions) -> DriverResult<()> {
    dispatch(state, new_call(kind, sql, &[], in_tx, opts)).map(|_| ())
}

impl RawQueryer for MockDriver {
    fn mapper(&self) -> &NameMapper {
        &self.mapper
    }

    async fn fetch_one(
        &self,
        opts: &CallOptions,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> DriverResult<Record> {
        fetch_one(&self.state, false, opts, sql, params).await
    }

    async fn fetch_many(
        &self,
        opts: &CallOptions,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> DriverResult<Vec<Record>> {
        fetch_many(&self.state, false, opts, sql, params).await
    }

    async fn execute(
        &self,
        opts: &CallOptions,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> DriverResult<ExecResult> {
        execute(&self.state, false, opts, sql, params).await
    }
}

impl RawDatabase for MockDriver {
    type Tx = MockTx;

    async fn begin(&self, tx_opts: &TransactionOptions, opts: &CallOptions) -> DriverResult<MockTx> {
        control(&self.state, CallKind::Begin, &tx_opts.begin_sql(), false, opts)?;
        Ok(MockTx {
            state: Arc::clone(&self.state),
            mapper: self.mapper.clone(),
        })
    }

    async fn ping(&self, opts: &CallOptions) -> DriverResult<()> {
        control(&self.state, CallKind::Ping, "SELECT 1", false, opts)
    }

    fn close(&self) -> DriverResult<()> {
        control(&self.state, CallKind::Close, "", false, &CallOptions::default())
    }
}

/// Transaction handed out by [`MockDriver::begin`](RawDatabase::begin).
pub struct MockTx {
    state: Shared,
    mapper: NameMapper,
}

impl fmt::Debug for MockTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTx").finish_non_exhaustive()
    }
}

impl RawQueryer for MockTx {
    fn mapper(&self) -> &NameMapper {
        &self.mapper
    }

    async fn fetch_one(
        &self,
        opts: &CallOptions,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> DriverResult<Record> {
        fetch_one(&self.state, true, opts, sql, params).await
    }

    async fn fetch_many(
        &self,
        opts: &CallOptions,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> DriverResult<Vec<Record>> {
        fetch_many(&self.state, true, opts, sql, params).await
    }

    async fn execute(
        &self,
        opts: &CallOptions,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> DriverResult<ExecResult> {
        execute(&self.state, true, opts, sql, params).await
    }
}

impl RawTransaction for MockTx {
    async fn commit(self, opts: &CallOptions) -> DriverResult<()> {
        control(&self.state, CallKind::Commit, "COMMIT", true, opts)
    }

    async fn rollback(self, opts: &CallOptions) -> DriverResult<()> {
        control(&self.state, CallKind::Rollback, "ROLLBACK", true, opts)
    }
}
