use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use query_rewriter::{
    BackendError, BindVars, ColumnSchema, ColumnType, Execution, MemoryCatalog, QueryError,
    QueryResult, QueryRewriter, RewriterConfig, StatementExecutor, TableSchema, Value,
};

/// Generates one test running through `QueryRewriter::execute` and one
/// running through `prepare` + `execute_prepared`.
#[macro_export]
macro_rules! rewrite_test {
    ($name:ident, |$harness:ident| $body:expr) => {
        paste::paste! {
            #[tokio::test]
            async fn [<$name _direct>]() {
                let $harness = $crate::support::Harness::new($crate::support::Mode::Direct);
                $body.await
            }

            #[tokio::test]
            async fn [<$name _prepared>]() {
                let $harness = $crate::support::Harness::new($crate::support::Mode::Prepared);
                $body.await
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Direct,
    Prepared,
}

pub struct Harness {
    pub mode: Mode,
    pub rewriter: QueryRewriter,
    pub executor: RecordingExecutor,
}

impl Harness {
    pub fn new(mode: Mode) -> Self {
        Self::with_config(mode, RewriterConfig::default())
    }

    pub fn with_config(mode: Mode, config: RewriterConfig) -> Self {
        let rewriter =
            QueryRewriter::new(config, Arc::new(vtocc_catalog())).expect("rewriter config");
        Self {
            mode,
            rewriter,
            executor: RecordingExecutor::default(),
        }
    }

    pub async fn run(&self, sql: &str, binds: &BindVars) -> Result<Execution, QueryError> {
        match self.mode {
            Mode::Direct => self.rewriter.execute(sql, binds, &self.executor).await,
            Mode::Prepared => {
                let prepared = self.rewriter.prepare(sql)?;
                self.rewriter
                    .execute_prepared(&prepared, binds, &self.executor)
                    .await
            }
        }
    }

    pub async fn run_ok(&self, sql: &str) -> Execution {
        self.run(sql, &BindVars::new())
            .await
            .unwrap_or_else(|error| panic!("`{sql}` failed: {error}"))
    }

    pub fn statements(&self) -> Vec<String> {
        self.executor.calls()
    }
}

/// Records every statement and answers from a script of results.
/// Unscripted statements report one affected row.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<String>>,
    responses: Mutex<VecDeque<Result<QueryResult, BackendError>>>,
    reservations: Mutex<Vec<(String, u64)>>,
    next_auto_increment: Mutex<u64>,
}

impl RecordingExecutor {
    pub fn respond(&self, result: Result<QueryResult, BackendError>) {
        self.responses
            .lock()
            .expect("responses mutex poisoned")
            .push_back(result);
    }

    pub fn respond_rows(&self, rows: Vec<Vec<Value>>) {
        self.respond(Ok(QueryResult::with_rows(rows)));
    }

    pub fn set_next_auto_increment(&self, next: u64) {
        *self
            .next_auto_increment
            .lock()
            .expect("auto increment mutex poisoned") = next;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }

    pub fn reservations(&self) -> Vec<(String, u64)> {
        self.reservations
            .lock()
            .expect("reservations mutex poisoned")
            .clone()
    }
}

#[async_trait(?Send)]
impl StatementExecutor for RecordingExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryResult, BackendError> {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .push(sql.to_string());
        self.responses
            .lock()
            .expect("responses mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(QueryResult::affected(1)))
    }

    async fn reserve_auto_increment(&self, table: &str, count: u64) -> Result<u64, BackendError> {
        self.reservations
            .lock()
            .expect("reservations mutex poisoned")
            .push((table.to_string(), count));
        let mut next = self
            .next_auto_increment
            .lock()
            .expect("auto increment mutex poisoned");
        if *next == 0 {
            *next = 1;
        }
        let first = *next;
        *next += count;
        Ok(first)
    }
}

pub fn vtocc_catalog() -> MemoryCatalog {
    MemoryCatalog::new()
        .with_table(
            TableSchema::new(
                "vtocc_a",
                vec![
                    ColumnSchema::new("eid", ColumnType::signed(64)),
                    ColumnSchema::new("id", ColumnType::signed(32))
                        .with_default(Value::Integer(1)),
                    ColumnSchema::new("name", ColumnType::Text),
                    ColumnSchema::new("foo", ColumnType::Binary),
                ],
                &["eid", "id"],
            )
            .expect("vtocc_a schema"),
        )
        .with_table(
            TableSchema::new(
                "vtocc_c",
                vec![
                    ColumnSchema::new("eid", ColumnType::signed(64)),
                    ColumnSchema::new("name", ColumnType::Text),
                    ColumnSchema::new("foo", ColumnType::Binary),
                ],
                &["eid", "name"],
            )
            .expect("vtocc_c schema"),
        )
        .with_table(
            TableSchema::new(
                "vtocc_e",
                vec![
                    ColumnSchema::new("eid", ColumnType::signed(64)),
                    ColumnSchema::new("id", ColumnType::signed(32))
                        .with_default(Value::Integer(1)),
                    ColumnSchema::new("name", ColumnType::Binary)
                        .with_default(Value::Text("name".to_string())),
                    ColumnSchema::new("foo", ColumnType::Text),
                ],
                &["eid", "id", "name"],
            )
            .expect("vtocc_e schema")
            .with_auto_increment("eid")
            .expect("vtocc_e auto increment"),
        )
        .with_table(
            TableSchema::new(
                "vtocc_f",
                vec![
                    ColumnSchema::new("vb", ColumnType::Binary)
                        .with_default(Value::Text("ab".to_string())),
                    ColumnSchema::new("id", ColumnType::signed(32)),
                ],
                &["vb"],
            )
            .expect("vtocc_f schema"),
        )
        .with_table(
            TableSchema::new(
                "upsert_test",
                vec![
                    ColumnSchema::new("id1", ColumnType::signed(32)),
                    ColumnSchema::new("id2", ColumnType::signed(32)),
                ],
                &["id1"],
            )
            .expect("upsert_test schema"),
        )
}
