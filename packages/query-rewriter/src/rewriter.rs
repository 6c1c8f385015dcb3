use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::StatementExecutor;
use crate::config::RewriterConfig;
use crate::errors;
use crate::plan::{PlanSignature, RewritePlan};
use crate::schema::{SchemaCatalog, TableSchema};
use crate::sql::ast_utils::with_comments;
use crate::sql::classify::{classify, lookup, InsertKind, StatementClass};
use crate::sql::insert::{
    auto_increment_demand, build_insert, check_insert_binds, materialize_source, source_query,
};
use crate::sql::params::{bind_node, BindVars};
use crate::sql::parse::{parse_statement, InsertBody, ParsedStatement, StatementBody};
use crate::sql::pk_resolver::{plan_dml, DmlStep};
use crate::sql::select::plan_select;
use crate::sql::upsert::{plan_upsert, validate_upsert};
use crate::stats::StatsRecorder;
use crate::{QueryError, QueryResult, RewriteError};

/// A statement parsed and classified once, reusable across bind sets.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub parsed: ParsedStatement,
    pub class: StatementClass,
    pub signature: PlanSignature,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub plan: RewritePlan,
    pub result: QueryResult,
}

pub struct QueryRewriter {
    config: RewriterConfig,
    catalog: Arc<dyn SchemaCatalog>,
    stats: Arc<StatsRecorder>,
}

impl QueryRewriter {
    pub fn new(
        config: RewriterConfig,
        catalog: Arc<dyn SchemaCatalog>,
    ) -> Result<Self, RewriteError> {
        config.validate()?;
        Ok(Self {
            config,
            catalog,
            stats: Arc::new(StatsRecorder::new()),
        })
    }

    /// Shares one recorder between several rewriters.
    pub fn with_stats(mut self, stats: Arc<StatsRecorder>) -> Self {
        self.stats = stats;
        self
    }

    pub fn config(&self) -> &RewriterConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<StatsRecorder> {
        &self.stats
    }

    pub fn prepare(&self, sql: &str) -> Result<PreparedStatement, RewriteError> {
        let parsed = parse_statement(sql)?;
        let class = classify(&parsed, self.catalog.as_ref(), &self.config)?;
        let signature = PlanSignature::new(class.plan_kind(), parsed.tables.clone(), &parsed.shape);
        debug!(kind = %signature.kind, signature = %signature, "classified statement");
        Ok(PreparedStatement {
            parsed,
            class,
            signature,
        })
    }

    pub async fn execute(
        &self,
        sql: &str,
        binds: &BindVars,
        executor: &dyn StatementExecutor,
    ) -> Result<Execution, QueryError> {
        let prepared = self.prepare(sql)?;
        self.execute_prepared(&prepared, binds, executor).await
    }

    pub async fn execute_prepared(
        &self,
        prepared: &PreparedStatement,
        binds: &BindVars,
        executor: &dyn StatementExecutor,
    ) -> Result<Execution, QueryError> {
        let parsed = &prepared.parsed;
        let with_sql = |error: RewriteError| error.with_sql(&parsed.sql);
        let mut run = PlanRun {
            prepared,
            executor,
            stats: &self.stats,
            statements: Vec::new(),
        };

        match (&prepared.class, &parsed.body) {
            (StatementClass::Select, StatementBody::Select(body)) => {
                let plan = plan_select(body, &parsed.comments, binds, &self.config)
                    .map_err(with_sql)?;
                let result = run.run(plan.full_query).await?;
                if result.rows.len() as u64 > self.config.row_cap {
                    warn!(
                        signature = %prepared.signature,
                        rows = result.rows.len(),
                        "select exceeded row cap"
                    );
                    return Err(errors::row_cap_exceeded("SELECT", self.config.row_cap)
                        .with_sql(&parsed.sql)
                        .into());
                }
                Ok(run.finish(Some(plan.field_query), None, result))
            }
            (StatementClass::Insert(kind), StatementBody::Insert(body)) => {
                let table = lookup(self.catalog.as_ref(), &body.table).map_err(with_sql)?;
                match kind {
                    InsertKind::Subquery => {
                        let source = source_query(body, binds, &self.config).map_err(with_sql)?;
                        let rows = run.run(source).await?.rows;
                        let Some(materialized) =
                            materialize_source(body, table, rows, &self.config).map_err(with_sql)?
                        else {
                            debug!(table = %table.name, "insert source returned no rows");
                            return Ok(run.finish(None, Some(0), QueryResult::affected(0)));
                        };
                        let result = self.run_insert(&mut run, &materialized, table, binds).await?;
                        Ok(run.finish(None, None, result))
                    }
                    InsertKind::Simple | InsertKind::MultiRow => {
                        let result = self.run_insert(&mut run, body, table, binds).await?;
                        Ok(run.finish(None, None, result))
                    }
                    InsertKind::Upsert => {
                        validate_upsert(body, table, binds).map_err(with_sql)?;
                        let first_id = reserve_ids(body, table, binds, executor)
                            .await
                            .map_err(|error| match error {
                                QueryError::Rewrite(error) => QueryError::Rewrite(with_sql(error)),
                                other => other,
                            })?;
                        let upsert =
                            plan_upsert(parsed, body, table, binds, first_id).map_err(with_sql)?;
                        match run.run(upsert.insert.sql).await {
                            Ok(result) => Ok(run.finish(None, None, result)),
                            Err(QueryError::Backend(error)) if error.is_duplicate_key() => {
                                warn!(
                                    table = %table.name,
                                    error = %error,
                                    "upsert hit duplicate key; applying update"
                                );
                                let result = run.run(upsert.update.sql).await?;
                                Ok(run.finish(None, Some(2), result))
                            }
                            Err(error) => Err(error),
                        }
                    }
                }
            }
            (
                StatementClass::Dml { qualification, .. },
                StatementBody::Update(_) | StatementBody::Delete(_),
            ) => {
                let table_name = match &parsed.body {
                    StatementBody::Update(body) => &body.table.name,
                    StatementBody::Delete(body) => &body.table.name,
                    _ => return Err(with_sql(errors::parse_mismatch("expected DML")).into()),
                };
                let table = lookup(self.catalog.as_ref(), table_name).map_err(with_sql)?;
                match plan_dml(parsed, table, qualification, binds, &self.config)
                    .map_err(with_sql)?
                {
                    DmlStep::Ready(rewrite) => {
                        let result = run.run(rewrite.sql).await?;
                        Ok(run.finish(None, None, result))
                    }
                    DmlStep::NoRows => {
                        debug!(table = %table.name, "primary key filter matches no rows");
                        Ok(run.finish(None, Some(0), QueryResult::affected(0)))
                    }
                    DmlStep::Probe(probe) => {
                        debug!(table = %table.name, "filter is not primary-key qualified; probing");
                        let rows = run.run(probe.sql.clone()).await?.rows;
                        match probe.resolve(rows)? {
                            Some(rewrite) => {
                                let result = run.run(rewrite.sql).await?;
                                Ok(run.finish(None, None, result))
                            }
                            None => Ok(run.finish(None, Some(0), QueryResult::affected(0))),
                        }
                    }
                }
            }
            (StatementClass::Passthrough, StatementBody::Passthrough) => {
                let mut statement = parsed.statement.clone();
                bind_node(&mut statement, binds).map_err(with_sql)?;
                let result = run
                    .run(with_comments(statement.to_string(), &parsed.comments))
                    .await?;
                Ok(run.finish(None, None, result))
            }
            _ => Err(with_sql(errors::parse_mismatch(
                "statement class does not match its parsed form",
            ))
            .into()),
        }
    }

    async fn run_insert(
        &self,
        run: &mut PlanRun<'_>,
        body: &InsertBody,
        table: &TableSchema,
        binds: &BindVars,
    ) -> Result<QueryResult, QueryError> {
        let prepared = run.prepared;
        let sql = &prepared.parsed.sql;
        let first_id = reserve_ids(body, table, binds, run.executor)
            .await
            .map_err(|error| match error {
                QueryError::Rewrite(error) => QueryError::Rewrite(error.with_sql(sql)),
                other => other,
            })?;
        let rewrite = build_insert(&prepared.parsed, body, table, binds, first_id)
            .map_err(|error| error.with_sql(sql))?;
        run.run(rewrite.sql).await
    }
}

async fn reserve_ids(
    body: &InsertBody,
    table: &TableSchema,
    binds: &BindVars,
    executor: &dyn StatementExecutor,
) -> Result<Option<u64>, QueryError> {
    check_insert_binds(body, binds)?;
    let demand = auto_increment_demand(body, table, binds)?;
    if demand == 0 {
        return Ok(None);
    }
    let first = executor.reserve_auto_increment(&table.name, demand).await?;
    debug!(table = %table.name, first, count = demand, "reserved auto-increment ids");
    Ok(Some(first))
}

/// Statements issued for one execution, in order.
struct PlanRun<'a> {
    prepared: &'a PreparedStatement,
    executor: &'a dyn StatementExecutor,
    stats: &'a StatsRecorder,
    statements: Vec<String>,
}

impl PlanRun<'_> {
    async fn run(&mut self, sql: String) -> Result<QueryResult, QueryError> {
        debug!(sql = %sql, "executing rewritten statement");
        self.statements.push(sql);
        let sql = self.statements.last().map(String::as_str).unwrap_or_default();
        let result = self.executor.execute(sql).await?;
        if let Some(outcome) = result.cache {
            self.stats
                .record(outcome, &self.prepared.parsed.tables, &self.prepared.signature);
        }
        Ok(result)
    }

    fn finish(
        self,
        field_query: Option<String>,
        rows_affected: Option<u64>,
        mut result: QueryResult,
    ) -> Execution {
        if let Some(rows_affected) = rows_affected {
            result.rows_affected = rows_affected;
        }
        Execution {
            plan: RewritePlan {
                kind: self.prepared.signature.kind,
                signature: self.prepared.signature.clone(),
                field_query,
                statements: self.statements,
                rows_affected,
            },
            result,
        }
    }
}
