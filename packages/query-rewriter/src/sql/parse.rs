use sqlparser::ast::{
    Delete, Expr, FromTable, Insert, LimitClause, ObjectName, OrderByExpr, OrderByKind, Query,
    Statement, TableFactor, TableObject, TableWithJoins, Update,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer, Whitespace};

use crate::errors;
use crate::sql::ast_utils::{
    column_name_from_display, literal_free_shape, object_name_last, referenced_tables,
};
use crate::sql::params::{canonicalize_placeholders, PlaceholderState};
use crate::RewriteError;

/// Row lock requested by a trailing select clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    ForUpdate,
    ShareMode,
}

impl LockMode {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::ForUpdate => "FOR UPDATE",
            Self::ShareMode => "LOCK IN SHARE MODE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedStatement {
    pub sql: String,
    /// Leading `/* ... */` comments, verbatim.
    pub comments: Vec<String>,
    /// The statement with positional markers renamed to `:vN`.
    pub statement: Statement,
    pub body: StatementBody,
    /// Literal-free rendering used for plan signatures.
    pub shape: String,
    /// Lowercased unqualified names of every referenced table.
    pub tables: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum StatementBody {
    Select(SelectBody),
    Insert(InsertBody),
    Update(UpdateBody),
    Delete(DeleteBody),
    Passthrough,
}

#[derive(Debug, Clone)]
pub struct SelectBody {
    pub query: Box<Query>,
    pub lock: Option<LockMode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertBody {
    pub insert: Insert,
    pub table: String,
    /// Explicit column list, unqualified; empty means schema order.
    pub columns: Vec<String>,
}

/// Target of a single-table UPDATE or DELETE.
#[derive(Debug, Clone)]
pub struct DmlTable {
    pub name: String,
    pub alias: Option<String>,
    /// The relation as written, alias included.
    pub relation: String,
}

impl DmlTable {
    /// Whether a column qualifier refers to this table.
    pub(crate) fn owns_qualifier(&self, qualifier: Option<&str>) -> bool {
        match qualifier {
            None => true,
            Some(qualifier) => {
                qualifier.eq_ignore_ascii_case(&self.name)
                    || self
                        .alias
                        .as_deref()
                        .is_some_and(|alias| qualifier.eq_ignore_ascii_case(alias))
            }
        }
    }
}

/// Row-selecting clauses lifted out of an UPDATE or DELETE.
#[derive(Debug, Clone, Default)]
pub struct DmlFilter {
    pub selection: Option<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<Expr>,
}

/// `update` has its selection and limit removed; they live in `filter`.
#[derive(Debug, Clone)]
pub struct UpdateBody {
    pub update: Update,
    pub table: DmlTable,
    pub filter: DmlFilter,
}

/// `delete` has its selection, order and limit removed; they live in `filter`.
#[derive(Debug, Clone)]
pub struct DeleteBody {
    pub delete: Delete,
    pub table: DmlTable,
    pub filter: DmlFilter,
}

pub fn parse_statement(sql: &str) -> Result<ParsedStatement, RewriteError> {
    parse_statement_inner(sql).map_err(|error| error.with_sql(sql))
}

fn parse_statement_inner(sql: &str) -> Result<ParsedStatement, RewriteError> {
    let dialect = MySqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize_with_location()
        .map_err(|error| errors::parse_mismatch(error.to_string()))?;
    let lines = LineIndex::new(sql);
    let comments = leading_comments(&tokens);

    let mut significant = tokens
        .iter()
        .filter(|token| !matches!(token.token, Token::Whitespace(_) | Token::EOF))
        .collect::<Vec<_>>();
    let mut end = sql.len();
    while let Some(last) = significant.last() {
        if last.token != Token::SemiColon {
            break;
        }
        end = lines.offset(last.span.start);
        significant.pop();
    }
    let Some(first) = significant.first() else {
        return Err(errors::parse_mismatch("empty statement"));
    };

    let mut lock = None;
    if is_word(first, "select") || is_word(first, "with") || first.token == Token::LParen {
        if let Some((mode, start)) = trailing_lock(&significant) {
            lock = Some(mode);
            end = lines.offset(start);
        }
    }

    let mut tail = None;
    if is_word(first, "update") {
        if let Some(start) = update_tail_start(&significant) {
            let offset = lines.offset(start);
            tail = Some(&sql[offset..end]);
            end = offset;
        }
    }

    let head = &sql[..end];
    let mut statements = Parser::parse_sql(&dialect, head)
        .map_err(|error| errors::parse_mismatch(error.to_string()))?;
    if statements.len() != 1 {
        return Err(errors::parse_mismatch(format!(
            "expected a single statement, found {}",
            statements.len()
        )));
    }
    let mut statement = statements.remove(0);
    let mut placeholders = PlaceholderState::default();
    canonicalize_placeholders(&mut statement, &mut placeholders)?;

    let mut shape = literal_free_shape(&statement);
    let mut tail_filter = DmlFilter::default();
    if let Some(tail) = tail {
        let mut tail_query = parse_tail_query(&dialect, tail)?;
        canonicalize_placeholders(&mut tail_query, &mut placeholders)?;
        shape.push(' ');
        shape.push_str(&literal_free_shape(&Statement::Query(Box::new(tail_query.clone()))));
        tail_filter = order_and_limit(tail_query)?;
    }

    let mut tables = referenced_tables(&statement);
    let body = match statement.clone() {
        Statement::Query(query) => StatementBody::Select(SelectBody { query, lock }),
        Statement::Insert(insert) => StatementBody::Insert(insert_body(insert)?),
        Statement::Update(mut update) => {
            if update.from.is_some() {
                return Err(errors::parse_mismatch("multi-table UPDATE is not supported"));
            }
            let table = dml_table(std::slice::from_ref(&update.table))?;
            let filter = DmlFilter {
                selection: update.selection.take(),
                order_by: tail_filter.order_by,
                limit: update.limit.take().or(tail_filter.limit),
            };
            StatementBody::Update(UpdateBody {
                update,
                table,
                filter,
            })
        }
        Statement::Delete(mut delete) => {
            if !delete.tables.is_empty() || delete.using.is_some() {
                return Err(errors::parse_mismatch("multi-table DELETE is not supported"));
            }
            let from = match &delete.from {
                FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
            };
            let table = dml_table(from)?;
            let filter = DmlFilter {
                selection: delete.selection.take(),
                order_by: std::mem::take(&mut delete.order_by),
                limit: delete.limit.take(),
            };
            StatementBody::Delete(DeleteBody {
                delete,
                table,
                filter,
            })
        }
        _ => StatementBody::Passthrough,
    };

    let target = match &body {
        StatementBody::Insert(body) => Some(&body.table),
        StatementBody::Update(body) => Some(&body.table.name),
        StatementBody::Delete(body) => Some(&body.table.name),
        _ => None,
    };
    if let Some(target) = target {
        let target = target.to_ascii_lowercase();
        if !tables.contains(&target) {
            tables.push(target);
            tables.sort();
        }
    }

    Ok(ParsedStatement {
        sql: sql.to_string(),
        comments,
        statement,
        body,
        shape,
        tables,
    })
}

fn insert_body(insert: Insert) -> Result<InsertBody, RewriteError> {
    let TableObject::TableName(name) = &insert.table else {
        return Err(errors::parse_mismatch("INSERT target must be a table"));
    };
    let table = table_name(name)?;
    let columns = insert
        .columns
        .iter()
        .map(|column| column_name_from_display(&column.to_string()))
        .collect();
    Ok(InsertBody {
        insert,
        table,
        columns,
    })
}

fn dml_table(tables: &[TableWithJoins]) -> Result<DmlTable, RewriteError> {
    let [table] = tables else {
        return Err(errors::parse_mismatch("expected exactly one target table"));
    };
    if !table.joins.is_empty() {
        return Err(errors::parse_mismatch("joined DML targets are not supported"));
    }
    let TableFactor::Table { name, alias, .. } = &table.relation else {
        return Err(errors::parse_mismatch("DML target must be a table"));
    };
    Ok(DmlTable {
        name: table_name(name)?,
        alias: alias.as_ref().map(|alias| alias.name.value.clone()),
        relation: table.relation.to_string(),
    })
}

fn table_name(name: &ObjectName) -> Result<String, RewriteError> {
    object_name_last(name)
        .ok_or_else(|| errors::parse_mismatch(format!("invalid table name `{name}`")))
}

fn parse_tail_query(dialect: &MySqlDialect, tail: &str) -> Result<Query, RewriteError> {
    let probe = format!("SELECT 1 {tail}");
    let mut statements = Parser::parse_sql(dialect, &probe)
        .map_err(|error| errors::parse_mismatch(error.to_string()).with_clause(tail))?;
    match (statements.len(), statements.pop()) {
        (1, Some(Statement::Query(query))) => Ok(*query),
        _ => Err(
            errors::parse_mismatch("invalid UPDATE ORDER BY / LIMIT clause").with_clause(tail),
        ),
    }
}

fn order_and_limit(query: Query) -> Result<DmlFilter, RewriteError> {
    let order_by = match query.order_by {
        None => Vec::new(),
        Some(order_by) => match order_by.kind {
            OrderByKind::Expressions(exprs) => exprs,
            OrderByKind::All(_) => {
                return Err(errors::parse_mismatch("ORDER BY ALL is not supported in UPDATE"))
            }
        },
    };
    let limit = match query.limit_clause {
        None => None,
        Some(LimitClause::LimitOffset {
            limit,
            offset: None,
            limit_by,
        }) if limit_by.is_empty() => limit,
        Some(_) => return Err(errors::parse_mismatch("UPDATE accepts only LIMIT <count>")),
    };
    Ok(DmlFilter {
        selection: None,
        order_by,
        limit,
    })
}

fn leading_comments(tokens: &[TokenWithSpan]) -> Vec<String> {
    let mut comments = Vec::new();
    let mut seen_significant = 0;
    for token in tokens {
        match &token.token {
            Token::Whitespace(Whitespace::MultiLineComment(text)) => {
                comments.push(format!("/*{text}*/"));
            }
            Token::Whitespace(_) => {}
            _ => {
                seen_significant += 1;
                if seen_significant == 2 {
                    break;
                }
            }
        }
    }
    comments
}

fn is_word(token: &TokenWithSpan, word: &str) -> bool {
    match &token.token {
        Token::Word(w) => w.quote_style.is_none() && w.value.eq_ignore_ascii_case(word),
        _ => false,
    }
}

fn ends_with_words(tokens: &[&TokenWithSpan], words: &[&str]) -> Option<Location> {
    if tokens.len() <= words.len() {
        return None;
    }
    let start = tokens.len() - words.len();
    let matches = tokens[start..]
        .iter()
        .zip(words)
        .all(|(token, word)| is_word(token, word));
    matches.then(|| tokens[start].span.start)
}

fn trailing_lock(tokens: &[&TokenWithSpan]) -> Option<(LockMode, Location)> {
    if let Some(start) = ends_with_words(tokens, &["for", "update"]) {
        return Some((LockMode::ForUpdate, start));
    }
    ends_with_words(tokens, &["lock", "in", "share", "mode"])
        .map(|start| (LockMode::ShareMode, start))
}

/// Start of a top-level `ORDER BY` or `LIMIT` in an UPDATE.
fn update_tail_start(tokens: &[&TokenWithSpan]) -> Option<Location> {
    let mut depth = 0i32;
    for (index, token) in tokens.iter().enumerate() {
        match token.token {
            Token::LParen => depth += 1,
            Token::RParen => depth -= 1,
            _ if depth != 0 => {}
            _ if is_word(token, "limit") => return Some(token.span.start),
            _ if is_word(token, "order")
                && tokens.get(index + 1).is_some_and(|next| is_word(next, "by")) =>
            {
                return Some(token.span.start)
            }
            _ => {}
        }
    }
    None
}

/// Maps tokenizer line/column locations back to byte offsets.
struct LineIndex<'a> {
    sql: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(sql: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(sql.match_indices('\n').map(|(index, _)| index + 1));
        Self { sql, line_starts }
    }

    fn offset(&self, location: Location) -> usize {
        let line = (location.line as usize).saturating_sub(1);
        let Some(&start) = self.line_starts.get(line) else {
            return self.sql.len();
        };
        let column = (location.column as usize).saturating_sub(1);
        self.sql[start..]
            .char_indices()
            .nth(column)
            .map(|(index, _)| start + index)
            .unwrap_or(self.sql.len())
    }
}
