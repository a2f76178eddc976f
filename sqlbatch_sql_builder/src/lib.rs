#![forbid(unsafe_code)]
//! Parameterized SQL synthesis for bulk writes.
//!
//! Every statement is assembled through [`SqlWriter`]: identifiers go through
//! [`quote_ident`], values through [`SqlWriter::push_param`]. Caller-provided text is
//! never spliced into SQL verbatim.
//!
//! Placeholder style follows the executor's [`Dialect`]:
//! - `Postgres`: $1, $2, ...
//! - `Generic`: ?

use sqlbatch_core::{DbError, DbResult, Dialect, KeySpec, Record, SqlValue, Statement};

/// Longest identifier accepted by [`quote_ident`].
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Alias of the target table inside MERGE statements.
pub const TARGET_ALIAS: &str = "target";
/// Alias of the VALUES source inside MERGE statements.
pub const SOURCE_ALIAS: &str = "source";

/// Placeholder representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Dollar,   // $1, $2, ...
    Question, // ?
}

pub fn placeholder_style(dialect: Dialect) -> Placeholder {
    match dialect {
        Dialect::Postgres => Placeholder::Dollar,
        Dialect::Generic => Placeholder::Question,
    }
}

fn placeholder_n(ph: Placeholder, n: usize) -> String {
    match ph {
        Placeholder::Dollar => format!("${}", n),
        Placeholder::Question => "?".to_string(),
    }
}

/// Validate and double-quote a single identifier (`a"b` becomes `"a""b"`).
pub fn quote_ident(ident: &str) -> DbResult<String> {
    let invalid = |reason: &'static str| DbError::InvalidIdentifier {
        ident: ident.to_string(),
        reason,
    };
    if ident.is_empty() {
        return Err(invalid("identifier is empty"));
    }
    if ident.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(invalid("identifier is too long"));
    }
    if ident.chars().any(char::is_control) {
        return Err(invalid("identifier contains control characters"));
    }
    Ok(format!("\"{}\"", ident.replace('"', "\"\"")))
}

/// Quote a possibly schema-qualified table name (`schema.table`), part by part.
/// At most three parts are accepted (`catalog.schema.table`).
pub fn quote_table(table: &str) -> DbResult<String> {
    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() > 3 {
        return Err(DbError::InvalidIdentifier {
            ident: table.to_string(),
            reason: "too many qualifiers",
        });
    }
    let quoted = parts
        .into_iter()
        .map(quote_ident)
        .collect::<DbResult<Vec<_>>>()?;
    Ok(quoted.join("."))
}

/// Incremental builder for one parameterized statement.
#[derive(Debug)]
pub struct SqlWriter {
    style: Placeholder,
    dialect: Dialect,
    sql: String,
    params: Vec<SqlValue>,
}

impl SqlWriter {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            style: placeholder_style(dialect),
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Append trusted SQL text (keywords, punctuation).
    pub fn push_sql(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    pub fn push_ident(&mut self, ident: &str) -> DbResult<()> {
        let q = quote_ident(ident)?;
        self.sql.push_str(&q);
        Ok(())
    }

    /// Append `"qualifier"."column"`.
    pub fn push_qualified(&mut self, qualifier: &str, column: &str) -> DbResult<()> {
        self.push_ident(qualifier)?;
        self.sql.push('.');
        self.push_ident(column)
    }

    /// Append a comma-separated list of quoted identifiers.
    pub fn push_ident_list<S: AsRef<str>>(&mut self, idents: &[S]) -> DbResult<()> {
        for (i, ident) in idents.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.push_ident(ident.as_ref())?;
        }
        Ok(())
    }

    /// Bind `value` and append its placeholder.
    pub fn push_param(&mut self, value: SqlValue) {
        self.params.push(value);
        let ph = placeholder_n(self.style, self.params.len());
        self.sql.push_str(&ph);
    }

    /// Bind `value` and append its placeholder followed by `::cast` when given.
    pub fn push_typed_param(&mut self, value: SqlValue, cast: Option<&str>) {
        self.push_param(value);
        if let Some(c) = cast {
            self.sql.push_str("::");
            self.sql.push_str(c);
        }
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Postgres type name used to pin an untyped VALUES parameter.
/// Text and null values stay uncast.
fn pg_cast(value: &SqlValue) -> Option<&'static str> {
    match value {
        SqlValue::Null | SqlValue::String(_) => None,
        SqlValue::Bool(_) => Some("bool"),
        SqlValue::I32(_) => Some("int4"),
        SqlValue::I64(_) => Some("int8"),
        SqlValue::F64(_) => Some("float8"),
        SqlValue::Date(_) => Some("date"),
        SqlValue::Timestamp(_) => Some("timestamp"),
        SqlValue::TimestampTz(_) => Some("timestamptz"),
    }
}

/// Numeric casts ordered by width; anything else keeps the cast seen first.
fn widen(current: &'static str, next: &'static str) -> &'static str {
    let rank = |c: &str| match c {
        "int4" => Some(0),
        "int8" => Some(1),
        "float8" => Some(2),
        _ => None,
    };
    match (rank(current), rank(next)) {
        (Some(a), Some(b)) if b > a => next,
        _ => current,
    }
}

/// One cast per column. The first non-null value picks the type; later integer
/// and float values of the same column widen it to `int8` or `float8`.
fn column_casts(dialect: Dialect, chunk: &[Record], columns: &[String]) -> Vec<Option<&'static str>> {
    if dialect != Dialect::Postgres {
        return vec![None; columns.len()];
    }
    columns
        .iter()
        .map(|col| {
            let mut values = chunk
                .iter()
                .filter_map(|r| r.get(col))
                .filter(|v| !v.is_null());
            let first = pg_cast(values.next()?)?;
            Some(values.filter_map(pg_cast).fold(first, widen))
        })
        .collect()
}

/// True when no record of `chunk` holds a non-null value for `column`.
fn all_null(chunk: &[Record], column: &str) -> bool {
    chunk
        .iter()
        .all(|r| r.get(column).map_or(true, SqlValue::is_null))
}

fn chunk_columns(chunk: &[Record]) -> DbResult<Vec<String>> {
    let first = chunk.first().ok_or(DbError::EmptyInput)?;
    if first.is_empty() {
        return Err(DbError::Shape { index: 0 });
    }
    Ok(first.columns().map(str::to_string).collect())
}

fn push_rows(w: &mut SqlWriter, chunk: &[Record], columns: &[String], casts: &[Option<&str>]) {
    for (i, record) in chunk.iter().enumerate() {
        if i > 0 {
            w.push_sql(", ");
        }
        w.push_sql("(");
        for (j, col) in columns.iter().enumerate() {
            if j > 0 {
                w.push_sql(", ");
            }
            // A record lacking one of the chunk's columns contributes NULL.
            let value = record.get(col).cloned().unwrap_or(SqlValue::Null);
            w.push_typed_param(value, casts[j]);
        }
        w.push_sql(")");
    }
}

/// Render `(VALUES (...), ...) AS "alias" ("c1", ...)` into `w`.
///
/// Column order comes from the chunk's first record and is applied to every row.
/// Returns that column list.
pub fn values_source(w: &mut SqlWriter, chunk: &[Record], alias: &str) -> DbResult<Vec<String>> {
    let columns = chunk_columns(chunk)?;
    push_values(w, chunk, &columns, alias)?;
    Ok(columns)
}

fn push_values(w: &mut SqlWriter, chunk: &[Record], columns: &[String], alias: &str) -> DbResult<()> {
    let casts = column_casts(w.dialect(), chunk, columns);
    w.push_sql("(VALUES ");
    push_rows(w, chunk, columns, &casts);
    w.push_sql(") AS ");
    w.push_ident(alias)?;
    w.push_sql(" (");
    w.push_ident_list(columns)?;
    w.push_sql(")");
    Ok(())
}

/// Build INSERT INTO <table> (<cols>) VALUES (<row1>), (<row2>), ...
pub fn insert_many(dialect: Dialect, table: &str, chunk: &[Record]) -> DbResult<Statement> {
    let target = quote_table(table)?;
    let columns = chunk_columns(chunk)?;
    let mut w = SqlWriter::new(dialect);
    w.push_sql("INSERT INTO ");
    w.push_sql(&target);
    w.push_sql(" (");
    w.push_ident_list(&columns)?;
    w.push_sql(") VALUES ");
    // Target columns give the parameter types, so no casts here.
    let casts = vec![None; columns.len()];
    push_rows(&mut w, chunk, &columns, &casts);
    Ok(w.finish())
}

/// What a MERGE does with source rows that match no target row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Matched rows are updated; unmatched rows are skipped.
    UpdateOnly,
    /// Matched rows are updated; unmatched rows are inserted.
    Upsert,
}

/// Build a MERGE of `chunk` into `table`, matching on `keys`.
///
/// Key columns are never assigned in the update branch. Single keys produce one
/// equality, composite keys an AND of equalities. In upsert mode the insert branch
/// supplies every column, keys included.
///
/// On Postgres a non-key column that is NULL in every record of the chunk is left
/// out of the VALUES source and written as a bare `NULL`, which takes the target
/// column's type. An untyped VALUES column would resolve to `text` instead.
pub fn merge(
    dialect: Dialect,
    table: &str,
    chunk: &[Record],
    keys: &KeySpec,
    mode: MergeMode,
) -> DbResult<Statement> {
    let target = quote_table(table)?;
    let columns = chunk_columns(chunk)?;
    if let Some(k) = keys.columns().iter().find(|k| !columns.contains(k)) {
        return Err(DbError::InvalidKeySpec {
            reason: format!("key column `{}` is not among the record columns", k),
        });
    }
    let update_columns: Vec<&String> = columns.iter().filter(|c| !keys.contains(c)).collect();
    if mode == MergeMode::UpdateOnly && update_columns.is_empty() {
        return Err(DbError::NoUpdatableColumns {
            table: table.to_string(),
        });
    }

    let null_columns: Vec<&String> = match dialect {
        Dialect::Postgres => update_columns
            .iter()
            .copied()
            .filter(|c| all_null(chunk, c))
            .collect(),
        Dialect::Generic => Vec::new(),
    };
    let source_columns: Vec<String> = columns
        .iter()
        .filter(|c| !null_columns.contains(c))
        .cloned()
        .collect();

    let mut w = SqlWriter::new(dialect);
    let push_source = |w: &mut SqlWriter, col: &String| -> DbResult<()> {
        if null_columns.contains(&col) {
            w.push_sql("NULL");
            Ok(())
        } else {
            w.push_qualified(SOURCE_ALIAS, col)
        }
    };
    w.push_sql("MERGE INTO ");
    w.push_sql(&target);
    w.push_sql(" AS ");
    w.push_ident(TARGET_ALIAS)?;
    w.push_sql(" USING ");
    push_values(&mut w, chunk, &source_columns, SOURCE_ALIAS)?;

    w.push_sql(" ON ");
    for (i, key) in keys.columns().iter().enumerate() {
        if i > 0 {
            w.push_sql(" AND ");
        }
        w.push_qualified(SOURCE_ALIAS, key)?;
        w.push_sql(" = ");
        w.push_qualified(TARGET_ALIAS, key)?;
    }

    if !update_columns.is_empty() {
        w.push_sql(" WHEN MATCHED THEN UPDATE SET ");
        for (i, col) in update_columns.iter().enumerate() {
            if i > 0 {
                w.push_sql(", ");
            }
            w.push_ident(col)?;
            w.push_sql(" = ");
            push_source(&mut w, *col)?;
        }
    }

    if mode == MergeMode::Upsert {
        w.push_sql(" WHEN NOT MATCHED THEN INSERT (");
        w.push_ident_list(&columns)?;
        w.push_sql(") VALUES (");
        for (i, col) in columns.iter().enumerate() {
            if i > 0 {
                w.push_sql(", ");
            }
            push_source(&mut w, col)?;
        }
        w.push_sql(")");
    }

    Ok(w.finish())
}

/// How a LIKE filter term is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeMatch {
    Contains,
    StartsWith,
    EndsWith,
    Exact,
}

/// Escape `\`, `%` and `_` so they match literally under `ESCAPE '\'`.
pub fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Append `<column> LIKE <param> ESCAPE '\'` for `term`.
///
/// Blank terms add nothing and return `false`. Case-insensitive matching uses
/// ILIKE on Postgres and LOWER() on both sides elsewhere.
pub fn like_filter(
    w: &mut SqlWriter,
    column: &str,
    term: &str,
    mode: LikeMatch,
    case_insensitive: bool,
) -> DbResult<bool> {
    let term = term.trim();
    if term.is_empty() {
        return Ok(false);
    }
    let escaped = escape_like(term);
    let pattern = match mode {
        LikeMatch::Contains => format!("%{}%", escaped),
        LikeMatch::StartsWith => format!("{}%", escaped),
        LikeMatch::EndsWith => format!("%{}", escaped),
        LikeMatch::Exact => escaped,
    };
    match (case_insensitive, w.dialect()) {
        (false, _) => {
            w.push_ident(column)?;
            w.push_sql(" LIKE ");
            w.push_param(SqlValue::String(pattern));
        }
        (true, Dialect::Postgres) => {
            w.push_ident(column)?;
            w.push_sql(" ILIKE ");
            w.push_param(SqlValue::String(pattern));
        }
        (true, Dialect::Generic) => {
            w.push_sql("LOWER(");
            w.push_ident(column)?;
            w.push_sql(") LIKE LOWER(");
            w.push_param(SqlValue::String(pattern));
            w.push_sql(")");
        }
    }
    w.push_sql(" ESCAPE '\\'");
    Ok(true)
}

/// Append ` LIMIT <limit> OFFSET <offset>`.
pub fn limit_offset(w: &mut SqlWriter, limit: u64, offset: u64) {
    w.push_sql(" LIMIT ");
    w.push_sql(&limit.to_string());
    w.push_sql(" OFFSET ");
    w.push_sql(&offset.to_string());
}
