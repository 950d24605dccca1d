//! PostgreSQL plugin.
//!
//! The plugin builds parameterized SQL and runs it through the
//! [`SqlConnector`] injected on the execution context; it never links a
//! database driver itself. A connection is opened per action, used for one
//! statement, and always closed, success or failure.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::context::ExecutionContext;
use crate::descriptor::{handler_fn, Action, PluginDescriptor};
use crate::errors::{Error, Result, UpstreamError, ValidationError};
use crate::schema::{ActionSchema, FieldSpec};

pub const PLUGIN_ID: &str = "postgres";
const UPSTREAM: &str = "PostgreSQL";

/// Connection settings deserialized from action input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_true")]
    pub enable_ssl: bool,
    #[serde(default)]
    pub reject_unauthorized: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

fn default_port() -> u16 {
    5432
}

fn default_true() -> bool {
    true
}

/// One parameterized statement with positional `$n` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Result of executing a statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlOutcome {
    #[serde(default)]
    pub rows: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
}

/// An open database session. One statement per session in this plugin.
#[async_trait]
pub trait SqlConnection: Send {
    async fn query(&mut self, statement: SqlStatement) -> Result<SqlOutcome>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens database sessions. Implemented by the embedding application over its
/// driver of choice and injected via
/// [`ExecutionContextBuilder::sql_connector`](crate::ExecutionContextBuilder::sql_connector).
#[async_trait]
pub trait SqlConnector: Send + Sync {
    async fn connect(&self, config: &PostgresConfig) -> Result<Box<dyn SqlConnection>>;
}

fn connector(ctx: &ExecutionContext) -> Result<Arc<dyn SqlConnector>> {
    ctx.sql_connector().ok_or_else(|| {
        Error::Config(
            "no SQL connector configured; inject one on the execution context".to_string(),
        )
    })
}

fn parse_config(input: &Value) -> Result<PostgresConfig> {
    serde_json::from_value(input.clone()).map_err(Error::Serialization)
}

/// Wrap a connector/driver failure with the operation label. Validation and
/// configuration errors pass through untouched.
fn upstream(operation: &str, err: Error) -> Error {
    match err {
        Error::Validation(_) | Error::Config(_) => err,
        Error::Upstream(inner) => UpstreamError {
            plugin: format!("{UPSTREAM} {operation}"),
            status: inner.status,
            code: inner.code,
            message: inner.message,
            raw_body: inner.raw_body,
        }
        .into(),
        other => UpstreamError::new(format!("{UPSTREAM} {operation}"), other.to_string()).into(),
    }
}

/// Double-quote an identifier, doubling any embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Run one statement on a fresh connection, closing it regardless of the
/// query outcome.
async fn run_statement(
    ctx: &ExecutionContext,
    config: &PostgresConfig,
    operation: &str,
    statement: impl FnOnce() -> Result<SqlStatement>,
) -> Result<SqlOutcome> {
    let connector = connector(ctx)?;
    let mut conn = connector
        .connect(config)
        .await
        .map_err(|e| upstream(operation, e))?;

    // Statement construction runs after connect so input errors that depend
    // on no connection being possible still surface as validation errors.
    let statement = match statement() {
        Ok(s) => s,
        Err(err) => {
            let _ = conn.close().await;
            return Err(err);
        }
    };

    let outcome = conn.query(statement).await;
    let _ = conn.close().await;
    outcome.map_err(|e| upstream(operation, e))
}

fn outcome_value(outcome: SqlOutcome) -> Result<Value> {
    serde_json::to_value(outcome).map_err(Error::Serialization)
}

async fn execute_query(input: Value, ctx: ExecutionContext) -> Result<Value> {
    let config = parse_config(&input)?;
    let sql = required_str(&input, "sql")?.to_string();
    let params = input
        .get("params")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let outcome = run_statement(&ctx, &config, "query", move || {
        Ok(SqlStatement { sql, params })
    })
    .await?;
    outcome_value(outcome)
}

async fn select_rows(input: Value, ctx: ExecutionContext) -> Result<Value> {
    let config = parse_config(&input)?;
    let table = required_str(&input, "table")?.to_string();
    let columns = input
        .get("columns")
        .and_then(|v| v.as_array())
        .map(|cols| {
            cols.iter()
                .filter_map(|c| c.as_str())
                .map(quote_ident)
                .collect::<Vec<_>>()
        })
        .filter(|cols| !cols.is_empty());
    let conditions = object_entries(&input, "where");
    let order_by = input
        .get("orderBy")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let order_direction = match input.get("orderDirection").and_then(|v| v.as_str()) {
        None => "ASC".to_string(),
        Some(dir) if dir.eq_ignore_ascii_case("asc") => "ASC".to_string(),
        Some(dir) if dir.eq_ignore_ascii_case("desc") => "DESC".to_string(),
        Some(other) => {
            return Err(ValidationError::new(format!(
                "must be ASC or DESC, got '{other}'"
            ))
            .with_field("orderDirection")
            .into())
        }
    };
    let limit = input.get("limit").and_then(|v| v.as_u64());

    let outcome = run_statement(&ctx, &config, "select", move || {
        let column_list = columns
            .map(|cols| cols.join(", "))
            .unwrap_or_else(|| "*".to_string());
        let mut sql = format!("SELECT {} FROM {}", column_list, quote_ident(&table));
        let mut params = Vec::new();
        push_where_clause(&mut sql, &mut params, &conditions);
        if let Some(column) = order_by {
            sql.push_str(&format!(" ORDER BY {} {}", quote_ident(&column), order_direction));
        }
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        Ok(SqlStatement { sql, params })
    })
    .await?;
    outcome_value(outcome)
}

async fn insert_row(input: Value, ctx: ExecutionContext) -> Result<Value> {
    let config = parse_config(&input)?;
    let table = required_str(&input, "table")?.to_string();
    let values = object_entries(&input, "values");

    let outcome = run_statement(&ctx, &config, "insert", move || {
        if values.is_empty() {
            return Err(ValidationError::new(
                "No values provided for insert operation",
            )
            .into());
        }
        let columns: Vec<String> = values.iter().map(|(k, _)| quote_ident(k)).collect();
        let placeholders: Vec<String> =
            (1..=values.len()).map(|i| format!("${i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            quote_ident(&table),
            columns.join(", "),
            placeholders.join(", ")
        );
        let params = values.into_iter().map(|(_, v)| v).collect();
        Ok(SqlStatement { sql, params })
    })
    .await?;
    outcome_value(outcome)
}

async fn update_rows(input: Value, ctx: ExecutionContext) -> Result<Value> {
    let config = parse_config(&input)?;
    let table = required_str(&input, "table")?.to_string();
    let values = object_entries(&input, "values");
    let conditions = object_entries(&input, "where");

    let outcome = run_statement(&ctx, &config, "update", move || {
        if values.is_empty() {
            return Err(ValidationError::new(
                "No values provided for update operation",
            )
            .into());
        }
        let mut params: Vec<Value> = Vec::new();
        let assignments: Vec<String> = values
            .into_iter()
            .map(|(column, value)| {
                params.push(value);
                format!("{} = ${}", quote_ident(&column), params.len())
            })
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            quote_ident(&table),
            assignments.join(", ")
        );
        push_where_clause(&mut sql, &mut params, &conditions);
        sql.push_str(" RETURNING *");
        Ok(SqlStatement { sql, params })
    })
    .await?;
    outcome_value(outcome)
}

async fn delete_rows(input: Value, ctx: ExecutionContext) -> Result<Value> {
    let config = parse_config(&input)?;
    let table = required_str(&input, "table")?.to_string();
    let conditions = object_entries(&input, "where");

    let outcome = run_statement(&ctx, &config, "delete", move || {
        if conditions.is_empty() {
            return Err(ValidationError::new(
                "No conditions provided for delete operation. To delete all rows, use executeQuery with a DELETE statement.",
            )
            .into());
        }
        let mut sql = format!("DELETE FROM {}", quote_ident(&table));
        let mut params = Vec::new();
        push_where_clause(&mut sql, &mut params, &conditions);
        sql.push_str(" RETURNING *");
        Ok(SqlStatement { sql, params })
    })
    .await?;
    outcome_value(outcome)
}

fn required_str<'a>(input: &'a Value, field: &str) -> Result<&'a str> {
    input
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ValidationError::new("is required").with_field(field).into())
}

/// Extract an object field's entries in key order. `serde_json` with the
/// `preserve_order` feature off sorts map keys, which keeps generated SQL
/// deterministic.
fn object_entries(input: &Value, field: &str) -> Vec<(String, Value)> {
    input
        .get(field)
        .and_then(|v| v.as_object())
        .map(|obj: &Map<String, Value>| {
            obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        })
        .unwrap_or_default()
}

fn push_where_clause(sql: &mut String, params: &mut Vec<Value>, conditions: &[(String, Value)]) {
    if conditions.is_empty() {
        return;
    }
    let clauses: Vec<String> = conditions
        .iter()
        .map(|(column, value)| {
            params.push(value.clone());
            format!("{} = ${}", quote_ident(column), params.len())
        })
        .collect();
    sql.push_str(" WHERE ");
    sql.push_str(&clauses.join(" AND "));
}

fn connection_schema() -> ActionSchema {
    ActionSchema::object()
        .field("host", FieldSpec::string().describe("Database host"))
        .field(
            "port",
            FieldSpec::number().describe("Database port").default_value(5432),
        )
        .field("user", FieldSpec::string().describe("Database user"))
        .field("password", FieldSpec::string().describe("Database password"))
        .field("database", FieldSpec::string().describe("Database name"))
        .field(
            "enableSsl",
            FieldSpec::boolean()
                .describe("Use TLS for the connection")
                .default_value(true),
        )
        .field(
            "rejectUnauthorized",
            FieldSpec::boolean().describe("Verify the server certificate"),
        )
        .field(
            "certificate",
            FieldSpec::string().describe("CA certificate (PEM)"),
        )
        .require(&["host", "user", "password", "database"])
}

pub fn plugin() -> Result<PluginDescriptor> {
    Ok(PluginDescriptor::new(PLUGIN_ID, "PostgreSQL")?
        .with_description("Run queries and row operations against PostgreSQL")
        .with_groups(&["databases"])
        .with_tags(&["sql", "postgres", "database"])
        .with_input_schema(connection_schema())
        .with_example_input(json!({
            "host": "localhost",
            "port": 5432,
            "user": "postgres",
            "password": "secret",
            "database": "app",
            "table": "users",
            "values": { "name": "Ada" }
        }))
        .with_example_output(json!({
            "rows": [{ "id": 1, "name": "Ada" }],
            "affectedRows": 1
        }))
        .with_action(
            Action::new("executeQuery", handler_fn(execute_query))?
                .with_description("Run a raw parameterized SQL statement")
                .with_input_schema(
                    ActionSchema::object()
                        .field("sql", FieldSpec::string().describe("SQL text with $n placeholders"))
                        .field("params", FieldSpec::array().describe("Positional parameters"))
                        .require(&["sql"]),
                ),
        )
        .with_action(
            Action::new("selectRows", handler_fn(select_rows))?
                .with_description("Select rows with optional filtering and ordering")
                .with_input_schema(
                    ActionSchema::object()
                        .field("table", FieldSpec::string())
                        .field("columns", FieldSpec::array())
                        .field("where", FieldSpec::object())
                        .field("orderBy", FieldSpec::string())
                        .field(
                            "orderDirection",
                            FieldSpec::string().allowed(&["ASC", "DESC"]),
                        )
                        .field("limit", FieldSpec::number())
                        .require(&["table"]),
                ),
        )
        .with_action(
            Action::new("insertRow", handler_fn(insert_row))?
                .with_description("Insert one row and return it")
                .with_input_schema(
                    ActionSchema::object()
                        .field("table", FieldSpec::string())
                        .field("values", FieldSpec::object())
                        .require(&["table", "values"]),
                ),
        )
        .with_action(
            Action::new("updateRows", handler_fn(update_rows))?
                .with_description("Update matching rows and return them")
                .with_input_schema(
                    ActionSchema::object()
                        .field("table", FieldSpec::string())
                        .field("values", FieldSpec::object())
                        .field("where", FieldSpec::object())
                        .require(&["table", "values"]),
                ),
        )
        .with_action(
            Action::new("deleteRows", handler_fn(delete_rows))?
                .with_description("Delete matching rows and return them")
                .with_input_schema(
                    ActionSchema::object()
                        .field("table", FieldSpec::string())
                        .field("where", FieldSpec::object())
                        .require(&["table", "where"]),
                ),
        ))
}
