//! sqldao - run one ad-hoc statement through the DAO engine.
//!
//! The statement is registered as a single-operation DAO type, so it goes through the
//! same build, bind, retry and mapping path as application DAOs.

use clap::Parser;
use sqldao::config::{Command, Config};
use sqldao::db::{Dao, OperationRegistry, RetryPolicy, SqliteSessionProvider};
use sqldao::models::{
    ColumnSpec, JsonRecord, MEMBERSHIP_MARKER, MembershipValues, Operation, OperationDescriptor,
    QueryParam, QuerySpec, ResultSpec, SqlType, Value,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Registry key for the ad-hoc statement.
struct AdHoc;

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Convert a `--param` JSON value; an array becomes the member list.
fn parse_param(raw: &str) -> Result<QueryParam, String> {
    let json: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| format!("Invalid parameter '{}': {}", raw, e))?;
    match json {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(json_to_value)
            .collect::<Result<MembershipValues, _>>()
            .map(QueryParam::Members),
        other => json_to_value(other).map(QueryParam::Value),
    }
}

fn json_to_value(json: serde_json::Value) -> Result<Value, String> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float))
            .ok_or_else(|| format!("Unsupported number: {}", n)),
        serde_json::Value::String(s) => Ok(Value::Text(s)),
        other => Err(format!("Unsupported parameter value: {}", other)),
    }
}

fn operation(
    sql: &str,
    params: usize,
    columns: Option<Vec<ColumnSpec>>,
) -> sqldao::DaoResult<Operation> {
    let mut query = QuerySpec::new(sql);
    if sql.contains(MEMBERSHIP_MARKER) {
        query = query.with_membership_clause();
    }
    for _ in 0..params {
        query = query.nullable_param(SqlType::Any);
    }
    let op = Operation::new(OperationDescriptor::new(0, "ad_hoc"), query);
    match columns {
        Some(columns) => op.returning::<JsonRecord>(ResultSpec::record(columns)),
        None => Ok(op),
    }
}

fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let db_config = config.database_config()?;
    let provider = Arc::new(SqliteSessionProvider::connect(
        &db_config.connection_string,
        &db_config.pool_options,
    )?);
    let registry = Arc::new(OperationRegistry::new());
    let retry = RetryPolicy::new(config.retries, Duration::from_millis(config.retry_delay_ms));

    let outcome = match &config.command {
        Command::Query {
            sql,
            params,
            columns,
            one,
        } => {
            let params = params
                .iter()
                .map(|p| parse_param(p))
                .collect::<Result<Vec<_>, _>>()?;
            let op = operation(sql, params.len(), Some(columns.clone()))?;
            registry.register::<AdHoc>(vec![op])?;
            let dao = Dao::<AdHoc>::new(provider.clone(), registry).with_retry_policy(retry);

            let records: Vec<JsonRecord> = if *one {
                dao.find::<JsonRecord>(0, &params)?.into_iter().collect()
            } else {
                dao.find_all(0, &params)?
            };
            for record in &records {
                println!("{}", serde_json::to_string(&record.0)?);
            }
            info!(rows = records.len(), "Query complete");
            Ok(())
        }
        Command::Execute { sql, params } => {
            let params = params
                .iter()
                .map(|p| parse_param(p))
                .collect::<Result<Vec<_>, _>>()?;
            registry.register::<AdHoc>(vec![operation(sql, params.len(), None)?])?;
            let dao = Dao::<AdHoc>::new(provider.clone(), registry).with_retry_policy(retry);

            let verb = sql
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_ascii_uppercase();
            let affected = match verb.as_str() {
                "INSERT" => dao.create(0, &params)?,
                "DELETE" => dao.delete(0, &params)?,
                _ => dao.update(0, &params)?,
            };
            println!("{}", serde_json::json!({ "rows_affected": affected }));
            Ok(())
        }
    };

    provider.close();
    outcome
}

fn main() {
    let config = Config::parse();
    init_tracing(&config);

    if let Err(e) = run(&config) {
        error!(error = %e, "Statement failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
