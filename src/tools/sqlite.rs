//! SQLite query tool (feature `tool-sqlite`).
//!
//! Opens a connection per call on the blocking pool. Statements that produce
//! columns return their rows as JSON arrays; anything else returns the number
//! of affected rows.

use std::path::PathBuf;

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::{json, Value};

use crate::error::{InstantlyError, Result};
use crate::sandbox::SandboxContext;

use super::{Tool, ToolArgs, ToolMetadata};

/// Runs SQL against one database file.
#[derive(Debug, Clone)]
pub struct SqliteTool {
    db_path: PathBuf,
}

impl SqliteTool {
    /// `db_path` is resolved against the sandbox working directory when relative.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

fn to_sql(value: &Value) -> Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => {
            return Err(InstantlyError::Validation(format!(
                "Unsupported SQL parameter: {}",
                other
            )))
        }
    })
}

fn from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => json!(i),
        SqlValue::Real(f) => json!(f),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(bytes) => json!(bytes),
    }
}

fn run_query(path: PathBuf, query: String, params: Vec<SqlValue>) -> Result<Value> {
    let conn = Connection::open(&path)?;
    let mut stmt = conn.prepare(&query)?;
    let columns = stmt.column_count();

    if columns > 0 {
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            (0..columns)
                .map(|i| row.get::<_, SqlValue>(i).map(from_sql))
                .collect::<rusqlite::Result<Vec<Value>>>()
        })?;
        let rows = rows
            .map(|r| r.map(Value::Array))
            .collect::<rusqlite::Result<Vec<Value>>>()?;
        Ok(Value::Array(rows))
    } else {
        let affected = stmt.execute(params_from_iter(params.iter()))?;
        Ok(json!(affected))
    }
}

#[async_trait]
impl Tool for SqliteTool {
    fn describe(&self) -> ToolMetadata {
        ToolMetadata::new("sqlite", "SQLite database operations").with_tags(["database", "sql"])
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "params": {"type": "array", "description": "Positional parameters"}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: ToolArgs, ctx: &SandboxContext) -> Result<Value> {
        let query = args.str_arg(0, "query")?;
        let params = match args.get(1, "params") {
            None => Vec::new(),
            Some(Value::Array(items)) => items.iter().map(to_sql).collect::<Result<_>>()?,
            Some(other) => {
                return Err(InstantlyError::Validation(format!(
                    "Argument 'params' must be an array, got {}",
                    other
                )))
            }
        };
        let path = ctx.resolve_path(&self.db_path);

        tokio::task::spawn_blocking(move || run_query(path, query, params))
            .await
            .map_err(|e| InstantlyError::Execution(format!("SQLite task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_insert_select() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = SandboxContext::new(dir.path());
        let tool = SqliteTool::new("test.db");

        let create = ToolArgs::from_args(vec![json!(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT, score REAL)"
        )]);
        assert_eq!(tool.invoke(create, &ctx).await.unwrap(), json!(0));

        let insert = ToolArgs::from_args(vec![
            json!("INSERT INTO notes (body, score) VALUES (?1, ?2)"),
            json!(["first", 1.5]),
        ]);
        assert_eq!(tool.invoke(insert, &ctx).await.unwrap(), json!(1));

        let select = ToolArgs::from_args(vec![json!("SELECT id, body, score FROM notes")]);
        assert_eq!(
            tool.invoke(select, &ctx).await.unwrap(),
            json!([[1, "first", 1.5]])
        );
        assert!(dir.path().join("test.db").exists());
    }

    #[tokio::test]
    async fn test_bad_sql_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = SandboxContext::new(dir.path());
        let err = SqliteTool::new("t.db")
            .invoke(ToolArgs::from_args(vec![json!("SELEC nonsense")]), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, InstantlyError::Sqlite(_)));
    }

    #[test]
    fn test_param_conversion() {
        assert!(matches!(to_sql(&json!(true)).unwrap(), SqlValue::Integer(1)));
        assert!(to_sql(&json!({"nested": 1})).is_err());
    }
}
