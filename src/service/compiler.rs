use std::time::Duration;

use crate::core::{ColumnDesc, DataType, QueryError, ResultSchema, Row, Value};
use crate::operation::{BodyContext, BodyOutcome, BoxFuture, StatementBody};

/// Synchronous statement compilation: produces an executable body or a
/// compile error on the submitting request itself. The real planner sits
/// behind this seam; the built-in implementation is only rich enough to
/// run the server end to end.
pub trait StatementCompiler: Send + Sync + 'static {
    fn compile(&self, sql: &str) -> Result<Box<dyn StatementBody>, QueryError>;
}

/// Minimal compiler for the bundled server binary.
///
/// Supports `SELECT` over literal expressions and a `SLEEP <millis>`
/// statement useful for exercising cancellation and polling.
#[derive(Debug, Default)]
pub struct SimpleCompiler;

impl SimpleCompiler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn parse_literal(token: &str) -> Result<Value, QueryError> {
        let token = token.trim();
        if token.eq_ignore_ascii_case("null") {
            return Ok(Value::Null);
        }
        if token.eq_ignore_ascii_case("true") {
            return Ok(Value::Boolean(true));
        }
        if token.eq_ignore_ascii_case("false") {
            return Ok(Value::Boolean(false));
        }
        if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
            return Ok(Value::Text(token[1..token.len() - 1].to_string()));
        }
        if let Ok(i) = token.parse::<i64>() {
            return Ok(Value::Integer(i));
        }
        if let Ok(r) = token.parse::<f64>() {
            return Ok(Value::Real(r));
        }
        Err(syntax_error(token))
    }
}

fn syntax_error(near: &str) -> QueryError {
    QueryError::Execution {
        message: format!("syntax error at or near \"{near}\""),
        sql_state: "42601".to_string(),
        error_code: 40_000,
    }
}

const fn literal_type(value: &Value) -> DataType {
    match value {
        Value::Integer(_) => DataType::Integer,
        Value::Real(_) => DataType::Real,
        Value::Boolean(_) => DataType::Boolean,
        Value::Null | Value::Text(_) => DataType::Text,
    }
}

impl StatementCompiler for SimpleCompiler {
    fn compile(&self, sql: &str) -> Result<Box<dyn StatementBody>, QueryError> {
        let sql = sql.trim().trim_end_matches(';').trim();
        if let Some(rest) = sql
            .strip_prefix("SELECT ")
            .or_else(|| sql.strip_prefix("select "))
        {
            let values = rest
                .split(',')
                .map(Self::parse_literal)
                .collect::<Result<Vec<_>, _>>()?;
            let columns = values
                .iter()
                .enumerate()
                .map(|(i, v)| ColumnDesc::new(format!("c{}", i + 1), literal_type(v)))
                .collect();
            return Ok(Box::new(SelectLiteralBody {
                schema: ResultSchema::new(columns),
                values,
            }));
        }
        if let Some(rest) = sql
            .strip_prefix("SLEEP ")
            .or_else(|| sql.strip_prefix("sleep "))
        {
            let millis: u64 = rest.trim().parse().map_err(|_| syntax_error(rest))?;
            return Ok(Box::new(SleepBody { millis }));
        }
        Err(syntax_error(sql.split_whitespace().next().unwrap_or("")))
    }
}

/// `SELECT` over literals: shape known at compile time, instant finish.
#[derive(Debug)]
struct SelectLiteralBody {
    schema: ResultSchema,
    values: Vec<Value>,
}

impl StatementBody for SelectLiteralBody {
    fn result_schema(&self) -> Option<ResultSchema> {
        Some(self.schema.clone())
    }

    fn run(self: Box<Self>, ctx: BodyContext) -> BoxFuture<Result<BodyOutcome, QueryError>> {
        Box::pin(async move {
            ctx.log.append(format!(
                "returning 1 row of {} column(s)",
                self.values.len()
            ));
            Ok(BodyOutcome::with_rows(self.schema, vec![Row::new(self.values)]))
        })
    }
}

/// Sleeps cooperatively; stops early when cancellation is requested.
#[derive(Debug)]
struct SleepBody {
    millis: u64,
}

impl StatementBody for SleepBody {
    fn run(self: Box<Self>, mut ctx: BodyContext) -> BoxFuture<Result<BodyOutcome, QueryError>> {
        Box::pin(async move {
            ctx.log.append(format!("sleeping for {} ms", self.millis));
            tokio::select! {
                () = tokio::time::sleep(Duration::from_millis(self.millis)) => {
                    ctx.log.append("sleep complete");
                    Ok(BodyOutcome::no_result_set())
                }
                () = ctx.cancelled() => {
                    Err(QueryError::Cancelled)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_select_literals() {
        let compiler = SimpleCompiler::new();
        let body = compiler.compile("SELECT 1, 'two', true").unwrap();
        let schema = body.result_schema().unwrap();
        assert_eq!(schema.column_names(), vec!["c1", "c2", "c3"]);
        assert_eq!(schema.columns[0].data_type, DataType::Integer);
        assert_eq!(schema.columns[1].data_type, DataType::Text);
        assert_eq!(schema.columns[2].data_type, DataType::Boolean);
    }

    #[test]
    fn test_compile_sleep_has_no_result_set() {
        let compiler = SimpleCompiler::new();
        let body = compiler.compile("SLEEP 50").unwrap();
        assert!(body.result_schema().is_none());
    }

    #[test]
    fn test_compile_error_is_synchronous() {
        let compiler = SimpleCompiler::new();
        let err = compiler.compile("DROP TABLE users").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Execution { ref sql_state, .. } if sql_state == "42601"
        ));
    }
}
