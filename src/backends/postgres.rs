//! Postgres SQL backend on a shared `sqlx` pool.

use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::{Map, Number, Value};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::types::{Json, Uuid};
use sqlx::{Column, Executor, PgPool, Postgres, Row as _, TypeInfo};

use super::{Row, SqlArgs, SqlBackend};
use crate::error::ProbeError;

const MAX_CONNECTIONS: u32 = 5;

/// SQL backend over a Postgres connection pool.
#[derive(Debug, Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub async fn connect(url: &str) -> Result<Self, ProbeError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await
            .map_err(|e| ProbeError::Sql(format!("connect: {e}")))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Resolve named placeholders and convert every argument to the type
    /// the server expects for its placeholder.
    async fn prepare(&self, query: &str, args: &SqlArgs) -> Result<(String, Vec<PgValue>), ProbeError> {
        let (sql, values) = resolve_args(query, args);
        if values.is_empty() {
            return Ok((sql, Vec::new()));
        }
        let types = self.parameter_types(&sql).await?;
        let bound = values
            .iter()
            .enumerate()
            .map(|(idx, value)| {
                let ty = types.get(idx).copied().unwrap_or(ParamType::Inferred);
                convert(ty, value)
                    .map_err(|msg| ProbeError::Sql(format!("argument ${}: {msg}", idx + 1)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((sql, bound))
    }

    async fn parameter_types(&self, sql: &str) -> Result<Vec<ParamType>, ProbeError> {
        let describe = (&self.pool).describe(sql).await.map_err(sql_error)?;
        // servers that only report a parameter count leave every argument untyped
        Ok(describe
            .parameters()
            .and_then(|params| params.left())
            .map(|types| types.iter().map(|t| ParamType::from_name(t.name())).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl SqlBackend for PgBackend {
    async fn exec(&self, query: &str, args: &SqlArgs) -> Result<u64, ProbeError> {
        let (sql, values) = self.prepare(query, args).await?;
        let result = bind_all(sqlx::query(&sql), values)
            .execute(&self.pool)
            .await
            .map_err(sql_error)?;
        Ok(result.rows_affected())
    }

    async fn query_one(&self, query: &str, args: &SqlArgs) -> Result<Option<Row>, ProbeError> {
        let (sql, values) = self.prepare(query, args).await?;
        let row = bind_all(sqlx::query(&sql), values)
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_error)?;
        Ok(row.as_ref().map(row_to_map))
    }

    async fn query_all(&self, query: &str, args: &SqlArgs) -> Result<Vec<Row>, ProbeError> {
        let (sql, values) = self.prepare(query, args).await?;
        let rows = bind_all(sqlx::query(&sql), values)
            .fetch_all(&self.pool)
            .await
            .map_err(sql_error)?;
        Ok(rows.iter().map(row_to_map).collect())
    }
}

fn sql_error(err: sqlx::Error) -> ProbeError {
    ProbeError::Sql(err.to_string())
}

fn named_param() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@(\w+)").expect("named parameter regex"))
}

/// Rewrite `@name` placeholders to `$n`, reusing the index of repeated
/// names. Positional arguments pass through untouched.
fn resolve_args(query: &str, args: &SqlArgs) -> (String, Vec<Value>) {
    let named = match args {
        SqlArgs::Positional(values) => return (query.to_string(), values.clone()),
        SqlArgs::Named(named) => named,
    };
    let mut indices: HashMap<String, usize> = HashMap::new();
    let mut values = Vec::new();
    let sql = named_param().replace_all(query, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        let Some(value) = named.get(name) else {
            return caps[0].to_string();
        };
        let index = *indices.entry(name.to_string()).or_insert_with(|| {
            values.push(value.clone());
            values.len()
        });
        format!("${index}")
    });
    (sql.into_owned(), values)
}

/// Placeholder type reported by the server when describing a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamType {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Uuid,
    TimestampTz,
    Timestamp,
    Date,
    Json,
    Text,
    /// No type information; bind by the JSON value's shape.
    Inferred,
}

impl ParamType {
    fn from_name(name: &str) -> Self {
        match name {
            "BOOL" => Self::Bool,
            "INT2" => Self::Int2,
            "INT4" => Self::Int4,
            "INT8" => Self::Int8,
            "FLOAT4" => Self::Float4,
            // numeric is sent as float8 and cast by the server on assignment
            "FLOAT8" | "NUMERIC" => Self::Float8,
            "UUID" => Self::Uuid,
            "TIMESTAMPTZ" => Self::TimestampTz,
            "TIMESTAMP" => Self::Timestamp,
            "DATE" => Self::Date,
            "JSON" | "JSONB" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// A JSON argument converted to the Rust type of its placeholder.
#[derive(Debug, Clone, PartialEq)]
enum PgValue {
    Null(ParamType),
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Uuid(Uuid),
    TimestampTz(DateTime<Utc>),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    Json(Value),
    Text(String),
}

fn convert(ty: ParamType, value: &Value) -> Result<PgValue, String> {
    if value.is_null() {
        return Ok(PgValue::Null(ty));
    }
    let mismatch = || format!("cannot convert {value} to {ty:?}");
    let converted = match ty {
        ParamType::Inferred => Some(infer(value)),
        ParamType::Bool => match value {
            Value::Bool(b) => Some(PgValue::Bool(*b)),
            Value::String(s) => s.parse().ok().map(PgValue::Bool),
            _ => None,
        },
        ParamType::Int2 => as_i64(value).and_then(|i| i16::try_from(i).ok()).map(PgValue::Int2),
        ParamType::Int4 => as_i64(value).and_then(|i| i32::try_from(i).ok()).map(PgValue::Int4),
        ParamType::Int8 => as_i64(value).map(PgValue::Int8),
        ParamType::Float4 => as_f64(value).map(|f| PgValue::Float4(f as f32)),
        ParamType::Float8 => as_f64(value).map(PgValue::Float8),
        ParamType::Uuid => value
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(PgValue::Uuid),
        ParamType::TimestampTz => value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| PgValue::TimestampTz(t.with_timezone(&Utc))),
        ParamType::Timestamp => value.as_str().and_then(parse_naive_timestamp).map(PgValue::Timestamp),
        ParamType::Date => value.as_str().and_then(parse_date).map(PgValue::Date),
        ParamType::Json => Some(PgValue::Json(value.clone())),
        ParamType::Text => Some(PgValue::Text(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
    };
    converted.ok_or_else(mismatch)
}

fn infer(value: &Value) -> PgValue {
    match value {
        Value::Null => PgValue::Null(ParamType::Inferred),
        Value::Bool(b) => PgValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => PgValue::Int8(i),
            None => PgValue::Float8(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => PgValue::Text(s.clone()),
        other => PgValue::Json(other.clone()),
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_naive_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|t| t.date_naive()))
}

fn bind_all(
    mut query: Query<'_, Postgres, PgArguments>,
    values: Vec<PgValue>,
) -> Query<'_, Postgres, PgArguments> {
    for value in values {
        query = match value {
            PgValue::Null(ty) => bind_null(query, ty),
            PgValue::Bool(v) => query.bind(v),
            PgValue::Int2(v) => query.bind(v),
            PgValue::Int4(v) => query.bind(v),
            PgValue::Int8(v) => query.bind(v),
            PgValue::Float4(v) => query.bind(v),
            PgValue::Float8(v) => query.bind(v),
            PgValue::Uuid(v) => query.bind(v),
            PgValue::TimestampTz(v) => query.bind(v),
            PgValue::Timestamp(v) => query.bind(v),
            PgValue::Date(v) => query.bind(v),
            PgValue::Json(v) => query.bind(Json(v)),
            PgValue::Text(v) => query.bind(v),
        };
    }
    query
}

fn bind_null(query: Query<'_, Postgres, PgArguments>, ty: ParamType) -> Query<'_, Postgres, PgArguments> {
    match ty {
        ParamType::Bool => query.bind(Option::<bool>::None),
        ParamType::Int2 => query.bind(Option::<i16>::None),
        ParamType::Int4 => query.bind(Option::<i32>::None),
        ParamType::Int8 => query.bind(Option::<i64>::None),
        ParamType::Float4 => query.bind(Option::<f32>::None),
        ParamType::Float8 => query.bind(Option::<f64>::None),
        ParamType::Uuid => query.bind(Option::<Uuid>::None),
        ParamType::TimestampTz => query.bind(Option::<DateTime<Utc>>::None),
        ParamType::Timestamp => query.bind(Option::<NaiveDateTime>::None),
        ParamType::Date => query.bind(Option::<NaiveDate>::None),
        ParamType::Json => query.bind(Option::<Json<Value>>::None),
        ParamType::Text | ParamType::Inferred => query.bind(Option::<String>::None),
    }
}

fn row_to_map(row: &PgRow) -> Row {
    let mut map = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), column_value(row, idx, column.type_info().name()));
    }
    map
}

fn column_value(row: &PgRow, idx: usize, type_name: &str) -> Value {
    fn get<'r, T>(row: &'r PgRow, idx: usize) -> Option<T>
    where
        T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    {
        row.try_get::<Option<T>, _>(idx).ok().flatten()
    }

    let value = match type_name {
        "BOOL" => get::<bool>(row, idx).map(Value::Bool),
        "INT2" => get::<i16>(row, idx).map(Value::from),
        "INT4" => get::<i32>(row, idx).map(Value::from),
        "INT8" => get::<i64>(row, idx).map(Value::from),
        "FLOAT4" => get::<f32>(row, idx).and_then(|v| Number::from_f64(v as f64)).map(Value::Number),
        "FLOAT8" => get::<f64>(row, idx).and_then(Number::from_f64).map(Value::Number),
        "JSON" | "JSONB" => get::<Json<Value>>(row, idx).map(|j| j.0),
        "UUID" => get::<Uuid>(row, idx).map(|u| Value::String(u.to_string())),
        "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, idx).map(|t| Value::String(t.to_rfc3339())),
        "TIMESTAMP" => get::<NaiveDateTime>(row, idx).map(|t| Value::String(t.to_string())),
        "DATE" => get::<NaiveDate>(row, idx).map(|d| Value::String(d.to_string())),
        _ => get::<String>(row, idx).map(Value::String),
    };
    value.unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn named_args_become_positional() {
        let args: SqlArgs =
            serde_json::from_value(json!({"name": "alice", "id": 7})).unwrap();
        let (sql, values) = resolve_args(
            "SELECT * FROM users WHERE name = @name AND id = @id OR alias = @name",
            &args,
        );
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE name = $1 AND id = $2 OR alias = $1"
        );
        assert_eq!(values, vec![json!("alice"), json!(7)]);
    }

    #[test]
    fn unknown_named_params_are_left_alone() {
        let args: SqlArgs = serde_json::from_value(json!({})).unwrap();
        let (sql, values) = resolve_args("SELECT @missing", &args);
        assert_eq!(sql, "SELECT @missing");
        assert!(values.is_empty());
    }

    #[test]
    fn positional_args_pass_through() {
        let args = SqlArgs::Positional(vec![json!(1)]);
        let (sql, values) = resolve_args("DELETE FROM users WHERE id = $1", &args);
        assert_eq!(sql, "DELETE FROM users WHERE id = $1");
        assert_eq!(values, vec![json!(1)]);
    }

    #[test]
    fn server_type_names_map_to_parameter_types() {
        assert_eq!(ParamType::from_name("UUID"), ParamType::Uuid);
        assert_eq!(ParamType::from_name("INT4"), ParamType::Int4);
        assert_eq!(ParamType::from_name("NUMERIC"), ParamType::Float8);
        assert_eq!(ParamType::from_name("JSONB"), ParamType::Json);
        assert_eq!(ParamType::from_name("VARCHAR"), ParamType::Text);
    }

    #[test]
    fn strings_convert_to_uuid_and_timestamps() {
        let id = "6f1c2b7e-0000-4000-8000-000000000001";
        assert_eq!(
            convert(ParamType::Uuid, &json!(id)).unwrap(),
            PgValue::Uuid(Uuid::parse_str(id).unwrap())
        );
        let converted = convert(ParamType::TimestampTz, &json!("2024-01-01T02:00:00+02:00")).unwrap();
        let PgValue::TimestampTz(t) = converted else {
            panic!("expected timestamptz, got {converted:?}");
        };
        assert_eq!(t.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(
            convert(ParamType::Timestamp, &json!("2024-01-01 08:30:00")).unwrap(),
            PgValue::Timestamp(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(8, 30, 0).unwrap())
        );
        assert_eq!(
            convert(ParamType::Date, &json!("2024-03-05")).unwrap(),
            PgValue::Date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
        );
    }

    #[test]
    fn integers_narrow_to_the_column_width() {
        assert_eq!(convert(ParamType::Int4, &json!(30)).unwrap(), PgValue::Int4(30));
        assert_eq!(convert(ParamType::Int2, &json!("7")).unwrap(), PgValue::Int2(7));
        assert!(convert(ParamType::Int2, &json!(70000)).is_err());
        assert!(convert(ParamType::Int8, &json!(1.5)).is_err());
    }

    #[test]
    fn nulls_carry_the_placeholder_type() {
        assert_eq!(convert(ParamType::Int4, &Value::Null).unwrap(), PgValue::Null(ParamType::Int4));
        assert_eq!(convert(ParamType::Uuid, &Value::Null).unwrap(), PgValue::Null(ParamType::Uuid));
    }

    #[test]
    fn text_placeholders_accept_any_scalar() {
        assert_eq!(convert(ParamType::Text, &json!(42)).unwrap(), PgValue::Text("42".into()));
        assert_eq!(convert(ParamType::Text, &json!("alice")).unwrap(), PgValue::Text("alice".into()));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = convert(ParamType::Uuid, &json!("not-a-uuid")).unwrap_err();
        assert!(err.contains("not-a-uuid"), "{err}");
        assert!(convert(ParamType::TimestampTz, &json!("yesterday")).is_err());
        assert!(convert(ParamType::Bool, &json!(1)).is_err());
    }

    #[test]
    fn untyped_placeholders_bind_by_json_shape() {
        assert_eq!(convert(ParamType::Inferred, &json!(3)).unwrap(), PgValue::Int8(3));
        assert_eq!(convert(ParamType::Inferred, &json!("x")).unwrap(), PgValue::Text("x".into()));
        assert_eq!(
            convert(ParamType::Inferred, &json!({"a": 1})).unwrap(),
            PgValue::Json(json!({"a": 1}))
        );
    }
}
