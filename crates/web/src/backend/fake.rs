//! In-memory stand-in for the REST interface, for service tests.
//!
//! Rows are flat JSON objects. Filters the client sends (`eq`, `neq`, `lt`,
//! `gt`, `in`, `is.null`, `or(...)` with nested `and(...)`) and `order` are
//! honoured; embedded relations are not resolved, rows come back as stored.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::{Value, json};

use super::BackendClient;
use super::tests::client_for;

/// Parameters that shape a read rather than filter rows.
const SHAPING: [&str; 4] = ["select", "order", "limit", "offset"];

#[derive(Default)]
struct Tables {
    rows: HashMap<String, Vec<Value>>,
    /// Requests to let through, then requests to fail.
    failures: HashMap<(Method, String), (usize, usize)>,
}

/// Shared handle on the fake's tables.
#[derive(Clone, Default)]
pub struct FakeBackend {
    tables: Arc<Mutex<Tables>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add rows to `table`.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        self.tables
            .lock()
            .unwrap()
            .rows
            .entry(table.to_string())
            .or_default()
            .extend(rows.into_iter().map(with_defaults));
    }

    /// Current rows of `table`.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .rows
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Rows of `table` whose `column` equals `value`.
    pub fn rows_where(&self, table: &str, column: &str, value: &str) -> Vec<Value> {
        self.rows(table)
            .into_iter()
            .filter(|row| text(row.get(column)) == value)
            .collect()
    }

    /// Answer the next `times` requests of `method` on `table` with a 500.
    pub fn fail_next(&self, method: Method, table: &str, times: usize) {
        self.fail_after(method, table, 0, times);
    }

    /// Let `skip` requests of `method` on `table` through, then answer the
    /// following `times` with a 500.
    pub fn fail_after(&self, method: Method, table: &str, skip: usize, times: usize) {
        self.tables
            .lock()
            .unwrap()
            .failures
            .insert((method, table.to_string()), (skip, times));
    }

    /// Serve the fake on a local port and return a client pointed at it.
    pub async fn start(&self) -> BackendClient {
        let router = Router::new()
            .route("/rest/v1/{table}", any(handle))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        client_for(&format!("http://{addr}"))
    }
}

async fn handle(
    State(fake): State<FakeBackend>,
    method: Method,
    Path(table): Path<String>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let params: Vec<(String, String)> =
        url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
            .into_owned()
            .collect();
    let filters: Vec<&(String, String)> = params
        .iter()
        .filter(|(key, _)| !SHAPING.contains(&key.as_str()))
        .collect();
    let param = |name: &str| {
        params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    };

    let mut tables = fake.tables.lock().unwrap();
    if let Some((skip, times)) = tables.failures.get_mut(&(method.clone(), table.clone()))
        && *times > 0
    {
        if *skip > 0 {
            *skip -= 1;
        } else {
            *times -= 1;
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": format!("{table} is unavailable") })),
            )
                .into_response();
        }
    }

    let rows = tables.rows.entry(table).or_default();
    let selected = |row: &Value| filters.iter().all(|(key, value)| filter_holds(row, key, value));

    match method {
        Method::GET => {
            let mut found: Vec<Value> = rows.iter().filter(|r| selected(*r)).cloned().collect();
            if let Some(order) = param("order") {
                sort_rows(&mut found, order);
            }
            let offset = param("offset").and_then(|o| o.parse().ok()).unwrap_or(0);
            let limit = param("limit").and_then(|l| l.parse().ok()).unwrap_or(usize::MAX);
            let page: Vec<Value> = found.into_iter().skip(offset).take(limit).collect();
            Json(page).into_response()
        }
        Method::HEAD => {
            let count = rows.iter().filter(|r| selected(*r)).count();
            (StatusCode::OK, [(header::CONTENT_RANGE, format!("*/{count}"))]).into_response()
        }
        Method::POST => {
            let inserted: Vec<Value> = match serde_json::from_slice(&body).unwrap() {
                Value::Array(items) => items,
                item => vec![item],
            }
            .into_iter()
            .map(with_defaults)
            .collect();
            rows.extend(inserted.iter().cloned());
            (StatusCode::CREATED, Json(inserted)).into_response()
        }
        Method::PATCH => {
            let Value::Object(changes) = serde_json::from_slice(&body).unwrap() else {
                return StatusCode::BAD_REQUEST.into_response();
            };
            let mut updated = Vec::new();
            for row in rows.iter_mut().filter(|r| selected(&**r)) {
                if let Value::Object(fields) = row {
                    fields.extend(changes.clone());
                }
                updated.push(row.clone());
            }
            Json(updated).into_response()
        }
        Method::DELETE => {
            rows.retain(|r| !selected(r));
            StatusCode::NO_CONTENT.into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// Fill the columns the database would default.
fn with_defaults(mut row: Value) -> Value {
    if let Value::Object(fields) = &mut row {
        let now = chrono::Utc::now().to_rfc3339();
        fields
            .entry("id")
            .or_insert_with(|| json!(uuid::Uuid::new_v4()));
        fields.entry("created_at").or_insert_with(|| json!(now));
        fields.entry("updated_at").or_insert_with(|| json!(now));
    }
    row
}

/// A column value as the text the REST layer compares against.
fn text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn filter_holds(row: &Value, key: &str, value: &str) -> bool {
    if key == "or" || key == "and" {
        return condition_holds(row, &format!("{key}{value}"));
    }
    let Some((op, expected)) = value.split_once('.') else {
        return false;
    };
    compare(row, key, op, expected)
}

/// `column.op.value`, `and(...)` or `or(...)`.
fn condition_holds(row: &Value, condition: &str) -> bool {
    if let Some(inner) = condition
        .strip_prefix("and(")
        .and_then(|c| c.strip_suffix(')'))
    {
        return split_top_level(inner).iter().all(|c| condition_holds(row, c));
    }
    if let Some(inner) = condition
        .strip_prefix("or(")
        .and_then(|c| c.strip_suffix(')'))
    {
        return split_top_level(inner).iter().any(|c| condition_holds(row, c));
    }
    let mut parts = condition.splitn(3, '.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(column), Some(op), Some(expected)) => compare(row, column, op, expected),
        _ => false,
    }
}

fn compare(row: &Value, column: &str, op: &str, expected: &str) -> bool {
    let actual = text(row.get(column));
    let expected = unquote(expected);
    match op {
        "eq" => actual == expected,
        "neq" => actual != expected,
        "lt" => actual.as_str() < expected,
        "gt" => actual.as_str() > expected,
        "is" => expected == "null" && actual == "null",
        "in" => expected
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split(',')
            .any(|item| unquote(item) == actual),
        _ => false,
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Split on commas outside parentheses and quotes.
fn split_top_level(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let (mut depth, mut quoted, mut start) = (0usize, false, 0);
    for (i, c) in list.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                parts.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&list[start..]);
    parts
}

/// Apply an `order` parameter such as `created_at.desc,id.desc`.
fn sort_rows(rows: &mut [Value], order: &str) {
    let keys: Vec<(&str, bool)> = order
        .split(',')
        .filter_map(|key| key.split_once('.'))
        .map(|(column, direction)| (column, direction.starts_with("desc")))
        .collect();
    rows.sort_by(|a, b| {
        keys.iter()
            .map(|(column, descending)| {
                let ordering = text(a.get(*column)).cmp(&text(b.get(*column)));
                if *descending { ordering.reverse() } else { ordering }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

mod tests {
    use super::*;

    #[test]
    fn test_nested_conditions() {
        let row = json!({ "created_at": "2026-03-01T12:00:00Z", "id": "b" });
        let tie = "(created_at.lt.2026-03-01T12:00:00Z,and(created_at.eq.2026-03-01T12:00:00Z,id.lt.c))";
        assert!(filter_holds(&row, "or", tie));
        let tie = "(created_at.lt.2026-03-01T12:00:00Z,and(created_at.eq.2026-03-01T12:00:00Z,id.lt.a))";
        assert!(!filter_holds(&row, "or", tie));
        assert!(filter_holds(&row, "id", "in.(a,b)"));
        assert!(filter_holds(&row, "deleted_at", "is.null"));
    }
}
