//! In-process collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Map, Value};
use tokio::sync::Notify;

use crate::error::ServiceError;
use crate::llm_client::GenerationService;
use crate::store::{Filter, Query, RemoteStore, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Select,
    Insert,
    Update,
    Delete,
}

struct Failure {
    op: Op,
    table: Table,
    remaining_ok: usize,
    status: u16,
}

/// Holds a call open until the test releases it.
struct Gate {
    op: Op,
    table: Table,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<Table, Vec<Value>>>,
    calls: Mutex<HashMap<(Op, Table), usize>>,
    failures: Mutex<Vec<Failure>>,
    gates: Mutex<Vec<Gate>>,
    next_id: AtomicUsize,
}

/// A store holding `count` prompts created one minute apart, oldest first.
pub fn seeded_store(count: usize) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::default());
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    for i in 0..count {
        store.put(
            Table::Prompts,
            json!({
                "id": format!("prompt-{i:05}"),
                "title": format!("Prompt {i}"),
                "description": "",
                "content": format!("content {i}"),
                "tags": ["写作"],
                "author_id": "author",
                "author_name": "Author",
                "is_paid": false,
                "price": 0.0,
                "likes": 0,
                "created_at": (base + Duration::minutes(i as i64)).to_rfc3339(),
            }),
        );
    }
    store
}

impl MemoryStore {
    pub fn put(&self, table: Table, row: Value) {
        self.tables.lock().unwrap().entry(table).or_default().push(row);
    }

    pub fn rows(&self, table: Table) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn ids(&self, table: Table) -> Vec<String> {
        self.rows(table)
            .iter()
            .filter_map(|row| row.get("id").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    pub fn row(&self, table: Table, id: &str) -> Option<Value> {
        self.rows(table)
            .into_iter()
            .find(|row| row.get("id").and_then(Value::as_str) == Some(id))
    }

    pub fn set_field(&self, table: Table, id: &str, field: &str, value: Value) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(row) = tables
            .get_mut(&table)
            .and_then(|rows| rows.iter_mut().find(|r| r.get("id").and_then(Value::as_str) == Some(id)))
        {
            row[field] = value;
        }
    }

    pub fn calls(&self, op: Op, table: Table) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&(op, table))
            .copied()
            .unwrap_or(0)
    }

    /// Lets `remaining_ok` further calls through, then fails every matching call
    /// with a 500.
    pub fn fail_after(&self, op: Op, table: Table, remaining_ok: usize) {
        self.fail_with(op, table, remaining_ok, 500);
    }

    pub fn fail_with(&self, op: Op, table: Table, remaining_ok: usize, status: u16) {
        self.failures.lock().unwrap().push(Failure {
            op,
            table,
            remaining_ok,
            status,
        });
    }

    /// The next matching call notifies the returned `entered` handle and waits
    /// for `release` before touching any data.
    pub fn gate(&self, op: Op, table: Table) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        self.gates.lock().unwrap().push(Gate {
            op,
            table,
            entered: entered.clone(),
            release: release.clone(),
        });
        (entered, release)
    }

    async fn enter(&self, op: Op, table: Table) -> Result<()> {
        *self.calls.lock().unwrap().entry((op, table)).or_default() += 1;

        let gate = {
            let mut gates = self.gates.lock().unwrap();
            gates
                .iter()
                .position(|g| g.op == op && g.table == table)
                .map(|index| gates.remove(index))
        };
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let mut failures = self.failures.lock().unwrap();
        if let Some(failure) = failures
            .iter_mut()
            .find(|f| f.op == op && f.table == table)
        {
            if failure.remaining_ok == 0 {
                return Err(ServiceError::Status {
                    service: "store",
                    status: failure.status,
                    body: format!("injected failure on {}", table.name()),
                }
                .into());
            }
            failure.remaining_ok -= 1;
        }
        Ok(())
    }
}

fn matches(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| match row.get(&filter.column) {
        Some(Value::String(s)) => *s == filter.value,
        Some(other) => other.to_string() == filter.value,
        None => false,
    })
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>> {
        self.enter(Op::Select, table).await?;

        let mut rows: Vec<Value> = self
            .rows(table)
            .into_iter()
            .filter(|row| matches(row, &query.filters))
            .collect();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let left = a.get(&order.column).map(Value::to_string).unwrap_or_default();
                let right = b.get(&order.column).map(Value::to_string).unwrap_or_default();
                if order.descending {
                    right.cmp(&left)
                } else {
                    left.cmp(&right)
                }
            });
        }

        if let Some(range) = query.range {
            rows = rows.into_iter().skip(range.offset).take(range.limit).collect();
        }

        if table == Table::Prompts && query.columns.contains("comments(") {
            let comments = self.rows(Table::Comments);
            for row in &mut rows {
                let id = row.get("id").cloned().unwrap_or(Value::Null);
                let nested: Vec<Value> = comments
                    .iter()
                    .filter(|c| c.get("prompt_id") == Some(&id))
                    .cloned()
                    .collect();
                row["comments"] = Value::Array(nested);
            }
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, records: Vec<Value>) -> Result<Vec<Value>> {
        self.enter(Op::Insert, table).await?;

        let mut tables = self.tables.lock().unwrap();
        let existing = tables.entry(table).or_default();
        let mut inserted = Vec::with_capacity(records.len());
        for record in records {
            let Value::Object(mut fields) = record else {
                anyhow::bail!("insert expects JSON objects");
            };
            if table == Table::Likes {
                let duplicate = existing.iter().any(|row| {
                    row.get("user_id") == fields.get("user_id")
                        && row.get("prompt_id") == fields.get("prompt_id")
                });
                if duplicate {
                    return Err(ServiceError::Status {
                        service: "store",
                        status: 409,
                        body: "duplicate key value violates unique constraint".into(),
                    }
                    .into());
                }
            } else {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                fields
                    .entry("id")
                    .or_insert_with(|| Value::String(format!("{}-new-{n}", table.name())));
                fields
                    .entry("created_at")
                    .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
            }
            let row = Value::Object(fields);
            existing.push(row.clone());
            inserted.push(row);
        }
        Ok(inserted)
    }

    async fn update(&self, table: Table, patch: Value, filters: &[Filter]) -> Result<()> {
        self.enter(Op::Update, table).await?;

        let patch: Map<String, Value> = match patch {
            Value::Object(map) => map,
            _ => anyhow::bail!("update expects a JSON object"),
        };
        let mut tables = self.tables.lock().unwrap();
        for row in tables.entry(table).or_default().iter_mut() {
            if matches(row, filters) {
                for (key, value) in &patch {
                    row[key.as_str()] = value.clone();
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<()> {
        self.enter(Op::Delete, table).await?;

        let mut tables = self.tables.lock().unwrap();
        tables
            .entry(table)
            .or_default()
            .retain(|row| !matches(row, filters));
        Ok(())
    }
}

type Script = dyn Fn(&str, usize) -> Result<String> + Send + Sync;

/// Generation backend driven by a closure of `(model, call_index)`.
pub struct ScriptedGenerator {
    script: Box<Script>,
    calls: Mutex<Vec<String>>,
    credentials: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(script: impl Fn(&str, usize) -> Result<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
            credentials: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn credentials(&self) -> Vec<String> {
        self.credentials.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn generate(&self, model: &str, _prompt: &str, _json_mode: bool) -> Result<String> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(model.to_string());
            calls.len() - 1
        };
        (self.script)(model, index)
    }

    fn set_credential(&self, credential: String) {
        self.credentials.lock().unwrap().push(credential);
    }
}

/// JSON array of `count` generated items titled `<prefix> <n>`.
pub fn items_json(prefix: &str, count: usize) -> String {
    let items: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "title": format!("{prefix} {i}"),
                "description": "generated",
                "content": format!("{prefix} content {i}"),
                "tags": ["ChatGPT"],
            })
        })
        .collect();
    Value::Array(items).to_string()
}

pub fn status_error(status: u16) -> anyhow::Error {
    ServiceError::Status {
        service: "llm",
        status,
        body: String::new(),
    }
    .into()
}
