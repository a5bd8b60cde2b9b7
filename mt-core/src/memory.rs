//! In-memory service over JSON rows.
//!
//! Stands in for a real store in tests and demos. Honours the filter in
//! [`ServiceParams`] on `find` and `get`, so tenant scoping written into the
//! query by before-hooks is observable.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::entity::Entity;
use crate::errors::{MtError, MtResult};
use crate::query::ServiceParams;
use crate::service::MtService;
use crate::tenant::TenantContext;

fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug)]
pub struct MemoryService {
    rows: RwLock<BTreeMap<String, Value>>,
    next_id: AtomicU64,
    find_calls: AtomicUsize,
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryService {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            find_calls: AtomicUsize::new(0),
        }
    }

    /// Seed with rows. Rows without an `id` get the next free integer.
    pub fn with_rows(rows: Vec<Value>) -> Self {
        let svc = Self::new();
        for row in rows {
            svc.insert(row);
        }
        svc
    }

    fn insert(&self, mut row: Value) -> Value {
        let id = match row.id().filter(|v| !v.is_null()) {
            Some(id) => {
                if let Some(n) = id.as_u64() {
                    self.next_id.fetch_max(n + 1, Ordering::SeqCst);
                }
                id
            }
            None => Value::from(self.next_id.fetch_add(1, Ordering::SeqCst)),
        };
        row.set_field("id", id.clone());
        self.rows.write().insert(id_key(&id), row.clone());
        row
    }

    /// Number of `find` calls served so far.
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Current row for `id`, ignoring any filter.
    pub fn row(&self, id: &str) -> Option<Value> {
        self.rows.read().get(id).cloned()
    }

    fn not_found(id: &str) -> anyhow::Error {
        MtError::not_found(format!("No record found for id '{id}'")).into_anyhow()
    }
}

#[async_trait]
impl MtService<Value, ServiceParams> for MemoryService {
    async fn find(&self, _ctx: &TenantContext, params: ServiceParams) -> MtResult<Vec<Value>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.read();
        let out: Vec<Value> = rows
            .values()
            .filter(|row| params.query.matches(*row))
            .cloned()
            .collect();
        debug!(conditions = params.query.conditions.len(), rows = out.len(), "memory find");
        Ok(out)
    }

    async fn get(&self, _ctx: &TenantContext, id: &str, params: ServiceParams) -> MtResult<Value> {
        self.rows
            .read()
            .get(id)
            .filter(|row| params.query.matches(*row))
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    async fn create(&self, _ctx: &TenantContext, data: Value, _params: ServiceParams) -> MtResult<Value> {
        if !data.is_object() {
            return Err(MtError::bad_request("Record must be a JSON object").into_anyhow());
        }
        if let Some(id) = data.id().filter(|v| !v.is_null()) {
            if self.rows.read().contains_key(&id_key(&id)) {
                return Err(MtError::conflict(format!("Record '{}' already exists", id_key(&id))).into_anyhow());
            }
        }
        Ok(self.insert(data))
    }

    async fn update(&self, _ctx: &TenantContext, id: &str, mut data: Value, _params: ServiceParams) -> MtResult<Value> {
        let mut rows = self.rows.write();
        let current = rows.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        let stored_id = current.id().unwrap_or(Value::Null);
        data.set_field("id", stored_id);
        *current = data.clone();
        Ok(data)
    }

    async fn patch(&self, _ctx: &TenantContext, id: &str, data: Value, _params: ServiceParams) -> MtResult<Value> {
        let mut rows = self.rows.write();
        let current = rows.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        if let Value::Object(changes) = data {
            for (k, v) in changes {
                if k != "id" {
                    current.set_field(&k, v);
                }
            }
        }
        Ok(current.clone())
    }

    async fn remove(&self, _ctx: &TenantContext, id: &str, _params: ServiceParams) -> MtResult<Value> {
        self.rows.write().remove(id).ok_or_else(|| Self::not_found(id))
    }
}
