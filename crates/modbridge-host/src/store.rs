//! In-memory data service modules call back into.
//!
//! Rows are kept as JSON objects so fields the host does not know about
//! survive a round trip through a module.

use crate::config::HostConfig;
use modbridge_core::{Args, Operation, RemoteError, Request, Resource};
use modbridge_rpc::CallHandler;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

type Row = Map<String, Value>;

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    rows: HashMap<Resource, BTreeMap<String, Row>>,
    next_id: u64,
}

impl Tables {
    fn table(&self, resource: Resource) -> Option<&BTreeMap<String, Row>> {
        self.rows.get(&resource)
    }

    fn table_mut(&mut self, resource: Resource) -> &mut BTreeMap<String, Row> {
        self.rows.entry(resource).or_default()
    }

    fn contains(&self, resource: Resource, uuid: &str) -> bool {
        self.table(resource).is_some_and(|t| t.contains_key(uuid))
    }

    fn fresh_uuid(&mut self, resource: Resource) -> String {
        loop {
            self.next_id += 1;
            let uuid = format!("{}-{}", resource.segment(), self.next_id);
            if !self.contains(resource, &uuid) {
                return uuid;
            }
        }
    }

    /// Devices must name an existing network, points an existing device.
    fn check_parent(&self, resource: Resource, row: &Row) -> Result<(), RemoteError> {
        let (field, parent) = match resource {
            Resource::Networks => return Ok(()),
            Resource::Devices => ("network_uuid", Resource::Networks),
            Resource::Points => ("device_uuid", Resource::Devices),
        };
        match row.get(field) {
            None | Some(Value::Null) => Ok(()),
            Some(Value::String(uuid)) if self.contains(parent, uuid) => Ok(()),
            Some(other) => Err(RemoteError::invalid(format!("unknown {field}: {other}"))),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding the seed rows from `config`.
    pub fn from_config(config: &HostConfig) -> Result<Self, RemoteError> {
        let mut tables = Tables::default();
        seed(&mut tables, Resource::Networks, &config.networks)?;
        seed(&mut tables, Resource::Devices, &config.devices)?;
        seed(&mut tables, Resource::Points, &config.points)?;
        Ok(Self {
            inner: RwLock::new(tables),
        })
    }

    pub async fn len(&self, resource: Resource) -> usize {
        self.inner.read().await.table(resource).map_or(0, |t| t.len())
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.rows.values().all(|t| t.is_empty())
    }

    pub async fn perform(&self, op: Operation) -> Result<Vec<u8>, RemoteError> {
        match op {
            Operation::Get { resource, uuid, .. } => {
                let tables = self.inner.read().await;
                let row = tables
                    .table(resource)
                    .and_then(|t| t.get(&uuid))
                    .ok_or_else(|| not_found(resource, &uuid))?;
                to_json(row)
            }
            Operation::List { resource, args } => {
                let tables = self.inner.read().await;
                let rows: Vec<&Row> = tables
                    .table(resource)
                    .into_iter()
                    .flat_map(|t| t.values())
                    .filter(|row| matches_filter(row, &args))
                    .collect();
                to_json(&rows)
            }
            Operation::Create { resource, body } => {
                let mut row = parse_row(&body)?;
                let mut tables = self.inner.write().await;
                tables.check_parent(resource, &row)?;
                let uuid = match row.get("uuid").and_then(Value::as_str) {
                    Some(uuid) if !uuid.is_empty() => {
                        if tables.contains(resource, uuid) {
                            return Err(RemoteError::invalid(format!(
                                "{} {uuid} already exists",
                                resource.segment()
                            )));
                        }
                        uuid.to_string()
                    }
                    _ => tables.fresh_uuid(resource),
                };
                row.insert("uuid".into(), Value::String(uuid.clone()));
                tracing::debug!(resource = resource.segment(), %uuid, "Created");
                let result = to_json(&row);
                tables.table_mut(resource).insert(uuid, row);
                result
            }
            Operation::Update {
                resource,
                uuid,
                body,
            } => {
                let patch = parse_row(&body)?;
                let mut tables = self.inner.write().await;
                let mut row = tables
                    .table(resource)
                    .and_then(|t| t.get(&uuid))
                    .cloned()
                    .ok_or_else(|| not_found(resource, &uuid))?;
                row.extend(patch);
                row.insert("uuid".into(), Value::String(uuid.clone()));
                tables.check_parent(resource, &row)?;
                let result = to_json(&row);
                tables.table_mut(resource).insert(uuid, row);
                result
            }
            Operation::Delete { resource, uuid } => {
                let mut tables = self.inner.write().await;
                tables
                    .table_mut(resource)
                    .remove(&uuid)
                    .ok_or_else(|| not_found(resource, &uuid))?;
                tracing::debug!(resource = resource.segment(), %uuid, "Deleted");
                Ok(Vec::new())
            }
            Operation::Unknown(request) => Err(RemoteError::unsupported(format!(
                "unsupported call: {} {}",
                request.method, request.path
            ))),
        }
    }
}

impl CallHandler for MemoryStore {
    async fn call(&self, request: Request) -> Result<Vec<u8>, RemoteError> {
        tracing::debug!(method = %request.method, path = %request.path, "Host call");
        self.perform(Operation::route(request)).await
    }
}

fn seed<T: Serialize>(tables: &mut Tables, resource: Resource, items: &[T]) -> Result<(), RemoteError> {
    for item in items {
        let body = serde_json::to_vec(item).map_err(|e| RemoteError::internal(e.to_string()))?;
        let mut row = parse_row(&body)?;
        tables.check_parent(resource, &row)?;
        let uuid = match row.get("uuid").and_then(Value::as_str) {
            Some(uuid) if !uuid.is_empty() => uuid.to_string(),
            _ => tables.fresh_uuid(resource),
        };
        row.insert("uuid".into(), Value::String(uuid.clone()));
        tables.table_mut(resource).insert(uuid, row);
    }
    Ok(())
}

fn parse_row(body: &[u8]) -> Result<Row, RemoteError> {
    serde_json::from_slice(body)
        .map_err(|e| RemoteError::invalid(format!("body must be a JSON object: {e}")))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, RemoteError> {
    serde_json::to_vec(value).map_err(|e| RemoteError::internal(e.to_string()))
}

fn not_found(resource: Resource, uuid: &str) -> RemoteError {
    RemoteError::not_found(format!("{} {uuid} not found", resource.segment()))
}

fn matches_filter(row: &Row, args: &Args) -> bool {
    match args.get("name") {
        Some(name) => row.get("name").and_then(Value::as_str) == Some(name),
        None => true,
    }
}
