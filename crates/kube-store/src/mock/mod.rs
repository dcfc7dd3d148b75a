//! Mock ObjectStore for unit testing
//!
//! Keeps objects in memory as JSON, keyed by apiVersion, kind, namespace and
//! name. Like the API server it assigns `uid` and `resourceVersion`, rejects
//! stale replaces, keeps `status` out of ordinary writes and (on request)
//! garbage-collects dependents along owner references.
//!
//! Every successful create/replace is counted so tests can assert that a
//! converged reconcile performs no writes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kube::core::{Selector, SelectorExt};
use serde_json::Value;

use crate::error::StoreError;
use crate::store_trait::{ObjectStore, StoreResource};

/// (apiVersion, kind, namespace, name)
type ObjectKey = (String, String, String, String);

/// One recorded write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub verb: &'static str,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectKey, Value>,
    writes: Vec<WriteRecord>,
    status_writes: Vec<WriteRecord>,
    failing_kinds: HashMap<String, String>,
    pending_conflicts: HashMap<String, u32>,
    next_version: u64,
}

/// In-memory [`ObjectStore`]
#[derive(Debug, Clone, Default)]
pub struct MockObjectStore {
    state: Arc<Mutex<State>>,
}

fn key_for<K: StoreResource>(namespace: &str, name: &str) -> ObjectKey {
    (
        K::api_version(&()).to_string(),
        K::kind(&()).to_string(),
        namespace.to_string(),
        name.to_string(),
    )
}

fn labels_of(value: &Value) -> BTreeMap<String, String> {
    value["metadata"]["labels"]
        .as_object()
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn owner_uids(value: &Value) -> Vec<String> {
    value["metadata"]["ownerReferences"]
        .as_array()
        .map(|refs| {
            refs.iter()
                .filter_map(|r| r["uid"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn meta_str(value: &Value, field: &str) -> Option<String> {
    value["metadata"][field].as_str().map(str::to_string)
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object (for test setup). Assigns `uid` and `resourceVersion`
    /// when missing; not counted as a write.
    pub fn insert<K: StoreResource>(&self, obj: &K) -> K {
        let mut state = self.lock();
        let mut value = serde_json::to_value(obj).unwrap_or(Value::Null);
        stamp_type::<K>(&mut value);
        if meta_str(&value, "uid").is_none() {
            value["metadata"]["uid"] = Value::String(uuid::Uuid::new_v4().to_string());
        }
        state.next_version += 1;
        value["metadata"]["resourceVersion"] = Value::String(state.next_version.to_string());
        let namespace = meta_str(&value, "namespace").unwrap_or_default();
        let name = meta_str(&value, "name").unwrap_or_default();
        state
            .objects
            .insert(key_for::<K>(&namespace, &name), value.clone());
        serde_json::from_value(value).unwrap_or_else(|_| obj.clone())
    }

    /// Typed snapshot of one object
    pub fn object<K: StoreResource>(&self, namespace: &str, name: &str) -> Option<K> {
        let state = self.lock();
        state
            .objects
            .get(&key_for::<K>(namespace, name))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Every object of kind `K` in `namespace`, ordered by name
    pub fn all<K: StoreResource>(&self, namespace: &str) -> Vec<K> {
        let state = self.lock();
        let api_version = K::api_version(&());
        let kind = K::kind(&());
        state
            .objects
            .iter()
            .filter(|((av, k, ns, _), _)| av == &*api_version && k == &*kind && ns == namespace)
            .filter_map(|(_, v)| serde_json::from_value(v.clone()).ok())
            .collect()
    }

    /// Total number of stored objects of any kind
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Successful create/replace calls so far
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    /// Successful status patches so far
    pub fn status_writes(&self) -> Vec<WriteRecord> {
        self.lock().status_writes.clone()
    }

    pub fn reset_counters(&self) {
        let mut state = self.lock();
        state.writes.clear();
        state.status_writes.clear();
    }

    /// Make every create/replace of `K` fail with a 500 until cleared
    pub fn fail_writes_for<K: StoreResource>(&self, message: impl Into<String>) {
        self.lock()
            .failing_kinds
            .insert(K::kind(&()).to_string(), message.into());
    }

    /// Make the next `times` replaces of `K` fail with a conflict
    pub fn inject_conflicts<K: StoreResource>(&self, times: u32) {
        self.lock()
            .pending_conflicts
            .insert(K::kind(&()).to_string(), times);
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing_kinds.clear();
        state.pending_conflicts.clear();
    }

    /// Delete an object and, like the garbage collector, every object whose
    /// owner references point at a deleted object. Returns how many objects
    /// were removed.
    pub fn delete_cascade<K: StoreResource>(&self, namespace: &str, name: &str) -> usize {
        let mut state = self.lock();
        let Some(root) = state.objects.remove(&key_for::<K>(namespace, name)) else {
            return 0;
        };
        let mut removed = 1;
        let mut doomed: HashSet<String> = meta_str(&root, "uid").into_iter().collect();
        loop {
            let dependents: Vec<ObjectKey> = state
                .objects
                .iter()
                .filter(|(_, v)| owner_uids(v).iter().any(|uid| doomed.contains(uid)))
                .map(|(key, _)| key.clone())
                .collect();
            if dependents.is_empty() {
                break;
            }
            for key in dependents {
                if let Some(v) = state.objects.remove(&key) {
                    removed += 1;
                    if let Some(uid) = meta_str(&v, "uid") {
                        doomed.insert(uid);
                    }
                }
            }
        }
        removed
    }
}

fn stamp_type<K: StoreResource>(value: &mut Value) {
    value["apiVersion"] = Value::String(K::api_version(&()).to_string());
    value["kind"] = Value::String(K::kind(&()).to_string());
}

impl State {
    fn check_failure(&self, kind: &str) -> Result<(), StoreError> {
        match self.failing_kinds.get(kind) {
            Some(message) => Err(StoreError::Api {
                code: 500,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn record(&mut self, verb: &'static str, kind: &str, namespace: &str, name: &str) {
        self.writes.push(WriteRecord {
            verb,
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
    }

    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MockObjectStore {
    async fn get<K: StoreResource>(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        let state = self.lock();
        match state.objects.get(&key_for::<K>(namespace, name)) {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }

    async fn list<K: StoreResource>(&self, namespace: &str, selector: &Selector) -> Result<Vec<K>, StoreError> {
        let state = self.lock();
        let api_version = K::api_version(&());
        let kind = K::kind(&());
        state
            .objects
            .iter()
            .filter(|((av, k, ns, _), _)| av == &*api_version && k == &*kind && ns == namespace)
            .filter(|(_, v)| selector.matches(&labels_of(v)))
            .map(|(_, v)| serde_json::from_value(v.clone()).map_err(StoreError::from))
            .collect()
    }

    async fn create<K: StoreResource>(&self, obj: &K) -> Result<K, StoreError> {
        let mut state = self.lock();
        let kind = K::kind(&()).to_string();
        state.check_failure(&kind)?;

        let mut value = serde_json::to_value(obj)?;
        stamp_type::<K>(&mut value);
        let namespace = meta_str(&value, "namespace").ok_or_else(|| StoreError::Api {
            code: 422,
            message: format!("{kind} has no namespace"),
        })?;
        let name = meta_str(&value, "name").ok_or_else(|| StoreError::Api {
            code: 422,
            message: format!("{kind} has no name"),
        })?;
        let key = key_for::<K>(&namespace, &name);
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!("{kind} {namespace}/{name}")));
        }

        value["metadata"]["uid"] = Value::String(uuid::Uuid::new_v4().to_string());
        value["metadata"]["resourceVersion"] = Value::String(state.bump_version());
        if let Some(meta) = value["metadata"].as_object_mut() {
            meta.remove("generateName");
        }
        // Status only changes through the status subresource
        if let Some(obj) = value.as_object_mut() {
            obj.remove("status");
        }

        state.objects.insert(key, value.clone());
        state.record("create", &kind, &namespace, &name);
        Ok(serde_json::from_value(value)?)
    }

    async fn replace<K: StoreResource>(&self, obj: &K) -> Result<K, StoreError> {
        let mut state = self.lock();
        let kind = K::kind(&()).to_string();
        state.check_failure(&kind)?;

        let mut value = serde_json::to_value(obj)?;
        stamp_type::<K>(&mut value);
        let namespace = meta_str(&value, "namespace").unwrap_or_default();
        let name = meta_str(&value, "name").unwrap_or_default();
        let key = key_for::<K>(&namespace, &name);

        if let Some(remaining) = state.pending_conflicts.get_mut(&kind) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Conflict(format!("{kind} {namespace}/{name} (injected)")));
            }
        }

        let Some(current) = state.objects.get(&key).cloned() else {
            return Err(StoreError::NotFound(format!("{kind} {namespace}/{name}")));
        };
        let stored_version = meta_str(&current, "resourceVersion");
        if let Some(version) = meta_str(&value, "resourceVersion") {
            if Some(&version) != stored_version.as_ref() {
                return Err(StoreError::Conflict(format!(
                    "{kind} {namespace}/{name}: resourceVersion {version} is stale"
                )));
            }
        }

        value["metadata"]["uid"] = current["metadata"]["uid"].clone();
        value["metadata"]["resourceVersion"] = Value::String(state.bump_version());
        if let Some(obj) = value.as_object_mut() {
            match current.get("status") {
                Some(status) => obj.insert("status".to_string(), status.clone()),
                None => obj.remove("status"),
            };
        }

        state.objects.insert(key, value.clone());
        state.record("replace", &kind, &namespace, &name);
        Ok(serde_json::from_value(value)?)
    }

    async fn patch_status<K: StoreResource>(
        &self,
        namespace: &str,
        name: &str,
        status: Value,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let kind = K::kind(&()).to_string();
        state.check_failure(&kind)?;

        let version = state.bump_version();
        let Some(current) = state.objects.get_mut(&key_for::<K>(namespace, name)) else {
            return Err(StoreError::NotFound(format!("{kind} {namespace}/{name}")));
        };
        merge(&mut current["status"], &status);
        current["metadata"]["resourceVersion"] = Value::String(version);

        state.status_writes.push(WriteRecord {
            verb: "patch_status",
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }
}

/// JSON merge patch (RFC 7386)
fn merge(target: &mut Value, patch: &Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target_map), Some(patch_map)) => {
            for (k, v) in patch_map {
                if v.is_null() {
                    target_map.remove(k);
                } else {
                    merge(target_map.entry(k.clone()).or_insert(Value::Null), v);
                }
            }
        }
        _ => *target = patch.clone(),
    }
}
