//! Idempotent create-or-update of child resources.
//!
//! `create_or_update` fetches the stored object, creates the desired one when
//! absent, and otherwise runs a pure mutation `(current, desired) -> patched`.
//! Nothing is written when the patched object equals the stored one, so a
//! repeated pass over unchanged input costs reads only.

use kube::ResourceExt;
use kube_store::{ObjectStore, StoreError, StoreResource};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::ControllerError;

/// Fetch-mutate-write attempts before a conflict is surfaced
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
}

impl SyncOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncOutcome::Created => "created",
            SyncOutcome::Updated => "updated",
            SyncOutcome::Unchanged => "unchanged",
        }
    }

    pub fn wrote(self) -> bool {
        self != SyncOutcome::Unchanged
    }
}

/// Pure mutation applied when the object already exists
pub type Mutation<K> = fn(&K, &K) -> Result<K, ControllerError>;

pub async fn create_or_update<S, K>(
    store: &S,
    desired: &K,
    mutate: Mutation<K>,
) -> Result<(K, SyncOutcome), ControllerError>
where
    S: ObjectStore,
    K: StoreResource,
{
    let name = desired.name_any();
    let namespace = desired.namespace().ok_or_else(|| {
        ControllerError::Internal(format!("{} {name} has no namespace", K::kind(&())))
    })?;
    let kind = K::kind(&());

    let mut last_conflict = String::new();
    for attempt in 1..=MAX_ATTEMPTS {
        let current: Option<K> = store.get(&namespace, &name).await?;
        let result = match current {
            None => store.create(desired).await.map(|obj| (obj, SyncOutcome::Created)),
            Some(current) => {
                let patched = mutate(&current, desired)?;
                if same_object(&current, &patched)? {
                    debug!("{} {}/{} unchanged", kind, namespace, name);
                    return Ok((current, SyncOutcome::Unchanged));
                }
                store.replace(&patched).await.map(|obj| (obj, SyncOutcome::Updated))
            }
        };

        match result {
            Ok((obj, outcome)) => {
                info!("{} {} {}/{}", outcome.as_str(), kind, namespace, name);
                return Ok((obj, outcome));
            }
            Err(e @ (StoreError::Conflict(_) | StoreError::AlreadyExists(_))) => {
                warn!(
                    "Write of {} {}/{} raced (attempt {}/{}): {}",
                    kind, namespace, name, attempt, MAX_ATTEMPTS, e
                );
                last_conflict = e.to_string();
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ControllerError::Conflict(format!(
        "{kind} {namespace}/{name}: {last_conflict}"
    )))
}

/// Overlay `desired` on `current`, keeping server-managed metadata.
pub fn merge_desired<K: StoreResource>(current: &K, desired: &K) -> Result<K, ControllerError> {
    let mut merged = to_json(current)?;
    let overlay = to_json(desired)?;
    if let (Value::Object(target), Value::Object(source)) = (&mut merged, overlay) {
        for (key, value) in source {
            if key == "status" {
                continue;
            }
            merge_field(target, &key, value, &[key.as_str()]);
        }
    }
    serde_json::from_value(merged)
        .map_err(|e| ControllerError::Internal(format!("merged object does not deserialize: {e}")))
}

/// Mutation for objects that must never be adopted: an existing object with
/// the same name belongs to someone else.
pub fn refuse_existing<K: StoreResource>(current: &K, _desired: &K) -> Result<K, ControllerError> {
    Err(ControllerError::Conflict(format!(
        "{} {} already exists",
        K::kind(&()),
        current.name_any()
    )))
}

fn merge_field(target: &mut Map<String, Value>, key: &str, value: Value, path: &[&str]) {
    match (path, value) {
        (_, Value::Null) => {}
        (["metadata", "uid"] | ["metadata", "resourceVersion"], _) => {}
        (["metadata", "ownerReferences"], Value::Array(refs)) => {
            let existing = target
                .entry(key.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(existing) = existing {
                for r in refs {
                    let uid = r.get("uid").cloned();
                    if !existing.iter().any(|e| e.get("uid") == uid.as_ref()) {
                        existing.push(r);
                    }
                }
            }
        }
        (_, Value::Object(source)) => {
            let slot = target
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(child) = slot {
                for (k, v) in source {
                    let mut nested: Vec<&str> = path.to_vec();
                    nested.push(k.as_str());
                    merge_field(child, &k, v, &nested);
                }
            }
        }
        (_, value) => {
            target.insert(key.to_string(), value);
        }
    }
}

fn to_json<K: StoreResource>(obj: &K) -> Result<Value, ControllerError> {
    serde_json::to_value(obj)
        .map_err(|e| ControllerError::Internal(format!("{} does not serialize: {e}", K::kind(&()))))
}

fn same_object<K: StoreResource>(a: &K, b: &K) -> Result<bool, ControllerError> {
    Ok(to_json(a)? == to_json(b)?)
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
