//! Multi-document manifest parsing

use kube::core::GroupVersionKind;
use serde::Deserialize;
use serde_json::Value;

use crate::error::RemoteError;

/// One document of a manifest, ready to be applied
#[derive(Debug, Clone)]
pub struct ManifestObject {
    pub gvk: GroupVersionKind,
    pub name: String,
    pub namespace: Option<String>,
    pub body: Value,
}

impl ManifestObject {
    pub fn describe(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{} {}/{}", self.gvk.kind, ns, self.name),
            None => format!("{} {}", self.gvk.kind, self.name),
        }
    }
}

/// Split "group/version" (or a bare core "version")
pub fn parse_api_version(api_version: &str) -> (&str, &str) {
    api_version.split_once('/').unwrap_or(("", api_version))
}

/// Parse a `---` separated YAML stream. Empty documents are skipped.
pub fn parse_documents(text: &str) -> Result<Vec<ManifestObject>, RemoteError> {
    let mut objects = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let body = Value::deserialize(document)
            .map_err(|e| RemoteError::InvalidManifest(format!("document {index}: {e}")))?;
        if body.is_null() {
            continue;
        }
        objects.push(to_object(index, body)?);
    }
    Ok(objects)
}

fn to_object(index: usize, body: Value) -> Result<ManifestObject, RemoteError> {
    let field = |pointer: &str| body.pointer(pointer).and_then(Value::as_str).map(str::to_string);
    let missing = |what: &str| RemoteError::InvalidManifest(format!("document {index}: missing {what}"));

    let api_version = field("/apiVersion").ok_or_else(|| missing("apiVersion"))?;
    let kind = field("/kind").ok_or_else(|| missing("kind"))?;
    let name = field("/metadata/name").ok_or_else(|| missing("metadata.name"))?;
    let namespace = field("/metadata/namespace");
    let (group, version) = parse_api_version(&api_version);

    Ok(ManifestObject {
        gvk: GroupVersionKind::gvk(group, version, &kind),
        name,
        namespace,
        body,
    })
}
