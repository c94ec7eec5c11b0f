//! Static surface of the service under test.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// An HTTP route registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoint {
    pub method: String,
    pub path: String,
    pub handler: String,
}

impl Endpoint {
    pub fn new(method: impl Into<String>, path: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            handler: handler.into(),
        }
    }
}

/// A data model declared in the source, fields rendered as `"Name Type"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataModel {
    pub name: String,
    pub fields: Vec<String>,
}

/// Snapshot of endpoints, models, tables and topics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceModel {
    pub endpoints: Vec<Endpoint>,
    pub models: Vec<DataModel>,
    /// Lower-cased table names.
    pub tables: BTreeSet<String>,
    pub topics: BTreeSet<String>,
}

impl SourceModel {
    /// One-line human readable description of the surface.
    pub fn summary(&self) -> String {
        let mut summary = format!("Project has {} HTTP endpoint(s)", self.endpoints.len());
        if !self.tables.is_empty() {
            summary.push_str(", uses DB tables: ");
            summary.push_str(&join(&self.tables));
        }
        if !self.topics.is_empty() {
            summary.push_str(", has Kafka topics: ");
            summary.push_str(&join(&self.topics));
        }
        summary.push('.');
        summary
    }
}

pub(crate) fn join(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
