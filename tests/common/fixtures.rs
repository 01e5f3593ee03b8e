//! Trace fixtures
//!
//! Builds JSON Lines traces in a temporary directory so tests can load them
//! the same way the CLI does.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tempfile::TempDir;

/// A trace file that lives as long as this value
pub struct TraceFile {
    dir: TempDir,
    path: PathBuf,
}

impl TraceFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the trace lives in; usable as a scratch data dir
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Accumulates trace records in order
#[derive(Default)]
pub struct TraceBuilder {
    lines: Vec<String>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, id: u64) -> Self {
        self.lines.push(json!({"type": "node", "id": id}).to_string());
        self
    }

    pub fn edge(mut self, parent: u64, child: u64) -> Self {
        self.lines
            .push(json!({"type": "edge", "parent": parent, "child": child}).to_string());
        self
    }

    pub fn memory(mut self, node: u64, delta: Value) -> Self {
        self.lines
            .push(json!({"type": "memory", "node": node, "delta": delta}).to_string());
        self
    }

    /// A line passed through untouched
    pub fn raw(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    /// The records as JSON Lines text
    pub fn contents(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }

    pub fn write(self) -> TraceFile {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("trace.jsonl");
        fs::write(&path, self.contents()).expect("Failed to write trace");
        TraceFile { dir, path }
    }
}

/// Wrap delta sections in the `objects` envelope
pub fn delta(added: Vec<Value>, changed: Vec<Value>, deleted: Vec<u64>) -> Value {
    let deleted: Vec<Value> = deleted
        .into_iter()
        .map(|id| json!({"objID": id, "type": "DELETION"}))
        .collect();
    json!({"objects": {"added": added, "changed": changed, "deleted": deleted}})
}

/// A complete "added" entry with a segment plane holding `bytes`
pub fn added_object(id: u64, name: &str, bytes: Value) -> Value {
    json!({
        "objID": id,
        "segment": 0,
        "name": name,
        "size": "4",
        "isLocal": true,
        "isGlobal": false,
        "isFixed": false,
        "isUserSpec": false,
        "isLazy": false,
        "readOnly": false,
        "symAddress": "",
        "copyOnWriteOwner": 0,
        "allocSite": {"scope": "main", "name": name, "code": "alloca"},
        "segmentPlane": {
            "type": "segment",
            "memoryObjectID": id,
            "rootObject": "",
            "sizeBound": 4,
            "initialized": true,
            "symbolic": false,
            "initialValue": "0",
            "bytes": bytes,
            "updates": []
        }
    })
}

/// A "changed" entry touching only the segment plane
pub fn changed_bytes(id: u64, bytes: Value) -> Value {
    json!({
        "objID": id,
        "segmentPlane": {"bytes": bytes}
    })
}

/// A "changed" entry appending to the segment plane's update log
pub fn changed_updates(id: u64, updates: Value) -> Value {
    json!({
        "objID": id,
        "segmentPlane": {"updates": updates}
    })
}

/// A concrete byte group `[concrete, knownSymbolic, unflushed, value, idx...]`
pub fn concrete(value: &str, offsets: &[u64]) -> Value {
    let mut group = vec![json!(true), json!(false), json!(false), json!(value)];
    group.extend(offsets.iter().map(|o| json!(o)));
    Value::Array(group)
}

pub fn add_bytes(groups: Vec<Value>) -> Value {
    json!({"add": groups})
}

pub fn replace_bytes(add: Vec<Value>, del: Vec<Value>) -> Value {
    json!({"add": add, "del": del})
}
