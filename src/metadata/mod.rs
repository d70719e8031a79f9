//! Ingestion metadata: deep merge and source-side hints
//!
//! An ingestion pipeline emits one JSON object per extractor and file. Objects
//! naming the same `filename` are folded together with [`merge`]; the result
//! carries `size_bytes` and optionally `checksum`/`checksum_algorithm`, which
//! become [`FileHint`]s so the sync engine does not re-query the source.

use crate::types::{Checksum, ChecksumAlgorithm, FileHint, SyncError};
use camino::Utf8PathBuf;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Deep-merge `overlay` onto `base`.
///
/// Mappings merge key by key, sequences concatenate (base first), and on any
/// other conflict the overlay value wins.
pub fn merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (Value::Array(mut base), Value::Array(overlay)) => {
            base.extend(overlay);
            Value::Array(base)
        }
        (_, overlay) => overlay,
    }
}

/// Normalized relative key for a payload `filename`
fn hint_key(filename: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(filename.trim_start_matches("./").trim_start_matches('/'))
}

/// Fold payload objects (one per line of JSON) into hints keyed by the
/// file's path relative to the source root.
pub fn parse_hints(text: &str) -> Result<HashMap<Utf8PathBuf, FileHint>, SyncError> {
    let mut fragments: HashMap<Utf8PathBuf, Value> = HashMap::new();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .map_err(|e| SyncError::Config(format!("hints line {}: {}", idx + 1, e)))?;
        let Some(filename) = value.get("filename").and_then(Value::as_str) else {
            return Err(SyncError::Config(format!(
                "hints line {}: missing \"filename\"",
                idx + 1
            )));
        };

        let key = hint_key(filename);
        let merged = match fragments.remove(&key) {
            Some(existing) => merge(existing, value),
            None => value,
        };
        fragments.insert(key, merged);
    }

    let mut hints = HashMap::with_capacity(fragments.len());
    for (key, value) in fragments {
        if !value.get("size_bytes").is_some_and(Value::is_u64) {
            warn!("Ignoring hint for {}: no size_bytes", key);
            continue;
        }
        match serde_json::from_value::<FileHint>(strip_to_hint(value)) {
            Ok(mut hint) => {
                hint.checksum = hint
                    .checksum
                    .map(|c| Checksum::new(c.algorithm, c.digest));
                hints.insert(key, hint);
            }
            Err(e) => warn!("Ignoring hint for {}: {}", key, e),
        }
    }

    debug!("Loaded {} file hints", hints.len());
    Ok(hints)
}

/// Keep only the fields a hint is built from
fn strip_to_hint(value: Value) -> Value {
    let Value::Object(mut map) = value else {
        return value;
    };
    let mut kept = Map::new();
    for field in ["size_bytes", "checksum", "checksum_algorithm"] {
        if let Some(v) = map.remove(field) {
            kept.insert(field.to_string(), v);
        }
    }
    // Extractors that predate the algorithm tag always emitted MD5
    if kept.contains_key("checksum") && !kept.contains_key("checksum_algorithm") {
        kept.insert(
            "checksum_algorithm".to_string(),
            Value::String(ChecksumAlgorithm::Md5.to_string()),
        );
    }
    Value::Object(kept)
}

/// Read a JSON-lines hints file
pub fn load_hints(path: &Path) -> Result<HashMap<Utf8PathBuf, FileHint>, SyncError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        SyncError::Config(format!("cannot read hints file {}: {}", path.display(), e))
    })?;
    parse_hints(&text)
}
