use crate::value::Value;
use sha2::{Digest, Sha256};

/// Stable dedup fingerprint for a work item carrying a concrete (cols,
/// value) pair. Used as the extractor's seen-set key so that re-running
/// the same extraction always dedupes identically, which `std::hash::Hash`
/// (whose `DefaultHasher` output is not guaranteed stable across compiler
/// versions) cannot promise.
pub fn value_hash(subject: usize, table: usize, cols: &[usize], value: &[Value], sticky: bool) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"value");
    hasher.update(subject.to_le_bytes());
    hasher.update(table.to_le_bytes());
    for col in cols {
        hasher.update(col.to_le_bytes());
    }
    for v in value {
        hash_value(&mut hasher, v);
    }
    hasher.update([if sticky { 1u8 } else { 0u8 }]);
    format!("{:x}", hasher.finalize())
}

/// Dedup fingerprint for a full-table-scan work item (no `cols`/`values`).
pub fn non_value_hash(subject: usize, table: usize, sticky: bool) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"novalue");
    hasher.update(subject.to_le_bytes());
    hasher.update(table.to_le_bytes());
    hasher.update([if sticky { 1u8 } else { 0u8 }]);
    format!("{:x}", hasher.finalize())
}

fn hash_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update(b"null"),
        Value::Integer(i) => {
            hasher.update(b"int");
            hasher.update(i.to_le_bytes());
        }
        Value::Real(f) => {
            hasher.update(b"real");
            hasher.update(f.to_bits().to_le_bytes());
        }
        Value::Text(s) => {
            hasher.update(b"text");
            hasher.update(s.as_bytes());
        }
        Value::Blob(b) => {
            hasher.update(b"blob");
            hasher.update(b);
        }
    }
    hasher.update([0u8]);
}
