//! YAML config loading with recursive `{include: ...}` resolution,
//! following `config_file_loader.py`'s `walk`/`_load`.

use crate::error::{Error, ErrorType};
use std::path::{Path, PathBuf};

/// Load a config file, resolving `{include: <path>}` / `{include: [<path>,
/// …]}` directives recursively, at any nesting depth. All includes,
/// however deeply nested, are searched relative to the directory of the
/// top-level `path`, not their own containing file, matching the loader
/// this was ported from.
pub fn load(path: &Path) -> Result<Vec<serde_yaml::Value>, Error> {
    if !path.is_file() {
        return Err(Error::new(ErrorType::ConfigFileLoader {
            path: path.display().to_string(),
            reason: "no such file".to_string(),
        }));
    }
    let include_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    load_one(&filename, &include_dir)
}

fn load_one(filename: &str, include_dir: &Path) -> Result<Vec<serde_yaml::Value>, Error> {
    let full_path = include_dir.join(filename);
    if !full_path.is_file() {
        return Err(Error::new(ErrorType::Include {
            filename: filename.to_string(),
            searched: vec![include_dir.display().to_string()],
        }));
    }

    let text = std::fs::read_to_string(&full_path).map_err(|e| {
        Error::new(ErrorType::ConfigFileLoader {
            path: full_path.display().to_string(),
            reason: e.to_string(),
        })
    })?;

    let data: serde_yaml::Value = serde_yaml::from_str(&text).map_err(|e| {
        Error::new(ErrorType::ConfigFileLoader {
            path: full_path.display().to_string(),
            reason: e.to_string(),
        })
    })?;

    let sequence = data.as_sequence().cloned().ok_or_else(|| {
        Error::new(ErrorType::DataError {
            path: full_path.display().to_string(),
        })
    })?;

    walk_sequence(sequence, include_dir)
}

/// Walks a YAML sequence, expanding any `{include: ...}` element in place
/// (one element may expand to zero or more), and recursing into every
/// other element's nested structure.
fn walk_sequence(
    items: Vec<serde_yaml::Value>,
    include_dir: &Path,
) -> Result<Vec<serde_yaml::Value>, Error> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if let Some(include_value) = as_include_directive(&item) {
            out.extend(process_include(include_value, include_dir)?);
        } else {
            out.push(walk_node(item, include_dir)?);
        }
    }
    Ok(out)
}

fn as_include_directive(node: &serde_yaml::Value) -> Option<serde_yaml::Value> {
    let mapping = node.as_mapping()?;
    if mapping.len() != 1 {
        return None;
    }
    let (key, value) = mapping.iter().next().expect("len checked above");
    if key.as_str() == Some("include") {
        Some(value.clone())
    } else {
        None
    }
}

/// Recurses into a node's nested sequences/mappings, expanding includes
/// wherever they appear, without flattening `node` itself (only sequence
/// elements can expand to more than one node).
fn walk_node(node: serde_yaml::Value, include_dir: &Path) -> Result<serde_yaml::Value, Error> {
    match node {
        serde_yaml::Value::Sequence(items) => {
            Ok(serde_yaml::Value::Sequence(walk_sequence(items, include_dir)?))
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut new_mapping = serde_yaml::Mapping::new();
            for (k, v) in mapping {
                new_mapping.insert(k, walk_node(v, include_dir)?);
            }
            Ok(serde_yaml::Value::Mapping(new_mapping))
        }
        other => Ok(other),
    }
}

fn process_include(
    filename_or_list: serde_yaml::Value,
    include_dir: &Path,
) -> Result<Vec<serde_yaml::Value>, Error> {
    if let Some(list) = filename_or_list.as_sequence() {
        let mut out = Vec::new();
        for entry in list {
            let name = entry.as_str().ok_or_else(|| {
                Error::new(ErrorType::InvalidConfig {
                    message: "include list entries must be strings".to_string(),
                })
            })?;
            out.extend(load_one(name, include_dir)?);
        }
        Ok(out)
    } else {
        let name = filename_or_list.as_str().ok_or_else(|| {
            Error::new(ErrorType::InvalidConfig {
                message: "include must be a string or a list of strings".to_string(),
            })
        })?;
        load_one(name, include_dir)
    }
}
