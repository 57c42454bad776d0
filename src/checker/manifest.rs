//! Manifest discovery and decoding.
//!
//! Inputs are files, directories or `-` for stdin. Every input may hold
//! several YAML or JSON documents, and `*List` documents are flattened into
//! their items.

use std::io::Read;
use std::path::{Path, PathBuf};

use kube::core::DynamicObject;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Path that reads from standard input
pub const STDIN: &str = "-";

const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Load every object from the given inputs, in input order
pub fn load(inputs: &[String], recursive: bool) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    for input in inputs {
        if input == STDIN {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .map_err(|source| Error::Manifest {
                    path: PathBuf::from("<stdin>"),
                    source,
                })?;
            objects.extend(parse(Path::new("<stdin>"), &content)?);
            continue;
        }

        for path in expand(Path::new(input), recursive)? {
            let content = std::fs::read_to_string(&path).map_err(|source| Error::Manifest {
                path: path.clone(),
                source,
            })?;
            let parsed = parse(&path, &content)?;
            debug!(path = %path.display(), objects = parsed.len(), "Loaded manifest");
            objects.extend(parsed);
        }
    }
    Ok(objects)
}

/// Expand a path into manifest files. Explicit files are always kept;
/// directory entries only when they carry a manifest extension.
fn expand(path: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let metadata = std::fs::metadata(path).map_err(|source| Error::Manifest {
        path: path.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let walker = WalkDir::new(path)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .follow_links(true)
        .sort_by_file_name();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| Error::Manifest {
            path: e.path().unwrap_or(path).to_path_buf(),
            source: e.into(),
        })?;
        if entry.file_type().is_file() && has_manifest_extension(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn has_manifest_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MANIFEST_EXTENSIONS.contains(&ext))
}

/// Decode every document in `content`
pub fn parse(path: &Path, content: &str) -> Result<Vec<DynamicObject>> {
    let decode_error = |message: String| Error::Decode {
        path: path.to_path_buf(),
        message,
    };

    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = Value::deserialize(document).map_err(|e| decode_error(e.to_string()))?;
        for value in flatten(value) {
            let object: DynamicObject =
                serde_json::from_value(value).map_err(|e| decode_error(e.to_string()))?;
            if object.types.is_none() {
                return Err(decode_error(format!(
                    "object {:?} is missing apiVersion or kind",
                    object.metadata.name.unwrap_or_default()
                )));
            }
            objects.push(object);
        }
    }
    Ok(objects)
}

/// Skip empty documents and unwrap `*List` kinds
fn flatten(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Object(mut fields) => {
            let is_list = fields
                .get("kind")
                .and_then(Value::as_str)
                .is_some_and(|kind| kind.ends_with("List"));
            if is_list && let Some(Value::Array(items)) = fields.remove("items") {
                items.into_iter().flat_map(flatten).collect()
            } else {
                vec![Value::Object(fields)]
            }
        }
        other => vec![other],
    }
}
