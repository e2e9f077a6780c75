// Nested numeric-array data files.
//
// Input data for specialized kernels arrives as JSON arrays of arbitrary
// nesting depth. Loading flattens the structure depth-first,
// left-to-right, into one flat sequence of f64 values; all shape
// information is discarded because the kernels consume flat buffers.
// Any non-numeric leaf is a data-format error.

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::Value;

/// Errors raised while loading an array data file.
#[derive(Debug)]
pub enum DataError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    NonNumericLeaf {
        path: PathBuf,
        found: &'static str,
    },
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::Io { path, source } => {
                write!(f, "{}: {}", path.display(), source)
            }
            DataError::Parse { path, source } => {
                write!(f, "{}: invalid JSON: {}", path.display(), source)
            }
            DataError::NonNumericLeaf { path, found } => {
                write!(f, "{}: non-numeric leaf value ({})", path.display(), found)
            }
        }
    }
}

impl std::error::Error for DataError {}

/// Load and flatten a nested array data file.
pub fn load(path: &Path) -> Result<Vec<f64>, DataError> {
    let text = std::fs::read_to_string(path).map_err(|e| DataError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|e| DataError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    flatten_value(&value).map_err(|found| DataError::NonNumericLeaf {
        path: path.to_path_buf(),
        found,
    })
}

/// Flatten a parsed JSON value depth-first, left-to-right.
///
/// On failure the error names the kind of the offending leaf.
pub fn flatten_value(value: &Value) -> Result<Vec<f64>, &'static str> {
    let mut out = Vec::new();
    flatten_into(value, &mut out)?;
    Ok(out)
}

fn flatten_into(value: &Value, out: &mut Vec<f64>) -> Result<(), &'static str> {
    match value {
        Value::Number(n) => {
            out.push(n.as_f64().ok_or("number")?);
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                flatten_into(item, out)?;
            }
            Ok(())
        }
        Value::String(_) => Err("string"),
        Value::Bool(_) => Err("boolean"),
        Value::Null => Err("null"),
        Value::Object(_) => Err("object"),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn flatten_str(text: &str) -> Result<Vec<f64>, &'static str> {
        let value: Value = serde_json::from_str(text).expect("test JSON must parse");
        flatten_value(&value)
    }

    #[test]
    fn flat_array() {
        assert_eq!(flatten_str("[1.0, 2.0, 3.5]").unwrap(), vec![1.0, 2.0, 3.5]);
    }

    #[test]
    fn integers_widen_to_f64() {
        assert_eq!(flatten_str("[1, 2, 3]").unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn nested_arrays_flatten_depth_first() {
        assert_eq!(
            flatten_str("[[1, 2], [3, [4, 5]], 6]").unwrap(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );
    }

    #[test]
    fn deep_nesting() {
        assert_eq!(flatten_str("[[[[[7]]]]]").unwrap(), vec![7.0]);
    }

    #[test]
    fn scalar_document() {
        assert_eq!(flatten_str("42").unwrap(), vec![42.0]);
    }

    #[test]
    fn empty_arrays_flatten_to_nothing() {
        assert_eq!(flatten_str("[[], []]").unwrap(), Vec::<f64>::new());
    }

    #[test]
    fn string_leaf_is_rejected() {
        assert_eq!(flatten_str("[1, \"two\", 3]"), Err("string"));
    }

    #[test]
    fn null_and_bool_leaves_are_rejected() {
        assert_eq!(flatten_str("[null]"), Err("null"));
        assert_eq!(flatten_str("[true]"), Err("boolean"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        std::fs::write(&path, "[[1.0, 2.0], [3.0, 4.0]]").unwrap();
        assert_eq!(load(&path).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn load_reports_bad_leaf_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[1, \"x\"]").unwrap();
        let err = load(&path).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("bad.json"));
        assert!(msg.contains("non-numeric leaf"));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = load(Path::new("/nonexistent/input.json")).unwrap_err();
        assert!(matches!(err, DataError::Io { .. }));
    }

    #[test]
    fn load_invalid_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "[1, 2,").unwrap();
        assert!(matches!(load(&path).unwrap_err(), DataError::Parse { .. }));
    }
}
