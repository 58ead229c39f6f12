//! Declarative argument descriptors and the shared validation routine.
//!
//! Tools declare their inputs as a static slice of [`ArgSpec`]; one routine
//! validates every call against them. Extraction helpers keep handler code
//! uniform.

use smith_types::SmithError;

/// Top-level JSON type an argument must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Str,
    Int,
    Num,
    Bool,
    List,
    Object,
}

impl ArgKind {
    fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            ArgKind::Str => value.is_string(),
            ArgKind::Int => value.is_i64() || value.is_u64(),
            ArgKind::Num => value.is_number(),
            ArgKind::Bool => value.is_boolean(),
            ArgKind::List => value.is_array(),
            ArgKind::Object => value.is_object(),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            ArgKind::Str => "string",
            ArgKind::Int => "integer",
            ArgKind::Num => "number",
            ArgKind::Bool => "boolean",
            ArgKind::List => "array",
            ArgKind::Object => "object",
        }
    }
}

/// One declared argument: name, expected type, required flag.
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
}

impl ArgSpec {
    pub const fn required(name: &'static str, kind: ArgKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: ArgKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// Every tool accepts an optional per-call timeout override on top of its
/// declared arguments.
pub const TIMEOUT_ARG: ArgSpec = ArgSpec::optional("timeout_ms", ArgKind::Int);

/// Validate an argument record against a tool's descriptors.
///
/// The input must be a JSON object (or null, treated as `{}`); required
/// fields must be present; present fields must match their declared type.
/// Unknown fields are ignored.
pub fn validate_args(specs: &[ArgSpec], args: &serde_json::Value) -> Result<(), SmithError> {
    let obj = match args {
        serde_json::Value::Null => return check_required_absent(specs),
        serde_json::Value::Object(obj) => obj,
        other => {
            return Err(SmithError::BadArguments(format!(
                "arguments must be a JSON object, got {}",
                json_type_name(other)
            )))
        }
    };

    for spec in specs.iter().chain(std::iter::once(&TIMEOUT_ARG)) {
        match obj.get(spec.name) {
            None | Some(serde_json::Value::Null) => {
                if spec.required {
                    return Err(SmithError::BadArguments(format!(
                        "missing required field: {}",
                        spec.name
                    )));
                }
            }
            Some(value) => {
                if !spec.kind.matches(value) {
                    return Err(SmithError::BadArguments(format!(
                        "field {} must be of type {}",
                        spec.name,
                        spec.kind.describe()
                    )));
                }
            }
        }
    }
    Ok(())
}

fn check_required_absent(specs: &[ArgSpec]) -> Result<(), SmithError> {
    if let Some(spec) = specs.iter().find(|s| s.required) {
        return Err(SmithError::BadArguments(format!(
            "missing required field: {}",
            spec.name
        )));
    }
    Ok(())
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Extraction helpers
// ---------------------------------------------------------------------------

/// Required string field. Validation guarantees presence; this is the
/// typed accessor handlers use.
pub fn req_str<'a>(args: &'a serde_json::Value, name: &str) -> Result<&'a str, SmithError> {
    args.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| SmithError::BadArguments(format!("missing required field: {name}")))
}

pub fn opt_str<'a>(args: &'a serde_json::Value, name: &str) -> Option<&'a str> {
    args.get(name).and_then(|v| v.as_str())
}

pub fn opt_u64(args: &serde_json::Value, name: &str) -> Option<u64> {
    args.get(name).and_then(|v| v.as_u64())
}

pub fn req_u64(args: &serde_json::Value, name: &str) -> Result<u64, SmithError> {
    opt_u64(args, name)
        .ok_or_else(|| SmithError::BadArguments(format!("missing required field: {name}")))
}

pub fn opt_bool(args: &serde_json::Value, name: &str, default: bool) -> bool {
    args.get(name).and_then(|v| v.as_bool()).unwrap_or(default)
}

/// Optional list-of-strings field; non-string entries are rejected by
/// validation upstream, so they are silently skipped here.
pub fn opt_str_list(args: &serde_json::Value, name: &str) -> Vec<String> {
    args.get(name)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SPECS: &[ArgSpec] = &[
        ArgSpec::required("file_path", ArgKind::Str),
        ArgSpec::optional("start_line", ArgKind::Int),
        ArgSpec::optional("recursive", ArgKind::Bool),
    ];

    #[test]
    fn accepts_valid_args() {
        assert!(validate_args(SPECS, &json!({"file_path": "a.txt"})).is_ok());
        assert!(
            validate_args(SPECS, &json!({"file_path": "a", "start_line": 3, "recursive": true}))
                .is_ok()
        );
    }

    #[test]
    fn unknown_fields_ignored() {
        assert!(validate_args(SPECS, &json!({"file_path": "a", "wat": [1]})).is_ok());
    }

    #[test]
    fn missing_required_rejected() {
        let err = validate_args(SPECS, &json!({})).unwrap_err();
        assert!(err.to_string().contains("file_path"));

        // Explicit null counts as absent.
        let err = validate_args(SPECS, &json!({"file_path": null})).unwrap_err();
        assert!(err.to_string().contains("file_path"));
    }

    #[test]
    fn wrong_types_rejected() {
        let err = validate_args(SPECS, &json!({"file_path": 7})).unwrap_err();
        assert!(err.to_string().contains("must be of type string"));

        let err =
            validate_args(SPECS, &json!({"file_path": "a", "start_line": "x"})).unwrap_err();
        assert!(err.to_string().contains("start_line"));
    }

    #[test]
    fn non_object_args_rejected() {
        assert!(validate_args(SPECS, &json!("nope")).is_err());
        assert!(validate_args(SPECS, &json!([1, 2])).is_err());
    }

    #[test]
    fn null_args_ok_without_required() {
        const OPTIONAL_ONLY: &[ArgSpec] = &[ArgSpec::optional("limit", ArgKind::Int)];
        assert!(validate_args(OPTIONAL_ONLY, &serde_json::Value::Null).is_ok());
        assert!(validate_args(SPECS, &serde_json::Value::Null).is_err());
    }

    #[test]
    fn timeout_override_is_always_typed() {
        assert!(validate_args(SPECS, &json!({"file_path": "a", "timeout_ms": 500})).is_ok());
        assert!(validate_args(SPECS, &json!({"file_path": "a", "timeout_ms": "soon"})).is_err());
    }

    #[test]
    fn extractors() {
        let args = json!({"s": "v", "n": 9, "b": true, "l": ["a", "b"]});
        assert_eq!(req_str(&args, "s").unwrap(), "v");
        assert!(req_str(&args, "missing").is_err());
        assert_eq!(opt_u64(&args, "n"), Some(9));
        assert!(opt_bool(&args, "b", false));
        assert!(opt_bool(&args, "absent", true));
        assert_eq!(opt_str_list(&args, "l"), vec!["a", "b"]);
        assert!(opt_str_list(&args, "missing").is_empty());
    }
}
