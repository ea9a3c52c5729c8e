//! Declared input and output shapes for registered kinds.
//!
//! Schemas check arity and per-position type only. Whether a value makes
//! sense (a negative TVL, an empty oracle list) is the handler's business.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HandlerError, OrchestratorError};

/// Type expected at one argument position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// Any string.
    Text,
    /// A finite decimal number.
    Number,
    /// A signed integer.
    Integer,
    /// A JSON array of strings.
    StringList,
    /// A JSON object.
    JsonObject,
}

impl ParamType {
    fn accepts(&self, raw: &str) -> bool {
        match self {
            Self::Text => true,
            Self::Number => raw.trim().parse::<f64>().is_ok_and(f64::is_finite),
            Self::Integer => raw.trim().parse::<i64>().is_ok(),
            Self::StringList => matches!(
                serde_json::from_str::<Value>(raw),
                Ok(Value::Array(items)) if items.iter().all(Value::is_string)
            ),
            Self::JsonObject => matches!(serde_json::from_str::<Value>(raw), Ok(Value::Object(_))),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "a number",
            Self::Integer => "an integer",
            Self::StringList => "a JSON array of strings",
            Self::JsonObject => "a JSON object",
        }
    }
}

/// One positional parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Name used in error messages.
    pub name: String,
    /// Expected type.
    #[serde(rename = "type")]
    pub ty: ParamType,
    /// Whether the position must be present.
    pub required: bool,
}

impl ParamSpec {
    /// A required parameter.
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
        }
    }

    /// An optional parameter. Optional positions must trail required ones.
    pub fn optional(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
        }
    }
}

/// Ordered parameter list for a kind.
///
/// # Examples
///
/// ```
/// use vcompute::registry::{InputSchema, ParamSpec, ParamType};
///
/// let schema = InputSchema::new(vec![
///     ParamSpec::required("addresses", ParamType::StringList),
///     ParamSpec::optional("threshold", ParamType::Number),
/// ]);
/// let args = vec![r#"["0x1"]"#.to_string()];
/// assert!(schema.validate("oracle_health", &args).is_ok());
///
/// let bad = vec!["0x1".to_string()];
/// assert!(schema.validate("oracle_health", &bad).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSchema {
    /// Parameters in positional order.
    pub params: Vec<ParamSpec>,
}

impl InputSchema {
    /// Schema over `params`.
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }

    /// Smallest accepted argument count.
    pub fn min_arity(&self) -> usize {
        self.params.iter().filter(|p| p.required).count()
    }

    /// Largest accepted argument count.
    pub fn max_arity(&self) -> usize {
        self.params.len()
    }

    /// Checks arity and the type at each position.
    pub fn validate(&self, kind: &str, args: &[String]) -> Result<(), OrchestratorError> {
        let (min, max) = (self.min_arity(), self.max_arity());
        if args.len() < min || args.len() > max {
            let expected = if min == max {
                format!("{min}")
            } else {
                format!("{min} to {max}")
            };
            return Err(OrchestratorError::invalid_arguments(
                kind,
                format!("expected {expected} arguments, got {}", args.len()),
            ));
        }

        for (spec, raw) in self.params.iter().zip(args) {
            if !spec.ty.accepts(raw) {
                return Err(OrchestratorError::invalid_arguments(
                    kind,
                    format!("{} must be {}, got {raw:?}", spec.name, spec.ty.describe()),
                ));
            }
        }
        Ok(())
    }
}

/// Fields every output of a kind must carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSchema {
    /// Required top-level field names.
    pub required: Vec<String>,
}

impl OutputSchema {
    /// Schema requiring `fields`.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Checks that `output` is an object containing every required field.
    pub fn validate(&self, output: &Value) -> Result<(), HandlerError> {
        let missing: Vec<String> = match output {
            Value::Object(map) => self
                .required
                .iter()
                .filter(|field| !map.contains_key(field.as_str()))
                .cloned()
                .collect(),
            _ => self.required.clone(),
        };
        if missing.is_empty() {
            Ok(())
        } else {
            Err(HandlerError::OutputSchema { missing })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(ParamType::Text, "anything", true)]
    #[case(ParamType::Number, "0.25", true)]
    #[case(ParamType::Number, "inf", false)]
    #[case(ParamType::Number, "abc", false)]
    #[case(ParamType::Integer, "1700000000", true)]
    #[case(ParamType::Integer, "1.5", false)]
    #[case(ParamType::StringList, r#"["a","b"]"#, true)]
    #[case(ParamType::StringList, "[1,2]", false)]
    #[case(ParamType::StringList, "a,b", false)]
    #[case(ParamType::JsonObject, r#"{"a":1}"#, true)]
    #[case(ParamType::JsonObject, "[]", false)]
    fn param_type_checks(#[case] ty: ParamType, #[case] raw: &str, #[case] ok: bool) {
        assert_eq!(ty.accepts(raw), ok);
    }

    #[test]
    fn arity_bounds_account_for_optional_params() {
        let schema = InputSchema::new(vec![
            ParamSpec::required("a", ParamType::Text),
            ParamSpec::optional("b", ParamType::Number),
        ]);
        assert!(schema.validate("k", &["x".to_string()]).is_ok());
        assert!(schema.validate("k", &["x".to_string(), "1".to_string()]).is_ok());

        let err = schema.validate("k", &[]).unwrap_err();
        assert!(err.to_string().contains("expected 1 to 2 arguments, got 0"));
    }

    #[test]
    fn output_schema_reports_missing_fields() {
        let schema = OutputSchema::new(["risk_score", "risk_factors"]);
        assert!(schema.validate(&json!({"risk_score": 0.1, "risk_factors": {}})).is_ok());
        assert_eq!(
            schema.validate(&json!({"risk_score": 0.1})),
            Err(HandlerError::OutputSchema {
                missing: vec!["risk_factors".to_string()]
            })
        );
        assert!(schema.validate(&json!(null)).is_err());
    }
}
