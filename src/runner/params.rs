//! Query parameters and their translation to BigQuery's named-parameter format.

use std::fmt;
use std::str::FromStr;

use crate::bigquery::{QueryParameter, QueryParameterType, QueryParameterValue};

/// A named query parameter, referenced in SQL as `@name`.
///
/// `param_type` is a BigQuery type tag such as `STRING` or `INT64`. Neither the
/// type nor the value is validated here; the service does that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub param_type: String,
    pub value: String,
}

impl Parameter {
    pub fn new(
        name: impl Into<String>,
        param_type: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            value: value.into(),
        }
    }

    /// Shorthand for a `STRING` parameter.
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, "STRING", value)
    }

    /// Shorthand for an `INT64` parameter.
    pub fn int64(name: impl Into<String>, value: i64) -> Self {
        Self::new(name, "INT64", value.to_string())
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.name, self.param_type, self.value)
    }
}

/// Parses `NAME:TYPE:VALUE`. The value may itself contain colons.
impl FromStr for Parameter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(param_type), Some(value))
                if !name.is_empty() && !param_type.is_empty() =>
            {
                Ok(Self::new(name, param_type, value))
            }
            _ => Err(format!(
                "Invalid parameter: '{s}'. Expected NAME:TYPE:VALUE (e.g., user_name:STRING:rob)"
            )),
        }
    }
}

/// Converts parameters into the nested descriptor list BigQuery expects.
///
/// Returns `None` for absent or empty input so the field is left out of the
/// request entirely.
pub fn to_query_parameters(parameters: Option<&[Parameter]>) -> Option<Vec<QueryParameter>> {
    let parameters = parameters.filter(|p| !p.is_empty())?;

    Some(
        parameters
            .iter()
            .map(|p| QueryParameter {
                name: p.name.clone(),
                parameter_type: QueryParameterType {
                    param_type: p.param_type.clone(),
                },
                parameter_value: QueryParameterValue {
                    value: p.value.clone(),
                },
            })
            .collect(),
    )
}
