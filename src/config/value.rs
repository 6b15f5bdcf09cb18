use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Flat configuration mapping from parameter name to value
pub type ParamMap = BTreeMap<String, ParamValue>;

/// A configuration value, either raw (as read from a run file) or coerced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Explicitly unset (`None` in legacy files)
    Null,
    Bool(bool),
    Number(f64),
    /// Raw text or a path-like value
    Text(String),
    /// Numeric list; a `None` entry is the null sentinel ("no noise", "unset")
    Numbers(Vec<Option<f64>>),
    /// Ordered list of numeric vectors (resize profiles)
    NumberLists(Vec<Vec<f64>>),
    /// Ordered list of name tokens
    Texts(Vec<String>),
    /// One flag per combination/trial
    Flags(Vec<bool>),
}

impl ParamValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn numbers(values: &[f64]) -> Self {
        Self::Numbers(values.iter().copied().map(Some).collect())
    }

    pub fn texts(values: &[&str]) -> Self {
        Self::Texts(values.iter().map(|s| s.to_string()).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Scalar view: a number, or the first non-null entry of a list
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Numbers(values) => values.iter().flatten().next().copied(),
            _ => None,
        }
    }

    /// Non-null numeric entries, in order
    pub fn as_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Self::Number(n) => Some(vec![*n]),
            Self::Numbers(values) => Some(values.iter().flatten().copied().collect()),
            _ => None,
        }
    }

    pub fn as_texts(&self) -> Option<&[String]> {
        match self {
            Self::Texts(values) => Some(values),
            _ => None,
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Renders values so that the legacy coercion rules read them back unchanged.
impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "None"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
            Self::Numbers(values) => {
                let parts: Vec<String> = values
                    .iter()
                    .map(|v| match v {
                        Some(n) => n.to_string(),
                        None => "None".to_string(),
                    })
                    .collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::NumberLists(lists) => {
                let parts: Vec<String> = lists
                    .iter()
                    .map(|list| {
                        let inner: Vec<String> = list.iter().map(|n| n.to_string()).collect();
                        format!("[{}]", inner.join(","))
                    })
                    .collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::Texts(values) => write!(f, "[{}]", values.join(", ")),
            Self::Flags(values) => {
                let parts: Vec<&str> = values
                    .iter()
                    .map(|b| if *b { "True" } else { "False" })
                    .collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_legacy_tokens() {
        assert_eq!(ParamValue::Null.to_string(), "None");
        assert_eq!(ParamValue::Bool(false).to_string(), "False");
        assert_eq!(
            ParamValue::Numbers(vec![None, Some(5.0)]).to_string(),
            "[None, 5]"
        );
        assert_eq!(
            ParamValue::NumberLists(vec![vec![1.0, 0.5, 0.5], vec![2.0]]).to_string(),
            "[[1,0.5,0.5], [2]]"
        );
        assert_eq!(
            ParamValue::Flags(vec![true, false]).to_string(),
            "[True, False]"
        );
    }

    #[test]
    fn test_numeric_views_skip_null_sentinel() {
        let value = ParamValue::Numbers(vec![Some(0.001), None, Some(1.0)]);
        assert_eq!(value.as_f64(), Some(0.001));
        assert_eq!(value.as_f64_vec(), Some(vec![0.001, 1.0]));
        assert_eq!(ParamValue::Number(3.0).as_f64_vec(), Some(vec![3.0]));
        assert_eq!(ParamValue::text("x").as_f64(), None);
    }
}
