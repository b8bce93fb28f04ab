//! Typed configuration values, coerced from the raw string stored on
//! disk with one consistent precedence: literal `True`/`False` →
//! boolean; else parseable integer → integer; else parseable float →
//! float; else string. Every reader goes through this one function
//! rather than special-casing option names or duplicating coercion
//! logic per call site.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ConfigValue {
    pub fn coerce(raw: &str) -> Self {
        match raw {
            "True" => ConfigValue::Bool(true),
            "False" => ConfigValue::Bool(false),
            _ => {
                if let Ok(i) = raw.parse::<i64>() {
                    ConfigValue::Int(i)
                } else if let Ok(f) = raw.parse::<f64>() {
                    ConfigValue::Float(f)
                } else {
                    ConfigValue::Str(raw.to_string())
                }
            }
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Int(i) => write!(f, "{}", i),
            ConfigValue::Float(x) => write!(f, "{}", x),
            ConfigValue::Str(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn coerces_bool_literals() {
        assert_eq!(ConfigValue::coerce("True"), ConfigValue::Bool(true));
        assert_eq!(ConfigValue::coerce("False"), ConfigValue::Bool(false));
    }

    #[test]
    fn coerces_integers_before_floats() {
        assert_eq!(ConfigValue::coerce("42"), ConfigValue::Int(42));
        assert_eq!(ConfigValue::coerce("-7"), ConfigValue::Int(-7));
    }

    #[test]
    fn coerces_floats() {
        assert_eq!(ConfigValue::coerce("1.5"), ConfigValue::Float(1.5));
    }

    #[test]
    fn falls_back_to_string() {
        assert_eq!(
            ConfigValue::coerce("eth0"),
            ConfigValue::Str("eth0".to_string())
        );
    }

    proptest! {
        #[test]
        fn integers_never_fall_through_to_string(i in any::<i64>()) {
            prop_assert_eq!(ConfigValue::coerce(&i.to_string()), ConfigValue::Int(i));
        }
    }
}
