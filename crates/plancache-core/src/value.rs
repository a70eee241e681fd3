use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Boolean(Option<bool>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    Float64(Option<f64>),
    Utf8(Option<String>),
    Null,
}

impl ScalarValue {
    /// The fixed constant substituted for a parameter hole's argument while
    /// fingerprinting. Same type and width regardless of the original value,
    /// so any two invocations canonicalize to identical bytes.
    pub fn canonical_placeholder() -> Self {
        ScalarValue::Int32(Some(0))
    }

    pub fn is_null(&self) -> bool {
        matches!(
            self,
            ScalarValue::Null
                | ScalarValue::Boolean(None)
                | ScalarValue::Int32(None)
                | ScalarValue::Int64(None)
                | ScalarValue::Float64(None)
                | ScalarValue::Utf8(None)
        )
    }
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::Boolean(Some(v)) => write!(f, "{}", v),
            ScalarValue::Int32(Some(v)) => write!(f, "{}", v),
            ScalarValue::Int64(Some(v)) => write!(f, "{}", v),
            ScalarValue::Float64(Some(v)) => write!(f, "{}", v),
            ScalarValue::Utf8(Some(v)) => write!(f, "'{}'", v),
            _ => write!(f, "NULL"),
        }
    }
}
