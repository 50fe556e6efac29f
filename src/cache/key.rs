//! Cache Key Module
//!
//! Canonicalises keys to strings. Strings and numbers are valid keys;
//! dynamically typed JSON keys of any other kind are rejected.

use serde_json::Value;

use crate::error::{CacheError, Result};

// == As Key ==
/// A value usable as a single cache key.
pub trait AsKey {
    /// Returns the canonical string form of the key.
    fn to_key(&self) -> Result<String>;
}

impl AsKey for str {
    fn to_key(&self) -> Result<String> {
        Ok(self.to_owned())
    }
}

impl AsKey for String {
    fn to_key(&self) -> Result<String> {
        Ok(self.clone())
    }
}

impl AsKey for Value {
    fn to_key(&self) -> Result<String> {
        match self {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(CacheError::KeyType(json_type_name(other).to_string())),
        }
    }
}

impl<T: AsKey + ?Sized> AsKey for &T {
    fn to_key(&self) -> Result<String> {
        (**self).to_key()
    }
}

macro_rules! integer_keys {
    ($($t:ty),*) => {
        $(
            impl AsKey for $t {
                fn to_key(&self) -> Result<String> {
                    Ok(self.to_string())
                }
            }

            impl AsKeys for $t {
                fn to_keys(&self) -> Result<Vec<String>> {
                    Ok(vec![self.to_key()?])
                }

                fn is_sequence(&self) -> bool {
                    false
                }
            }
        )*
    };
}

// == As Keys ==
/// One key or a sequence of keys, as accepted by `del` and `mget`.
pub trait AsKeys {
    /// Returns every key in canonical form, failing on the first invalid one.
    fn to_keys(&self) -> Result<Vec<String>>;

    /// Whether the input was a sequence rather than a single key.
    fn is_sequence(&self) -> bool {
        true
    }
}

integer_keys!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl AsKeys for str {
    fn to_keys(&self) -> Result<Vec<String>> {
        Ok(vec![self.to_key()?])
    }

    fn is_sequence(&self) -> bool {
        false
    }
}

impl AsKeys for String {
    fn to_keys(&self) -> Result<Vec<String>> {
        Ok(vec![self.to_key()?])
    }

    fn is_sequence(&self) -> bool {
        false
    }
}

impl AsKeys for Value {
    fn to_keys(&self) -> Result<Vec<String>> {
        match self {
            Value::Array(items) => items.iter().map(AsKey::to_key).collect(),
            single => Ok(vec![single.to_key()?]),
        }
    }

    fn is_sequence(&self) -> bool {
        self.is_array()
    }
}

impl<K: AsKey> AsKeys for [K] {
    fn to_keys(&self) -> Result<Vec<String>> {
        self.iter().map(AsKey::to_key).collect()
    }
}

impl<K: AsKey, const N: usize> AsKeys for [K; N] {
    fn to_keys(&self) -> Result<Vec<String>> {
        self.as_slice().to_keys()
    }
}

impl<K: AsKey> AsKeys for Vec<K> {
    fn to_keys(&self) -> Result<Vec<String>> {
        self.as_slice().to_keys()
    }
}

impl<T: AsKeys + ?Sized> AsKeys for &T {
    fn to_keys(&self) -> Result<Vec<String>> {
        (**self).to_keys()
    }

    fn is_sequence(&self) -> bool {
        (**self).is_sequence()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_and_integer_keys() {
        assert_eq!("user:1".to_key().unwrap(), "user:1");
        assert_eq!(String::from("a").to_key().unwrap(), "a");
        assert_eq!(42u32.to_key().unwrap(), "42");
        assert_eq!((-7i64).to_key().unwrap(), "-7");
    }

    #[test]
    fn test_json_keys() {
        assert_eq!(json!("k").to_key().unwrap(), "k");
        assert_eq!(json!(12).to_key().unwrap(), "12");
    }

    #[test]
    fn test_invalid_json_keys() {
        for invalid in [json!(true), json!(null), json!({"a": 1}), json!([1])] {
            assert!(matches!(invalid.to_key(), Err(CacheError::KeyType(_))));
        }
    }

    #[test]
    fn test_key_sequences() {
        let keys = ["a", "b"];
        assert_eq!(keys.to_keys().unwrap(), vec!["a", "b"]);
        assert!(keys.is_sequence());
        assert!(!"a".is_sequence());
        assert_eq!(vec![1, 2].to_keys().unwrap(), vec!["1", "2"]);
    }

    #[test]
    fn test_json_sequence_fails_on_invalid_member() {
        let keys = json!(["a", false]);
        assert!(keys.is_sequence());
        assert!(matches!(keys.to_keys(), Err(CacheError::KeyType(_))));
        assert!(!json!("a").is_sequence());
    }
}
