//! Positional call arguments.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;

/// Positional arguments of one action call.
///
/// The shape is action-specific; the dispatcher only reads the leading
/// slots its scoping rule names, handlers read the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs(Vec<Value>);

impl CallArgs {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Slot `index` as a string, if it is one.
    pub fn str(&self, index: usize) -> Option<&str> {
        self.0.get(index).and_then(Value::as_str)
    }

    /// Deserialize slot `index`; a missing slot decodes as `null`.
    pub fn decode<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let value = self.0.get(index).cloned().unwrap_or(Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for CallArgs {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl<const N: usize> From<[Value; N]> for CallArgs {
    fn from(values: [Value; N]) -> Self {
        Self(values.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slot_access() {
        let args = CallArgs::from([json!("m1"), json!(3)]);
        assert_eq!(args.len(), 2);
        assert_eq!(args.str(0), Some("m1"));
        assert_eq!(args.str(1), None);
        assert_eq!(args.get(1), Some(&json!(3)));
        assert!(args.get(2).is_none());
    }

    #[test]
    fn test_decode() {
        let args = CallArgs::from([json!("m1"), json!({"name": "revenue"})]);

        let id: String = args.decode(0).unwrap();
        assert_eq!(id, "m1");

        let missing: Option<u32> = args.decode(5).unwrap();
        assert_eq!(missing, None);

        assert!(args.decode::<u32>(0).is_err());
    }

    #[test]
    fn test_empty() {
        let args = CallArgs::default();
        assert!(args.is_empty());
        assert_eq!(args.into_inner(), Vec::<Value>::new());
    }
}
