//! Query-like argument sets.

use crate::CodecError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// String-keyed, multi-valued query arguments.
///
/// Values under one key keep their insertion order. The encoded form is a
/// single string: empty for an empty set, otherwise a JSON object mapping each
/// key to its list of values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Args(BTreeMap<String, Vec<String>>);

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `key`, keeping any existing values.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    /// Builder form of [`Args::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    /// All values stored under `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether `key` is present with a value of `"true"`.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key) == Some("true")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        if self.is_empty() {
            return Ok(String::new());
        }
        serde_json::to_string(&self.0).map_err(|e| CodecError::Args(e.to_string()))
    }

    pub fn decode(s: &str) -> Result<Self, CodecError> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(s)
            .map(Self)
            .map_err(|e| CodecError::Args(e.to_string()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Args {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut args = Args::new();
        for (k, v) in iter {
            args.insert(k, v);
        }
        args
    }
}

/// Serde adapter carrying [`Args`] as its encoded string.
pub(crate) mod as_string {
    use super::Args;
    use serde::{Deserialize, Deserializer, Serializer, de, ser};

    pub fn serialize<S: Serializer>(args: &Args, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = args.encode().map_err(ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Args, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Args::decode(&encoded).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_encodes_to_empty_string() {
        let args = Args::new();
        assert_eq!(args.encode().unwrap(), "");
        assert_eq!(Args::decode("").unwrap(), args);
    }

    #[test]
    fn duplicate_keys_and_empty_values_roundtrip() {
        let args = Args::new()
            .with("with_devices", "true")
            .with("tag", "a")
            .with("tag", "")
            .with("tag", "a")
            .with("", "");
        let decoded = Args::decode(&args.encode().unwrap()).unwrap();
        assert_eq!(decoded, args);
        assert_eq!(decoded.get_all("tag"), ["a", "", "a"]);
        assert_eq!(decoded.get(""), Some(""));
    }

    #[test]
    fn lookups() {
        let args: Args = [("name", "net1"), ("with_points", "true")].into_iter().collect();
        assert_eq!(args.get("name"), Some("net1"));
        assert!(args.flag("with_points"));
        assert!(!args.flag("with_devices"));
        assert!(args.get_all("missing").is_empty());
        assert_eq!(args.iter().count(), 2);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(Args::decode("a=1&b=2"), Err(CodecError::Args(_))));
    }
}
