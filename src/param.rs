//! Task parameters and their stable string form.
//!
//! Every value that ends up in a derived path or gets compared by a filter
//! goes through [`render`], so a parameter declared as the integer `5` and a
//! constraint written as the string `"5"` agree with each other.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParamError;
use crate::task::Task;

/// A single named task parameter.
///
/// Parameters are significant by default, which means they take part in the
/// identity of a task run and in its derived output paths.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: Cow<'static, str>,
    significant: bool,
    value: Value,
}

impl Parameter {
    /// Creates a significant parameter from any serializable value.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        value: impl Serialize,
    ) -> Result<Self, ParamError> {
        let name = name.into();
        let value = serde_json::to_value(value).map_err(|source| ParamError::Serialize {
            name: name.to_string(),
            source,
        })?;

        Ok(Self::from_value(name, value))
    }

    /// Creates a significant parameter from an already decoded JSON value.
    pub fn from_value(name: impl Into<Cow<'static, str>>, value: Value) -> Self {
        Self {
            name: name.into(),
            significant: true,
            value,
        }
    }

    /// Excludes this parameter from run identity and path derivation.
    pub fn insignificant(mut self) -> Self {
        self.significant = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_significant(&self) -> bool {
        self.significant
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The stable string form of the value.
    pub fn serialize(&self) -> String {
        render(&self.value)
    }
}

/// Strings are used verbatim, everything else as compact JSON text.
pub(crate) fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Ordered mapping from significant parameter name to its serialized value.
///
/// Order is declaration order and it is part of the identity: equality and
/// hashing both walk the pairs in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerializedParams(IndexMap<String, String>);

impl SerializedParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value. Re-inserting a name replaces the value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for SerializedParams {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().eq(other.0.iter())
    }
}

impl Eq for SerializedParams {}

impl Hash for SerializedParams {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.0.len());
        for (name, value) in &self.0 {
            name.hash(state);
            value.hash(state);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for SerializedParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

impl fmt::Display for SerializedParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// Collects the significant parameters of a task, in declaration order.
pub fn serialize_parameters<T>(task: &T) -> Result<SerializedParams, ParamError>
where
    T: Task + ?Sized,
{
    Ok(task
        .parameters()?
        .into_iter()
        .filter(Parameter::is_significant)
        .map(|param| {
            let value = param.serialize();
            (param.name.into_owned(), value)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_render() {
        assert_eq!(Parameter::new("a", "text").unwrap().serialize(), "text");
        assert_eq!(Parameter::new("a", 5).unwrap().serialize(), "5");
        assert_eq!(Parameter::new("a", 1.5).unwrap().serialize(), "1.5");
        assert_eq!(Parameter::new("a", true).unwrap().serialize(), "true");
        assert_eq!(Parameter::new("a", None::<i32>).unwrap().serialize(), "null");
        assert_eq!(Parameter::new("a", [1, 2]).unwrap().serialize(), "[1,2]");
    }

    #[test]
    fn test_unserializable_value() {
        // JSON object keys must be strings
        let mut map = HashMap::new();
        map.insert((1, 2), 3);

        let err = Parameter::new("grid", map).unwrap_err();
        assert!(err.to_string().contains("'grid'"));
    }

    #[test]
    fn test_order_sensitive_equality() {
        let a: SerializedParams = [("x", "1"), ("y", "2")].into_iter().collect();
        let b: SerializedParams = [("y", "2"), ("x", "1")].into_iter().collect();
        let c: SerializedParams = [("x", "1"), ("y", "2")].into_iter().collect();

        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_reinsert_keeps_position() {
        let mut params = SerializedParams::new();
        params.insert("x", "1");
        params.insert("y", "2");
        params.insert("x", "3");

        assert_eq!(params.to_string(), "x=3, y=2");
    }

    struct Mixed;

    impl Task for Mixed {
        fn parameters(&self) -> Result<Vec<Parameter>, ParamError> {
            Ok(vec![
                Parameter::new("exp", 1003)?,
                Parameter::new("verbose", true)?.insignificant(),
                Parameter::new("run", "5")?,
            ])
        }
    }

    #[test]
    fn test_serialize_parameters_skips_insignificant() {
        let params = serialize_parameters(&Mixed).unwrap();
        let pairs: Vec<_> = params.iter().collect();

        assert_eq!(pairs, vec![("exp", "1003"), ("run", "5")]);
    }
}
