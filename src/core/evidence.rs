use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema-free supporting data captured alongside a verdict.
///
/// Serialized as a plain JSON object; key order is the insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Evidence(Map<String, Value>);

impl Evidence {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_flat_object_in_insertion_order() {
        let ev = Evidence::new()
            .with("zeta", 1)
            .with("alpha", true)
            .with("items", vec!["a", "b"]);
        let s = serde_json::to_string(&ev).expect("serialize");
        assert_eq!(s, r#"{"zeta":1,"alpha":true,"items":["a","b"]}"#);
    }
}
