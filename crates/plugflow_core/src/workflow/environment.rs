//! Per-run variable environment.

use serde_json::{Map, Value};

/// Prefix marking a variable reference in step operands.
pub const VARIABLE_SIGIL: char = '$';

/// Mutable name -> value bindings of one workflow run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    variables: Map<String, Value>,
}

impl Environment {
    pub fn new(variables: Map<String, Value>) -> Self {
        Self { variables }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Binds `name`, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Overlays every entry of `values` onto the current bindings.
    pub fn extend(&mut self, values: &Map<String, Value>) {
        for (name, value) in values {
            self.variables.insert(name.clone(), value.clone());
        }
    }

    /// Resolves a `$name` reference.
    ///
    /// Non-string values and strings without the sigil pass through. An
    /// unbound reference is returned as its literal text.
    pub fn resolve(&self, value: &Value) -> Value {
        let Some(reference) = value.as_str() else {
            return value.clone();
        };
        match reference.strip_prefix(VARIABLE_SIGIL) {
            Some(name) => self.get(name).cloned().unwrap_or_else(|| value.clone()),
            None => value.clone(),
        }
    }

    pub fn resolve_all(&self, values: &[Value]) -> Vec<Value> {
        values.iter().map(|value| self.resolve(value)).collect()
    }

    pub fn resolve_map(&self, values: &Map<String, Value>) -> Map<String, Value> {
        values
            .iter()
            .map(|(name, value)| (name.clone(), self.resolve(value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::Environment;
    use serde_json::{json, Map, Value};

    fn env() -> Environment {
        let mut variables = Map::new();
        variables.insert("x".to_string(), json!(42));
        variables.insert("dir".to_string(), json!("/tmp/out"));
        Environment::new(variables)
    }

    #[test]
    fn resolves_bound_references() {
        let env = env();
        assert_eq!(env.resolve(&json!("$x")), json!(42));
        assert_eq!(env.resolve(&json!("$dir")), json!("/tmp/out"));
    }

    #[test]
    fn unbound_references_stay_literal() {
        let env = env();
        assert_eq!(env.resolve(&json!("$y")), json!("$y"));
        assert_eq!(env.resolve(&json!("$")), json!("$"));
    }

    #[test]
    fn plain_values_pass_through() {
        let env = env();
        assert_eq!(env.resolve(&json!("x")), json!("x"));
        assert_eq!(env.resolve(&json!(7)), json!(7));
        assert_eq!(env.resolve(&Value::Null), Value::Null);
        assert_eq!(env.resolve(&json!(["$x"])), json!(["$x"]));
    }

    #[test]
    fn collections_resolve_each_entry() {
        let env = env();
        assert_eq!(
            env.resolve_all(&[json!("$x"), json!("lit")]),
            vec![json!(42), json!("lit")]
        );
        let mut kwargs = Map::new();
        kwargs.insert("target".to_string(), json!("$dir"));
        assert_eq!(env.resolve_map(&kwargs)["target"], json!("/tmp/out"));
    }

    #[test]
    fn set_overwrites_existing_bindings() {
        let mut env = env();
        env.set("x", json!("replaced"));
        assert_eq!(env.get("x"), Some(&json!("replaced")));
        assert!(env.contains("dir"));
    }
}
