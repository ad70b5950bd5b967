//! Typed access to node parameters.
//!
//! Every accessor reports problems as a `ConfigError` naming the node and the
//! field, so a malformed parameter is rejected before the node exists.

use crate::pipeline::error::ConfigError;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    node: &'a str,
    values: &'a BTreeMap<String, toml::Value>,
}

impl<'a> Params<'a> {
    pub fn new(node: &'a str, values: &'a BTreeMap<String, toml::Value>) -> Self {
        Self { node, values }
    }

    pub fn node(&self) -> &str {
        self.node
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn raw(&self, key: &str) -> Option<&'a toml::Value> {
        self.values.get(key)
    }

    fn missing(&self, key: &str) -> ConfigError {
        ConfigError::missing(self.node, key)
    }

    fn invalid(&self, key: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::invalid(self.node, key, reason)
    }

    fn wrong_type(&self, key: &str, expected: &str, got: &toml::Value) -> ConfigError {
        self.invalid(key, format!("expected {}, got {}", expected, got.type_str()))
    }

    pub fn opt_f64(&self, key: &str) -> Result<Option<f64>, ConfigError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(toml::Value::Float(f)) => Ok(Some(*f)),
            Some(toml::Value::Integer(i)) => Ok(Some(*i as f64)),
            Some(other) => Err(self.wrong_type(key, "a number", other)),
        }
    }

    pub fn required_f64(&self, key: &str) -> Result<f64, ConfigError> {
        self.opt_f64(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64, ConfigError> {
        Ok(self.opt_f64(key)?.unwrap_or(default))
    }

    /// A number strictly greater than zero.
    pub fn positive_f64_or(&self, key: &str, default: f64) -> Result<f64, ConfigError> {
        let value = self.f64_or(key, default)?;
        if value > 0.0 {
            Ok(value)
        } else {
            Err(self.invalid(key, format!("must be > 0, got {}", value)))
        }
    }

    pub fn opt_usize(&self, key: &str) -> Result<Option<usize>, ConfigError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(toml::Value::Integer(i)) => usize::try_from(*i)
                .map(Some)
                .map_err(|_| self.invalid(key, format!("must be >= 0, got {}", i))),
            Some(other) => Err(self.wrong_type(key, "an integer", other)),
        }
    }

    pub fn required_usize(&self, key: &str) -> Result<usize, ConfigError> {
        self.opt_usize(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn usize_or(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        Ok(self.opt_usize(key)?.unwrap_or(default))
    }

    /// An integer of at least 1.
    pub fn positive_usize(&self, key: &str, default: Option<usize>) -> Result<usize, ConfigError> {
        let value = match default {
            Some(d) => self.usize_or(key, d)?,
            None => self.required_usize(key)?,
        };
        if value == 0 {
            return Err(self.invalid(key, "must be > 0"));
        }
        Ok(value)
    }

    pub fn opt_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(toml::Value::Boolean(b)) => Ok(Some(*b)),
            Some(other) => Err(self.wrong_type(key, "a boolean", other)),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        Ok(self.opt_bool(key)?.unwrap_or(default))
    }

    pub fn opt_str(&self, key: &str) -> Result<Option<&'a str>, ConfigError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(toml::Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.wrong_type(key, "a string", other)),
        }
    }

    pub fn required_str(&self, key: &str) -> Result<&'a str, ConfigError> {
        self.opt_str(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn str_or(&self, key: &str, default: &'a str) -> Result<&'a str, ConfigError> {
        Ok(self.opt_str(key)?.unwrap_or(default))
    }

    /// A string restricted to `choices`.
    pub fn choice_or(
        &self,
        key: &str,
        choices: &[&str],
        default: &'a str,
    ) -> Result<&'a str, ConfigError> {
        let value = self.str_or(key, default)?;
        if choices.contains(&value) {
            Ok(value)
        } else {
            Err(self.invalid(key, format!("'{}' is not one of {:?}", value, choices)))
        }
    }

    pub fn string_list(&self, key: &str) -> Result<Option<Vec<String>>, ConfigError> {
        let Some(value) = self.values.get(key) else {
            return Ok(None);
        };
        let toml::Value::Array(items) = value else {
            return Err(self.wrong_type(key, "an array of strings", value));
        };
        items
            .iter()
            .map(|item| match item {
                toml::Value::String(s) => Ok(s.clone()),
                other => Err(self.wrong_type(key, "an array of strings", other)),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    pub fn f64_list(&self, key: &str) -> Result<Option<Vec<f64>>, ConfigError> {
        let Some(value) = self.values.get(key) else {
            return Ok(None);
        };
        let toml::Value::Array(items) = value else {
            return Err(self.wrong_type(key, "an array of numbers", value));
        };
        items
            .iter()
            .map(|item| number(item).ok_or_else(|| self.wrong_type(key, "a number", item)))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    /// Array of equal-length number arrays.
    pub fn f64_rows(&self, key: &str) -> Result<Option<Vec<Vec<f64>>>, ConfigError> {
        let Some(value) = self.values.get(key) else {
            return Ok(None);
        };
        let toml::Value::Array(rows) = value else {
            return Err(self.wrong_type(key, "an array of arrays", value));
        };
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let toml::Value::Array(items) = row else {
                return Err(self.wrong_type(key, "an array of arrays", row));
            };
            let parsed = items
                .iter()
                .map(|item| number(item).ok_or_else(|| self.wrong_type(key, "a number", item)))
                .collect::<Result<Vec<_>, _>>()?;
            out.push(parsed);
        }
        if out.windows(2).any(|w| w[0].len() != w[1].len()) {
            return Err(self.invalid(key, "rows have different lengths"));
        }
        Ok(Some(out))
    }

    /// Deserialize a structured parameter.
    pub fn deserialize<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.values
            .get(key)
            .map(|v| v.clone().try_into().map_err(|e| self.invalid(key, e.to_string())))
            .transpose()
    }
}

fn number(value: &toml::Value) -> Option<f64> {
    match value {
        toml::Value::Float(f) => Some(*f),
        toml::Value::Integer(i) => Some(*i as f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::ConfigErrorKind;

    fn values(source: &str) -> BTreeMap<String, toml::Value> {
        toml::from_str(source).unwrap()
    }

    #[test]
    fn test_numbers() {
        let v = values("a = 1\nb = 2.5\nc = \"x\"\nd = -3");
        let p = Params::new("n", &v);
        assert_eq!(p.required_f64("a").unwrap(), 1.0);
        assert_eq!(p.required_f64("b").unwrap(), 2.5);
        assert_eq!(p.f64_or("missing", 4.0).unwrap(), 4.0);
        assert_eq!(p.required_f64("c").unwrap_err().kind(), ConfigErrorKind::Invalid);
        assert_eq!(p.required_usize("missing").unwrap_err().kind(), ConfigErrorKind::Missing);
        assert_eq!(p.required_usize("d").unwrap_err().kind(), ConfigErrorKind::Invalid);
        assert!(p.positive_usize("a", None).is_ok());
        assert!(p.positive_f64_or("d", 1.0).is_err());
    }

    #[test]
    fn test_lists() {
        let v = values("names = [\"a\", \"b\"]\nrows = [[1, 2], [3.5, 4]]\nragged = [[1], [1, 2]]");
        let p = Params::new("n", &v);
        assert_eq!(p.string_list("names").unwrap().unwrap(), vec!["a", "b"]);
        assert_eq!(
            p.f64_rows("rows").unwrap().unwrap(),
            vec![vec![1.0, 2.0], vec![3.5, 4.0]]
        );
        let err = p.f64_rows("ragged").unwrap_err();
        assert_eq!(err.field(), "ragged");
        assert!(p.f64_list("names").is_err());
    }

    #[test]
    fn test_choice() {
        let v = values("fill = \"nearest\"");
        let p = Params::new("sync", &v);
        let err = p
            .choice_or("fill", &["zero_fill", "sample_and_hold"], "zero_fill")
            .unwrap_err();
        assert_eq!(err.node(), "sync");
        assert_eq!(err.kind(), ConfigErrorKind::Invalid);
    }
}
