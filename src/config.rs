//! Recursive typed configuration tree.
//!
//! Values are one of `{bool, int, float, string, child, list-of-each}`.
//! Numeric getters widen/narrow on read. Used only at construction
//! boundaries (network/layer/classifier setup), never inside hot loops.

use std::collections::BTreeMap;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::{Result, RichardError};

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Child(Config),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
    StrList(Vec<String>),
    ChildList(Vec<Config>),
}

/// A JSON object, keys in deterministic (sorted) order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    entries: BTreeMap<String, ConfigValue>,
}

impl Config {
    pub fn new() -> Self {
        Config {
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ConfigValue) {
        self.entries.insert(key.into(), value);
    }

    fn get(&self, key: &str) -> Result<&ConfigValue> {
        self.entries
            .get(key)
            .ok_or_else(|| RichardError::config(key, "missing key"))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        match self.get(key)? {
            ConfigValue::Bool(b) => Ok(*b),
            _ => Err(RichardError::config(key, "expected bool")),
        }
    }

    /// Widening integer getter: accepts `Int`, narrows from nothing else.
    pub fn get_int(&self, key: &str) -> Result<i64> {
        match self.get(key)? {
            ConfigValue::Int(i) => Ok(*i),
            _ => Err(RichardError::config(key, "expected int")),
        }
    }

    pub fn get_u32(&self, key: &str) -> Result<u32> {
        let i = self.get_int(key)?;
        u32::try_from(i).map_err(|_| RichardError::config(key, "int out of range for u32"))
    }

    pub fn get_usize(&self, key: &str) -> Result<usize> {
        let i = self.get_int(key)?;
        usize::try_from(i).map_err(|_| RichardError::config(key, "int out of range for usize"))
    }

    /// Widening float getter: accepts `Float` or `Int` (widened).
    pub fn get_float(&self, key: &str) -> Result<f64> {
        match self.get(key)? {
            ConfigValue::Float(f) => Ok(*f),
            ConfigValue::Int(i) => Ok(*i as f64),
            _ => Err(RichardError::config(key, "expected float")),
        }
    }

    pub fn get_f32(&self, key: &str) -> Result<f32> {
        self.get_float(key).map(|f| f as f32)
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        match self.get(key)? {
            ConfigValue::Str(s) => Ok(s.as_str()),
            _ => Err(RichardError::config(key, "expected string")),
        }
    }

    pub fn get_child(&self, key: &str) -> Result<&Config> {
        match self.get(key)? {
            ConfigValue::Child(c) => Ok(c),
            _ => Err(RichardError::config(key, "expected object")),
        }
    }

    pub fn get_child_list(&self, key: &str) -> Result<&[Config]> {
        match self.get(key)? {
            ConfigValue::ChildList(c) => Ok(c.as_slice()),
            _ => Err(RichardError::config(key, "expected array of objects")),
        }
    }

    pub fn get_int_list(&self, key: &str) -> Result<&[i64]> {
        match self.get(key)? {
            ConfigValue::IntList(v) => Ok(v.as_slice()),
            _ => Err(RichardError::config(key, "expected array of ints")),
        }
    }

    pub fn get_str_list(&self, key: &str) -> Result<&[String]> {
        match self.get(key)? {
            ConfigValue::StrList(v) => Ok(v.as_slice()),
            _ => Err(RichardError::config(key, "expected array of strings")),
        }
    }

    /// Like `get_float` but returns `None` instead of erroring when the key is absent.
    pub fn get_f32_opt(&self, key: &str) -> Option<f32> {
        self.get_f32(key).ok()
    }

    pub fn get_u32_opt(&self, key: &str) -> Option<u32> {
        self.get_u32(key).ok()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

// serde_json's `Value` has no notion of our dynamic shape, so config
// documents are parsed through a custom Deserialize that maps the JSON
// value model onto ConfigValue directly, preserving object/array/scalar
// shape rather than forcing a fixed struct per layer kind.
impl<'de> Deserialize<'de> for Config {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ConfigVisitor;

        impl<'de> Visitor<'de> for ConfigVisitor {
            type Value = Config;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Config, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut config = Config::new();
                while let Some((key, value)) = map.next_entry::<String, serde_json::Value>()? {
                    let cv = json_to_config_value(value).map_err(de::Error::custom)?;
                    config.insert(key, cv);
                }
                Ok(config)
            }
        }

        deserializer.deserialize_map(ConfigVisitor)
    }
}

fn json_to_config_value(value: serde_json::Value) -> std::result::Result<ConfigValue, String> {
    use serde_json::Value;
    match value {
        Value::Bool(b) => Ok(ConfigValue::Bool(b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(ConfigValue::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(ConfigValue::Float(f))
            } else {
                Err("number out of range".to_string())
            }
        }
        Value::String(s) => Ok(ConfigValue::Str(s)),
        Value::Object(map) => {
            let mut config = Config::new();
            for (k, v) in map {
                config.insert(k, json_to_config_value(v)?);
            }
            Ok(ConfigValue::Child(config))
        }
        Value::Array(items) => classify_array(items),
        Value::Null => Err("null is not a representable config value".to_string()),
    }
}

fn classify_array(items: Vec<serde_json::Value>) -> std::result::Result<ConfigValue, String> {
    use serde_json::Value;
    if items.is_empty() {
        return Ok(ConfigValue::IntList(Vec::new()));
    }
    match &items[0] {
        Value::Object(_) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match json_to_config_value(item)? {
                    ConfigValue::Child(c) => out.push(c),
                    _ => return Err("mixed array element types".to_string()),
                }
            }
            Ok(ConfigValue::ChildList(out))
        }
        Value::String(_) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => out.push(s),
                    _ => return Err("mixed array element types".to_string()),
                }
            }
            Ok(ConfigValue::StrList(out))
        }
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item.as_i64() {
                    Some(i) => out.push(i),
                    None => return Err("mixed array element types".to_string()),
                }
            }
            Ok(ConfigValue::IntList(out))
        }
        Value::Number(_) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item.as_f64() {
                    Some(f) => out.push(f),
                    None => return Err("mixed array element types".to_string()),
                }
            }
            Ok(ConfigValue::FloatList(out))
        }
        _ => Err("unsupported array element type".to_string()),
    }
}

pub fn parse_config(json: &str) -> Result<Config> {
    serde_json::from_str(json).map_err(|e| RichardError::config("<root>", e.to_string()))
}
