// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Environment variable-based configuration provider implementation.
//!
//! `COURTSIDE_BACKEND__API_KEY` becomes `backend.api_key`: the prefix is
//! stripped, the rest lower-cased and `__` separates nesting levels.  Single
//! underscores are part of the key name.

use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::env;

use super::ConfigError;
use super::ConfigProvider;

const NESTING_SEPARATOR: &str = "__";

/// Configuration provider that retrieves values from environment variables.
#[derive(Debug)]
pub struct EnvConfigProvider {
    /// Prefix for environment variables (e.g., "COURTSIDE_").
    prefix: String,
    /// Dotted key -> raw value, for every variable matching the prefix.
    cache: HashMap<String, String>,
}

impl EnvConfigProvider {
    /// Create a new provider reading every variable that starts with `prefix`.
    pub fn new(prefix: &str) -> Self {
        let mut provider = Self {
            prefix: prefix.to_string(),
            cache: HashMap::new(),
        };
        provider.refresh_cache();
        provider
    }

    /// Re-read the process environment.
    pub fn refresh_cache(&mut self) {
        self.cache.clear();

        for (key, value) in env::vars() {
            if let Some(rest) = key.strip_prefix(&self.prefix) {
                if rest.is_empty() {
                    continue;
                }
                let config_key = rest.to_lowercase().replace(NESTING_SEPARATOR, ".");
                self.cache.insert(config_key, value);
            }
        }
    }

    /// Parse a string value into a JSON Value.
    fn parse_value_to_json(value: &str) -> Value {
        if let Ok(json_value) = serde_json::from_str(value) {
            return json_value;
        }

        if value.eq_ignore_ascii_case("true") {
            return json!(true);
        } else if value.eq_ignore_ascii_case("false") {
            return json!(false);
        }

        // Anything else (including URLs and keys) stays a string
        json!(value)
    }

    /// Assemble an object out of every cached key below `key`.
    fn nested_object(&self, key: &str) -> Option<Value> {
        let prefix = format!("{key}.");
        let mut root = Map::new();

        for (cached_key, raw) in &self.cache {
            let Some(suffix) = cached_key.strip_prefix(&prefix) else {
                continue;
            };

            let parts: Vec<&str> = suffix.split('.').collect();
            insert_path(&mut root, &parts, Self::parse_value_to_json(raw));
        }

        (!root.is_empty()).then_some(Value::Object(root))
    }
}

fn insert_path(map: &mut Map<String, Value>, path: &[&str], value: Value) {
    match path {
        [] => {}
        [leaf] => {
            map.insert((*leaf).to_string(), value);
        }
        [head, rest @ ..] => {
            let child = map
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(inner) = child {
                insert_path(inner, rest, value);
            }
        }
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::new("COURTSIDE_")
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn has(&self, key: &str) -> bool {
        if self.cache.contains_key(key) {
            return true;
        }
        let prefix = format!("{key}.");
        self.cache.keys().any(|k| k.starts_with(&prefix))
    }

    fn provider_name(&self) -> &str {
        "env"
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        match self.cache.get(key) {
            Some(value) => Ok(Some(Self::parse_value_to_json(value))),
            None => Ok(self.nested_object(key)),
        }
    }
}
