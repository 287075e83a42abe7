//! Typed settings over the adapter key/value map.
//!
//! Values are stored as text: booleans as `true`/`false`, numbers in their
//! shortest decimal form, structured values as JSON. Typed getters fall back
//! to the caller default when a value is missing or does not parse.

use super::{degrade, write_failed, RepoResult};
use crate::db::StorageAdapter;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

pub struct SettingsRepository {
    adapter: Arc<dyn StorageAdapter>,
}

impl SettingsRepository {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self { adapter }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        degrade("settings.get", self.adapter.get_value(key), None)
    }

    pub fn set(&self, key: &str, value: &str) -> RepoResult<()> {
        self.adapter
            .set_value(key, value)
            .map_err(|err| write_failed("settings.set", err))
    }

    pub fn delete(&self, key: &str) -> RepoResult<()> {
        self.adapter
            .delete_value(key)
            .map_err(|err| write_failed("settings.delete", err))
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).as_deref() {
            Some("true") => true,
            Some("false") => false,
            Some(_) => {
                log_unparsable(key, "bool");
                default
            }
            None => default,
        }
    }

    pub fn set_bool(&self, key: &str, value: bool) -> RepoResult<()> {
        self.set(key, if value { "true" } else { "false" })
    }

    pub fn get_number(&self, key: &str, default: f64) -> f64 {
        let Some(raw) = self.get(key) else {
            return default;
        };
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => value,
            _ => {
                log_unparsable(key, "number");
                default
            }
        }
    }

    pub fn set_number(&self, key: &str, value: f64) -> RepoResult<()> {
        self.set(key, &value.to_string())
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(raw) = self.get(key) else {
            return default;
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(_) => {
                log_unparsable(key, "json");
                default
            }
        }
    }

    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> RepoResult<()> {
        let encoded =
            serde_json::to_string(value).map_err(|err| write_failed("settings.set_json", err))?;
        self.set(key, &encoded)
    }
}

fn log_unparsable(key: &str, expected: &'static str) {
    warn!("event=setting_unparsable module=repo key={key} expected={expected}");
}
