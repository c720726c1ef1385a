use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::adapters::Platform;

/// Top-level keys that configure the gateway itself rather than a route.
const GLOBAL_KEYS: [&str; 3] = ["route", "heartbeat_url", "heartbeat_interval"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(
        "config is missing the 'route' field or it is empty; \
         use \"route\": \"/\" for no prefix or \"route\": \"/push\" for a prefix"
    )]
    MissingRoute,
}

/// One named route: the platform type it declares and its adapter settings.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub name: String,
    pub kind: String,
    pub settings: Map<String, Value>,
}

impl RouteConfig {
    /// `None` when the declared type is not one the gateway can send to.
    pub fn platform(&self) -> Option<Platform> {
        Platform::from_kind(&self.kind)
    }
}

/// A missing `type` reads as `""` and a missing or `null` config as empty.
#[derive(Debug, Deserialize)]
struct RawRoute {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    config: Option<Map<String, Value>>,
}

/// Immutable gateway configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub route: String,
    pub heartbeat_url: String,
    pub heartbeat_interval: u64,
    routes: BTreeMap<String, RouteConfig>,
}

impl GatewayConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_slice(&data)
    }

    /// Parses a config document. Route entries that do not decode into
    /// `{type, config}` (not an object, or fields of the wrong JSON type) are
    /// skipped so the remaining routes stay usable.
    pub fn from_json_slice(data: &[u8]) -> Result<Self, ConfigError> {
        let raw: Map<String, Value> = serde_json::from_slice(data)?;

        let route = raw
            .get("route")
            .and_then(|value| value.as_str())
            .unwrap_or("")
            .to_string();
        let heartbeat_url = raw
            .get("heartbeat_url")
            .and_then(|value| value.as_str())
            .unwrap_or("")
            .to_string();
        let heartbeat_interval = raw
            .get("heartbeat_interval")
            .and_then(value_to_seconds)
            .unwrap_or(0);

        let mut routes = BTreeMap::new();
        for (name, value) in &raw {
            if GLOBAL_KEYS.contains(&name.as_str()) {
                continue;
            }
            match RawRoute::deserialize(value) {
                Ok(entry) => {
                    routes.insert(
                        name.clone(),
                        RouteConfig {
                            name: name.clone(),
                            kind: entry.kind,
                            settings: entry.config.unwrap_or_default(),
                        },
                    );
                }
                Err(err) => {
                    tracing::warn!("skipping malformed route '{}': {}", name, err);
                }
            }
        }

        if route.is_empty() {
            return Err(ConfigError::MissingRoute);
        }

        Ok(Self {
            route,
            heartbeat_url,
            heartbeat_interval,
            routes,
        })
    }

    pub fn get_route(&self, name: &str) -> Option<&RouteConfig> {
        self.routes.get(name)
    }

    pub fn routes(&self) -> impl Iterator<Item = &RouteConfig> {
        self.routes.values()
    }

    /// The route prefix without surrounding slashes, or `None` when the
    /// configured prefix is `""` or `"/"`.
    pub fn route_prefix(&self) -> Option<&str> {
        let trimmed = self.route.trim_matches('/');
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }

    /// Path under which a route is served, without a leading slash.
    pub fn route_path(&self, name: &str) -> String {
        match self.route_prefix() {
            Some(prefix) => format!("{}/{}", prefix, name),
            None => name.to_string(),
        }
    }
}

fn value_to_seconds(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|secs| *secs >= 0.0).map(|secs| secs as u64))
}
