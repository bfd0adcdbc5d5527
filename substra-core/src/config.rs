//! Engine configuration.
//!
//! Configuration is declarative and can be loaded from YAML or JSON.
//! All fields have defaults, so an empty document is a valid configuration.
//!
//! # Example (YAML)
//! ```yaml
//! node_id: local-backend
//! work_dir: ./local-worker
//! pool_size: 2
//! execution_timeout_secs: 600
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, ErrorType};

pub const DEFAULT_NODE_ID: &str = "local-backend";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Identity of this node. Owner and creator of every asset it creates,
    /// and implicitly authorized on its own private assets.
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Root of the worker filesystem layout.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Maximal number of units executing at the same time.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Units running longer than this are failed with a timeout.
    #[serde(default)]
    pub execution_timeout_secs: Option<u64>,
}

fn default_node_id() -> String {
    DEFAULT_NODE_ID.to_owned()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("local-worker")
}

fn default_pool_size() -> usize {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            node_id: default_node_id(),
            work_dir: default_work_dir(),
            pool_size: default_pool_size(),
            execution_timeout_secs: None,
        }
    }
}

impl EngineConfig {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        EngineConfig {
            work_dir: work_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_node_id(mut self, node_id: &str) -> Self {
        self.node_id = node_id.to_owned();
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn execution_timeout(&self) -> Option<Duration> {
        self.execution_timeout_secs.map(Duration::from_secs)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        serde_yaml::from_str(yaml).map_err(|e| {
            Error::new(
                ErrorType::SerializationError,
                format!("Failed to parse YAML configuration: {}", e),
            )
        })
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| {
            Error::new(
                ErrorType::SerializationError,
                format!("Failed to parse JSON configuration: {}", e),
            )
        })
    }

    /// Serialize configuration to YAML string.
    pub fn to_yaml(&self) -> Result<String, Error> {
        serde_yaml::to_string(self).map_err(|e| {
            Error::new(
                ErrorType::SerializationError,
                format!("Failed to serialize configuration to YAML: {}", e),
            )
        })
    }
}
