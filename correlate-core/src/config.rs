use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::CorrelateError;
use crate::models::InstanceDescriptor;
use crate::workload::WorkloadCategory;

/// Name of the instance used when a category has no mapping.
pub const PRIMARY_INSTANCE: &str = "primary";

const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Deserialize, Clone)]
pub struct CorrelateConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub store: StoreCredentials,
    pub instances: Vec<InstanceDescriptor>,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub binding: BindingConfig,
    #[serde(default)]
    pub tuning: TuningConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Credentials shared by every instance.
#[derive(Deserialize, Clone)]
pub struct StoreCredentials {
    pub user: String,
    pub password: String,
}

impl Default for StoreCredentials {
    fn default() -> Self {
        Self {
            user: "correlate".to_string(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoutingConfig {
    /// Probability of leaving the preferred instance for weighted selection.
    pub overflow_probability: f64,
    /// Per-category overrides of the built-in preferred instance.
    #[serde(default)]
    pub workload_map: HashMap<WorkloadCategory, String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            overflow_probability: 0.2,
            workload_map: HashMap::new(),
        }
    }
}

impl RoutingConfig {
    /// Preferred instance for `category`: override, then built-in table.
    pub fn preferred_instance(&self, category: WorkloadCategory) -> &str {
        self.workload_map
            .get(&category)
            .map(String::as_str)
            .unwrap_or_else(|| category.default_instance())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BindingConfig {
    pub client_info_max_len: usize,
    pub trace_id_max_len: usize,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            client_info_max_len: 64,
            trace_id_max_len: 16,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TuningConfig {
    pub sort_work_mem: String,
    pub hash_mem_multiplier: f64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            sort_work_mem: "256MB".to_string(),
            hash_mem_multiplier: 4.0,
        }
    }
}

/// Deadlines. Connection acquisition and statement execution expire as
/// execution failures; a tuning or binding write that expires only degrades
/// the session.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    pub connect_timeout_ms: u64,
    pub statement_timeout_ms: u64,
    pub session_write_timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            statement_timeout_ms: 30_000,
            session_write_timeout_ms: 2_000,
        }
    }
}

impl ExecutionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }

    /// Budget for each individual tuning or binding write.
    pub fn session_write_timeout(&self) -> Duration {
        Duration::from_millis(self.session_write_timeout_ms)
    }
}

impl CorrelateConfig {
    /// Load from a TOML file layered with `CORRELATE__SECTION__KEY`
    /// environment variables, then validate.
    pub fn load(path: &str) -> Result<Self, CorrelateError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("CORRELATE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn instance(&self, name: &str) -> Option<&InstanceDescriptor> {
        self.instances.iter().find(|i| i.name == name)
    }

    pub fn validate(&self) -> Result<(), CorrelateError> {
        let invalid = |msg: String| Err(CorrelateError::InvalidConfig(msg));

        if self.instances.is_empty() {
            return invalid("at least one instance must be configured".into());
        }

        let mut seen = HashSet::new();
        for instance in &self.instances {
            if !seen.insert(instance.name.as_str()) {
                return invalid(format!("duplicate instance name '{}'", instance.name));
            }
            if !(0.0..=1.0).contains(&instance.routing_weight) {
                return invalid(format!(
                    "instance '{}' routing_weight {} is outside [0, 1]",
                    instance.name, instance.routing_weight
                ));
            }
        }

        let total: f64 = self.instances.iter().map(|i| i.routing_weight).sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return invalid(format!("routing weights sum to {total}, expected 1.0"));
        }

        if self.instance(PRIMARY_INSTANCE).is_none() {
            return invalid(format!("instance '{PRIMARY_INSTANCE}' is required"));
        }

        for category in WorkloadCategory::ALL {
            let target = self.routing.preferred_instance(category);
            if self.instance(target).is_none() {
                return invalid(format!(
                    "workload '{category}' maps to unknown instance '{target}'"
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.routing.overflow_probability) {
            return invalid(format!(
                "overflow_probability {} is outside [0, 1]",
                self.routing.overflow_probability
            ));
        }

        if self.binding.client_info_max_len == 0 || self.binding.trace_id_max_len == 0 {
            return invalid("binding length limits must be positive".into());
        }

        let execution = &self.execution;
        if execution.connect_timeout_ms == 0
            || execution.statement_timeout_ms == 0
            || execution.session_write_timeout_ms == 0
        {
            return invalid("execution timeouts must be positive".into());
        }

        Ok(())
    }
}
