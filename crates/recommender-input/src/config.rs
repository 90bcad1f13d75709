//! Input layer configuration

use crate::error::{InputError, Result};
use serde::Deserialize;

/// Environment variable prefix, e.g. `RECOMMENDER_INPUT_OOM_CHANNEL_CAPACITY`
pub const ENV_PREFIX: &str = "RECOMMENDER_INPUT";

/// What the OOM observer does when the output channel is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait until the consumer frees a slot
    #[default]
    Block,
    /// Drop the batch being sent and count it
    DropNewest,
}

/// Input layer configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Container label on `container_memory_rss` series
    pub rss_container_name_label: String,

    /// Pod label on `container_memory_rss` series
    pub rss_pod_name_label: String,

    /// Container label on JMX heap series
    pub jvm_container_name_label: String,

    /// Pod label on JMX heap series
    pub jvm_pod_name_label: String,

    /// Capacity of the OOM channel, in batches
    pub oom_channel_capacity: usize,

    pub overflow_policy: OverflowPolicy,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            rss_container_name_label: "container".to_string(),
            rss_pod_name_label: "pod".to_string(),
            jvm_container_name_label: "container".to_string(),
            jvm_pod_name_label: "pod".to_string(),
            oom_channel_capacity: 5000,
            overflow_policy: OverflowPolicy::Block,
        }
    }
}

impl InputConfig {
    /// Load configuration from `RECOMMENDER_INPUT_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?;

        Self::from_config(config)
    }

    /// Build from an already assembled configuration source
    pub fn from_config(config: config::Config) -> Result<Self> {
        let input: InputConfig = config.try_deserialize()?;
        input.validate()?;
        Ok(input)
    }

    pub fn validate(&self) -> Result<()> {
        if self.oom_channel_capacity == 0 {
            return Err(InputError::InvalidConfig(
                "oom_channel_capacity must be greater than zero".to_string(),
            ));
        }

        let labels = [
            ("rss_container_name_label", &self.rss_container_name_label),
            ("rss_pod_name_label", &self.rss_pod_name_label),
            ("jvm_container_name_label", &self.jvm_container_name_label),
            ("jvm_pod_name_label", &self.jvm_pod_name_label),
        ];
        for (field, value) in labels {
            if value.is_empty() {
                return Err(InputError::InvalidConfig(format!("{field} must not be empty")));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn from_json(json: &str) -> Result<InputConfig> {
        let config = config::Config::builder()
            .add_source(File::from_str(json, FileFormat::Json))
            .build()?;
        InputConfig::from_config(config)
    }

    #[test]
    fn test_default_config() {
        let config = InputConfig::default();
        assert_eq!(config.rss_container_name_label, "container");
        assert_eq!(config.rss_pod_name_label, "pod");
        assert_eq!(config.oom_channel_capacity, 5000);
        assert_eq!(config.overflow_policy, OverflowPolicy::Block);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_source_uses_defaults() {
        let config = from_json("{}").unwrap();
        assert_eq!(config, InputConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = from_json(
            r#"{
                "jvm_pod_name_label": "kubernetes_pod_name",
                "oom_channel_capacity": 16,
                "overflow_policy": "drop_newest"
            }"#,
        )
        .unwrap();
        assert_eq!(config.jvm_pod_name_label, "kubernetes_pod_name");
        assert_eq!(config.rss_pod_name_label, "pod");
        assert_eq!(config.oom_channel_capacity, 16);
        assert_eq!(config.overflow_policy, OverflowPolicy::DropNewest);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = from_json(r#"{"oom_channel_capacity": 0}"#);
        assert!(matches!(result, Err(InputError::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_label_rejected() {
        let result = from_json(r#"{"rss_pod_name_label": ""}"#);
        assert!(matches!(result, Err(InputError::InvalidConfig(_))));
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let result = from_json(r#"{"overflow_policy": "drop_oldest"}"#);
        assert!(matches!(result, Err(InputError::Config(_))));
    }
}
