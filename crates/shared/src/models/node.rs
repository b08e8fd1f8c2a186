use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const OFFICIAL_IMAGE_REPOSITORY: &str = "coretexai/coretex-node";
pub const CPU_IMAGE_TAG: &str = "latest-cpu";
pub const GPU_IMAGE_TAG: &str = "latest-gpu";

pub const DEFAULT_SHARED_MEMORY_GB: u32 = 2;
pub const MIN_RAM_GB: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum NodeMode {
    #[default]
    Execution,
    FunctionExclusive,
    FunctionShared,
}

impl NodeMode {
    pub const ALL: [NodeMode; 3] = [
        NodeMode::Execution,
        NodeMode::FunctionExclusive,
        NodeMode::FunctionShared,
    ];

    /// Numeric code understood by the platform and the node image.
    pub const fn code(&self) -> u8 {
        match self {
            NodeMode::Execution => 1,
            NodeMode::FunctionExclusive => 2,
            NodeMode::FunctionShared => 3,
        }
    }

    pub const fn requires_model(&self) -> bool {
        matches!(self, NodeMode::FunctionExclusive)
    }
}

impl fmt::Display for NodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeMode::Execution => "execution",
            NodeMode::FunctionExclusive => "functionExclusive",
            NodeMode::FunctionShared => "functionShared",
        };
        write!(f, "{name}")
    }
}

impl FromStr for NodeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "execution" | "1" => Ok(NodeMode::Execution),
            "functionExclusive" | "function-exclusive" | "2" => Ok(NodeMode::FunctionExclusive),
            "functionShared" | "function-shared" | "3" => Ok(NodeMode::FunctionShared),
            other => Err(anyhow::anyhow!("Unknown node mode: {other}")),
        }
    }
}

/// Self-reported state of a running node container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum NodeStatus {
    Inactive,
    Active,
    Busy,
    Deleted,
    Reconnecting,
}

impl NodeStatus {
    /// Integer reported by the node's status endpoint.
    pub const fn code(&self) -> i64 {
        match self {
            NodeStatus::Inactive => 1,
            NodeStatus::Active => 2,
            NodeStatus::Busy => 3,
            NodeStatus::Deleted => 4,
            NodeStatus::Reconnecting => 5,
        }
    }
}

impl TryFrom<i64> for NodeStatus {
    type Error = anyhow::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(NodeStatus::Inactive),
            2 => Ok(NodeStatus::Active),
            3 => Ok(NodeStatus::Busy),
            4 => Ok(NodeStatus::Deleted),
            5 => Ok(NodeStatus::Reconnecting),
            other => Err(anyhow::anyhow!("Unknown node status code: {other}")),
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeStatus::Inactive => "inactive",
            NodeStatus::Active => "active",
            NodeStatus::Busy => "busy",
            NodeStatus::Deleted => "deleted",
            NodeStatus::Reconnecting => "reconnecting",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Node name must not be empty")]
    EmptyName,
    #[error("Docker image must not be empty")]
    EmptyImage,
    #[error("CPU count must be at least 1")]
    InvalidCpuCount,
    #[error("Node RAM must be at least {}GB", MIN_RAM_GB)]
    InvalidRam,
    #[error("Node mode {0} requires a model id")]
    MissingModelId(NodeMode),
    #[error("Init script {} does not exist", .0.display())]
    MissingInitScript(PathBuf),
    #[error("Node access token is missing, configure the node again")]
    MissingAccessToken,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfiguration {
    pub node_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<i64>,
    #[serde(default)]
    pub node_access_token: Option<String>,
    pub storage_path: PathBuf,
    pub image: String,
    #[serde(default)]
    pub allow_gpu: bool,
    pub node_ram: u32,
    pub node_swap: u32,
    pub node_shared_memory: u32,
    pub cpu_count: u32,
    #[serde(default)]
    pub node_mode: NodeMode,
    #[serde(default)]
    pub allow_docker: bool,
    #[serde(default)]
    pub secrets_key: Option<String>,
    #[serde(default)]
    pub init_script: Option<PathBuf>,
    #[serde(default)]
    pub model_id: Option<i64>,
}

impl NodeConfiguration {
    /// Official image reference for the requested variant.
    pub fn official_image(allow_gpu: bool) -> String {
        let tag = if allow_gpu { GPU_IMAGE_TAG } else { CPU_IMAGE_TAG };
        format!("{OFFICIAL_IMAGE_REPOSITORY}:{tag}")
    }

    /// Checks every field collected during configuration. The access token
    /// is not required here since it is only issued after registration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.node_name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.image.trim().is_empty() {
            return Err(ValidationError::EmptyImage);
        }
        if self.cpu_count < 1 {
            return Err(ValidationError::InvalidCpuCount);
        }
        if self.node_ram < MIN_RAM_GB {
            return Err(ValidationError::InvalidRam);
        }
        if self.node_mode.requires_model() && self.model_id.is_none() {
            return Err(ValidationError::MissingModelId(self.node_mode));
        }
        if let Some(script) = &self.init_script {
            if !script.exists() {
                return Err(ValidationError::MissingInitScript(script.clone()));
            }
        }
        Ok(())
    }

    /// A configuration the node can be started with.
    pub fn validate_startable(&self) -> Result<(), ValidationError> {
        self.validate()?;
        match &self.node_access_token {
            Some(token) if !token.is_empty() => Ok(()),
            _ => Err(ValidationError::MissingAccessToken),
        }
    }
}

/// Memory-swap ceiling in GB. The engine expects the total of RAM and swap,
/// not the swap delta. Widened so every `u32` pair sums exactly.
pub const fn memory_swap_limit(ram_gb: u32, swap_gb: u32) -> u64 {
    ram_gb as u64 + swap_gb as u64
}

impl fmt::Display for NodeConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Node name: {}", self.node_name)?;
        writeln!(f, "Node image: {}", self.image)?;
        writeln!(f, "Storage path: {}", self.storage_path.display())?;
        writeln!(f, "RAM: {}GB", self.node_ram)?;
        writeln!(f, "Swap: {}GB", self.node_swap)?;
        writeln!(f, "Shared memory: {}GB", self.node_shared_memory)?;
        writeln!(f, "CPU cores: {}", self.cpu_count)?;
        writeln!(f, "GPU allowed: {}", self.allow_gpu)?;
        writeln!(f, "Docker access: {}", self.allow_docker)?;
        writeln!(f, "Node mode: {}", self.node_mode)?;
        if let Some(model_id) = self.model_id {
            writeln!(f, "Model id: {model_id}")?;
        }
        if let Some(script) = &self.init_script {
            writeln!(f, "Init script: {}", script.display())?;
        }
        let masked = |value: &Option<String>| match value {
            Some(_) => "********",
            None => "not set",
        };
        writeln!(f, "Access token: {}", masked(&self.node_access_token))?;
        write!(f, "Secrets key: {}", masked(&self.secrets_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NodeConfiguration {
        NodeConfiguration {
            node_name: "gpu-box".to_string(),
            node_id: None,
            node_access_token: None,
            storage_path: PathBuf::from("/tmp/coretex"),
            image: NodeConfiguration::official_image(false),
            allow_gpu: false,
            node_ram: 8,
            node_swap: 16,
            node_shared_memory: DEFAULT_SHARED_MEMORY_GB,
            cpu_count: 4,
            node_mode: NodeMode::Execution,
            allow_docker: false,
            secrets_key: None,
            init_script: None,
            model_id: None,
        }
    }

    #[test]
    fn test_memory_swap_is_total_of_ram_and_swap() {
        let config = sample();
        assert_eq!(memory_swap_limit(config.node_ram, config.node_swap), 24);
        assert_eq!(memory_swap_limit(8, 0), 8);
        assert_eq!(memory_swap_limit(0, 0), 0);
        assert_eq!(
            memory_swap_limit(u32::MAX, u32::MAX),
            2 * u64::from(u32::MAX)
        );
    }

    #[test]
    fn test_function_exclusive_requires_model() {
        let config = NodeConfiguration {
            node_mode: NodeMode::FunctionExclusive,
            ..sample()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingModelId(NodeMode::FunctionExclusive))
        );

        let with_model = NodeConfiguration {
            model_id: Some(42),
            ..config
        };
        assert!(with_model.validate().is_ok());
    }

    #[test]
    fn test_startable_requires_access_token() {
        let config = sample();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.validate_startable(),
            Err(ValidationError::MissingAccessToken)
        );

        let registered = NodeConfiguration {
            node_access_token: Some("token".to_string()),
            ..config
        };
        assert!(registered.validate_startable().is_ok());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(NodeStatus::try_from(1).unwrap(), NodeStatus::Inactive);
        assert_eq!(NodeStatus::try_from(3).unwrap(), NodeStatus::Busy);
        assert_eq!(NodeStatus::try_from(5).unwrap(), NodeStatus::Reconnecting);
        assert!(NodeStatus::try_from(0).is_err());
        assert!(NodeStatus::try_from(6).is_err());
        assert_eq!(NodeStatus::try_from(NodeStatus::Active.code()).unwrap(), NodeStatus::Active);
    }

    #[test]
    fn test_config_json_uses_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["nodeName"], "gpu-box");
        assert_eq!(json["nodeMode"], "execution");
        assert_eq!(json["nodeSharedMemory"], 2);

        let parsed: NodeConfiguration = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_node_mode_parsing() {
        assert_eq!(
            NodeMode::from_str("functionExclusive").unwrap(),
            NodeMode::FunctionExclusive
        );
        assert_eq!(NodeMode::from_str("3").unwrap(), NodeMode::FunctionShared);
        assert!(NodeMode::from_str("training").is_err());
        assert_eq!(NodeMode::FunctionShared.code(), 3);
    }
}
