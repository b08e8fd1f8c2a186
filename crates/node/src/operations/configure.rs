use super::NodeError;
use crate::cli::prompt::Prompt;
use crate::console::Console;
use crate::docker::{DockerEngine, ImageReference};
use log::debug;
use shared::api::PlatformApi;
use shared::config::default_storage_path;
use shared::models::node::{DEFAULT_SHARED_MEMORY_GB, MIN_RAM_GB};
use shared::models::{NodeConfiguration, NodeMode};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use sysinfo::System;

const MAX_ATTEMPTS: usize = 3;
const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// What the host offers, used to propose resource defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HostDefaults {
    pub(crate) cpu_count: u32,
    pub(crate) memory_gb: u32,
    pub(crate) swap_gb: u32,
    pub(crate) gpu_available: bool,
}

impl HostDefaults {
    pub(crate) async fn detect(engine: &DockerEngine) -> Result<Self, NodeError> {
        let limits = engine.resource_limits().await.map_err(|e| {
            debug!("{e}");
            NodeError::EngineUnavailable
        })?;

        let mut system = System::new();
        system.refresh_memory();
        let swap_gb = (system.total_swap() / BYTES_PER_GB) as u32;

        Ok(Self {
            cpu_count: limits.cpu_count,
            memory_gb: limits.memory_gb,
            swap_gb,
            gpu_available: engine.gpu_available().await,
        })
    }

    /// Half of the engine's memory, never below the minimum.
    pub(crate) fn ram_gb(&self) -> u32 {
        (self.memory_gb / 2).max(MIN_RAM_GB)
    }

    /// Host swap, capped at twice the RAM handed to the node.
    pub(crate) fn swap_gb(&self) -> u32 {
        self.swap_gb.min(self.ram_gb() * 2)
    }

    pub(crate) fn cpu_count(&self) -> u32 {
        self.cpu_count.max(1)
    }
}

fn ask_parsed<T>(prompt: &dyn Prompt, message: &str, default: &str) -> Result<T, NodeError>
where
    T: FromStr,
    T::Err: Display,
{
    for _ in 0..MAX_ATTEMPTS {
        let answer = prompt.input(message, Some(default));
        match answer.parse::<T>() {
            Ok(value) => return Ok(value),
            Err(e) => Console::warning(&format!("Invalid value \"{answer}\": {e}")),
        }
    }
    Err(NodeError::InvalidInput(format!(
        "No valid value for \"{message}\" after {MAX_ATTEMPTS} attempts"
    )))
}

fn ask_bounded(
    prompt: &dyn Prompt,
    message: &str,
    default: u32,
    min: u32,
    max: u32,
) -> Result<u32, NodeError> {
    let default = default.to_string();
    for _ in 0..MAX_ATTEMPTS {
        let answer = prompt.input(message, Some(&default));
        match answer.trim().parse::<u32>() {
            Ok(value) if (min..=max).contains(&value) => return Ok(value),
            Ok(_) => Console::warning(&format!("Value must be between {min} and {max}")),
            Err(e) => Console::warning(&format!("Invalid value \"{answer}\": {e}")),
        }
    }
    Err(NodeError::InvalidInput(format!(
        "No valid value for \"{message}\" after {MAX_ATTEMPTS} attempts"
    )))
}

fn ask_optional(prompt: &dyn Prompt, message: &str, current: Option<&str>) -> Option<String> {
    let answer = prompt.input(message, current);
    let answer = answer.trim();
    (!answer.is_empty()).then(|| answer.to_string())
}

/// Asks for a model id until the platform knows it.
async fn ask_model_id(
    prompt: &dyn Prompt,
    api: &dyn PlatformApi,
    current: Option<i64>,
) -> Result<i64, NodeError> {
    let default = current.map(|id| id.to_string()).unwrap_or_default();
    let mut last = None;

    for _ in 0..MAX_ATTEMPTS {
        let answer = prompt.input("Model ID", Some(&default));
        let Ok(id) = answer.trim().parse::<i64>() else {
            Console::warning(&format!("\"{answer}\" is not a valid model ID"));
            continue;
        };

        match api.get_model(id).await {
            Ok(model) => {
                Console::info("Model", &model.name);
                return Ok(id);
            }
            Err(e) => {
                debug!("{e}");
                Console::warning(&format!("Model {id} could not be retrieved"));
                last = Some(id);
            }
        }
    }

    Err(match last {
        Some(id) => NodeError::ModelNotFound(id),
        None => NodeError::InvalidInput("No valid model ID provided".to_string()),
    })
}

fn ask_image(prompt: &dyn Prompt, allow_gpu: bool, current: Option<&str>) -> Result<String, NodeError> {
    if prompt.confirm("Use the official Coretex node image?", true) {
        return Ok(NodeConfiguration::official_image(allow_gpu));
    }
    let reference: ImageReference =
        ask_parsed(prompt, "Docker image", current.unwrap_or_default())?;
    Ok(reference.to_string())
}

/// Collects a node configuration from the operator. Resource settings and
/// the security sensitive options are only asked for in `verbose` mode,
/// otherwise host defaults apply.
pub(crate) async fn collect(
    prompt: &dyn Prompt,
    api: &dyn PlatformApi,
    host: &HostDefaults,
    existing: Option<&NodeConfiguration>,
    verbose: bool,
) -> Result<NodeConfiguration, NodeError> {
    let node_name = ask_node_name(prompt, existing.map(|c| c.node_name.as_str()))?;

    let modes = NodeMode::ALL
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let default_mode = existing.map(|c| c.node_mode).unwrap_or_default().to_string();
    let node_mode: NodeMode = ask_parsed(prompt, &format!("Node mode ({modes})"), &default_mode)?;

    let model_id = if node_mode.requires_model() {
        Some(ask_model_id(prompt, api, existing.and_then(|c| c.model_id)).await?)
    } else {
        None
    };

    let allow_gpu = host.gpu_available
        && prompt.confirm("NVIDIA GPU detected. Allow the node to use it?", true);
    let image = ask_image(prompt, allow_gpu, existing.map(|c| c.image.as_str()))?;

    let default_storage = match existing {
        Some(config) => config.storage_path.clone(),
        None => default_storage_path()?,
    };

    let mut config = NodeConfiguration {
        node_name,
        node_id: None,
        node_access_token: None,
        storage_path: default_storage,
        image,
        allow_gpu,
        node_ram: host.ram_gb(),
        node_swap: host.swap_gb(),
        node_shared_memory: DEFAULT_SHARED_MEMORY_GB,
        cpu_count: host.cpu_count(),
        node_mode,
        allow_docker: false,
        secrets_key: None,
        init_script: None,
        model_id,
    };

    if verbose {
        let storage = config.storage_path.display().to_string();
        config.storage_path = PathBuf::from(prompt.input("Storage path", Some(&storage)));
        config.node_ram = ask_bounded(
            prompt,
            &format!("Node RAM in GB (max {})", host.memory_gb),
            config.node_ram,
            MIN_RAM_GB,
            host.memory_gb.max(MIN_RAM_GB),
        )?;
        config.node_swap = ask_bounded(prompt, "Node swap in GB", config.node_swap, 0, u32::MAX)?;
        config.node_shared_memory = ask_bounded(
            prompt,
            "Node shared memory in GB",
            config.node_shared_memory,
            0,
            config.node_ram.max(DEFAULT_SHARED_MEMORY_GB),
        )?;
        config.cpu_count = ask_bounded(
            prompt,
            &format!("CPU cores (max {})", host.cpu_count()),
            config.cpu_count,
            1,
            host.cpu_count(),
        )?;

        Console::warning(
            "Giving the node access to the Docker socket lets workloads control every container on this host",
        );
        config.allow_docker = prompt.confirm("Allow the node to access Docker?", false);

        config.secrets_key = ask_optional(
            prompt,
            "Secrets key (leave empty to skip)",
            existing.and_then(|c| c.secrets_key.as_deref()),
        );
        config.init_script = ask_optional(
            prompt,
            "Init script path (leave empty to skip)",
            existing
                .and_then(|c| c.init_script.as_ref())
                .and_then(|p| p.to_str()),
        )
        .map(PathBuf::from);
    }

    Ok(config)
}

fn ask_node_name(prompt: &dyn Prompt, current: Option<&str>) -> Result<String, NodeError> {
    for _ in 0..MAX_ATTEMPTS {
        let name = prompt.input("Node name", current);
        if !name.trim().is_empty() {
            return Ok(name.trim().to_string());
        }
        Console::warning("Node name must not be empty");
    }
    Err(NodeError::InvalidInput("Node name must not be empty".to_string()))
}
