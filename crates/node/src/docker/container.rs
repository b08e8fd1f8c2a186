use shared::models::node::memory_swap_limit;
use shared::models::NodeConfiguration;

pub(crate) const NODE_CONTAINER_NAME: &str = "coretex_node";
pub(crate) const NODE_NETWORK_NAME: &str = "coretex_node";
pub(crate) const NODE_PORT: u16 = 21000;
pub(crate) const CONTAINER_STORAGE_PATH: &str = "/root/.coretex";
pub(crate) const DOCKER_SOCKET: &str = "/var/run/docker.sock";
pub(crate) const INIT_SCRIPT_MOUNT: &str = "/script/init.sh";
pub(crate) const TRACING_CAPABILITY: &str = "SYS_PTRACE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VolumeMount {
    pub(crate) host: String,
    pub(crate) container: String,
    pub(crate) read_only: bool,
}

impl VolumeMount {
    fn bind(host: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            read_only: false,
        }
    }

    pub(crate) fn as_arg(&self) -> String {
        if self.read_only {
            format!("{}:{}:ro", self.host, self.container)
        } else {
            format!("{}:{}", self.host, self.container)
        }
    }
}

/// Everything `docker run` needs to start the node container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodeContainerSpec {
    pub(crate) name: String,
    pub(crate) network: String,
    pub(crate) image: String,
    pub(crate) allow_gpu: bool,
    pub(crate) ram_gb: u32,
    pub(crate) swap_gb: u32,
    pub(crate) shared_memory_gb: u32,
    pub(crate) cpu_count: u32,
    pub(crate) env: Vec<(String, String)>,
    pub(crate) volumes: Vec<VolumeMount>,
}

impl NodeContainerSpec {
    pub(crate) fn from_config(config: &NodeConfiguration, api_url: &str) -> Self {
        let mut env = vec![
            ("CTX_API_URL".to_string(), api_url.to_string()),
            (
                "CTX_STORAGE_PATH".to_string(),
                CONTAINER_STORAGE_PATH.to_string(),
            ),
            (
                "CTX_NODE_ACCESS_TOKEN".to_string(),
                config.node_access_token.clone().unwrap_or_default(),
            ),
            ("CTX_NODE_MODE".to_string(), config.node_mode.code().to_string()),
        ];
        if let Some(model_id) = config.model_id {
            env.push(("CTX_MODEL_ID".to_string(), model_id.to_string()));
        }
        if let Some(secrets_key) = &config.secrets_key {
            env.push(("CTX_SECRETS_KEY".to_string(), secrets_key.clone()));
        }

        let mut volumes = vec![VolumeMount::bind(
            config.storage_path.to_string_lossy(),
            CONTAINER_STORAGE_PATH,
        )];
        if config.allow_docker {
            volumes.push(VolumeMount::bind(DOCKER_SOCKET, DOCKER_SOCKET));
        }
        if let Some(script) = &config.init_script {
            volumes.push(VolumeMount {
                host: script.to_string_lossy().into_owned(),
                container: INIT_SCRIPT_MOUNT.to_string(),
                read_only: true,
            });
        }

        Self {
            name: NODE_CONTAINER_NAME.to_string(),
            network: NODE_NETWORK_NAME.to_string(),
            image: config.image.clone(),
            allow_gpu: config.allow_gpu,
            ram_gb: config.node_ram,
            swap_gb: config.node_swap,
            shared_memory_gb: config.node_shared_memory,
            cpu_count: config.cpu_count,
            env,
            volumes,
        }
    }

    /// Swap is expressed to the engine as a ceiling of RAM plus swap.
    pub(crate) const fn memory_swap_gb(&self) -> u64 {
        memory_swap_limit(self.ram_gb, self.swap_gb)
    }

    pub(crate) fn run_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--restart".to_string(),
            "always".to_string(),
            "-p".to_string(),
            format!("{NODE_PORT}:{NODE_PORT}"),
            "--cap-add".to_string(),
            TRACING_CAPABILITY.to_string(),
            "--network".to_string(),
            self.network.clone(),
            "--memory".to_string(),
            format!("{}G", self.ram_gb),
            "--memory-swap".to_string(),
            format!("{}G", self.memory_swap_gb()),
            "--shm-size".to_string(),
            format!("{}G", self.shared_memory_gb),
            "--cpus".to_string(),
            self.cpu_count.to_string(),
        ];

        if self.allow_gpu {
            args.push("--gpus".to_string());
            args.push("all".to_string());
        }

        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }

        for volume in &self.volumes {
            args.push("-v".to_string());
            args.push(volume.as_arg());
        }

        args.push("--name".to_string());
        args.push(self.name.clone());
        args.push(self.image.clone());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::NodeMode;
    use std::path::PathBuf;

    fn config() -> NodeConfiguration {
        NodeConfiguration {
            node_name: "node".to_string(),
            node_id: Some(1),
            node_access_token: Some("access".to_string()),
            storage_path: PathBuf::from("/data/coretex"),
            image: "coretexai/coretex-node:latest-cpu".to_string(),
            allow_gpu: false,
            node_ram: 8,
            node_swap: 16,
            node_shared_memory: 2,
            cpu_count: 4,
            node_mode: NodeMode::Execution,
            allow_docker: false,
            secrets_key: None,
            init_script: None,
            model_id: None,
        }
    }

    fn value_after(args: &[String], flag: &str) -> Option<String> {
        args.iter()
            .position(|a| a == flag)
            .map(|idx| args[idx + 1].clone())
    }

    #[test]
    fn test_memory_swap_is_ram_plus_swap() {
        for (ram, swap) in [(8, 16), (1, 0), (32, 4), (0, 0)] {
            let spec = NodeContainerSpec::from_config(
                &NodeConfiguration {
                    node_ram: ram,
                    node_swap: swap,
                    ..config()
                },
                "https://api.coretex.ai/",
            );
            let args = spec.run_args();
            assert_eq!(value_after(&args, "--memory"), Some(format!("{ram}G")));
            assert_eq!(
                value_after(&args, "--memory-swap"),
                Some(format!("{}G", ram + swap))
            );
        }
    }

    #[test]
    fn test_memory_swap_at_upper_bound() {
        let config = NodeConfiguration {
            node_ram: 8,
            node_swap: u32::MAX,
            ..config()
        };
        assert!(config.validate_startable().is_ok());

        let spec = NodeContainerSpec::from_config(&config, "https://api.coretex.ai/");
        assert_eq!(spec.memory_swap_gb(), u64::from(u32::MAX) + 8);
        assert_eq!(
            value_after(&spec.run_args(), "--memory-swap"),
            Some("4294967303G".to_string())
        );
    }

    #[test]
    fn test_fixed_run_options() {
        let args = NodeContainerSpec::from_config(&config(), "https://api.coretex.ai/").run_args();
        assert_eq!(value_after(&args, "--restart").as_deref(), Some("always"));
        assert_eq!(value_after(&args, "-p").as_deref(), Some("21000:21000"));
        assert_eq!(value_after(&args, "--cap-add").as_deref(), Some("SYS_PTRACE"));
        assert_eq!(value_after(&args, "--network").as_deref(), Some("coretex_node"));
        assert_eq!(value_after(&args, "--shm-size").as_deref(), Some("2G"));
        assert_eq!(value_after(&args, "--name").as_deref(), Some("coretex_node"));
        assert_eq!(args.last().map(String::as_str), Some("coretexai/coretex-node:latest-cpu"));
        assert!(!args.contains(&"--gpus".to_string()));
    }

    #[test]
    fn test_docker_socket_only_when_allowed() {
        let socket = format!("{DOCKER_SOCKET}:{DOCKER_SOCKET}");
        let storage = "/data/coretex:/root/.coretex".to_string();

        let args = NodeContainerSpec::from_config(&config(), "url").run_args();
        assert!(args.contains(&storage));
        assert!(!args.contains(&socket));

        let allowed = NodeConfiguration {
            allow_docker: true,
            allow_gpu: true,
            ..config()
        };
        let args = NodeContainerSpec::from_config(&allowed, "url").run_args();
        assert!(args.contains(&storage));
        assert!(args.contains(&socket));
        assert_eq!(value_after(&args, "--gpus").as_deref(), Some("all"));
    }

    #[test]
    fn test_environment_from_configuration() {
        let spec = NodeContainerSpec::from_config(&config(), "https://api.coretex.ai/");
        let keys: Vec<&str> = spec.env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "CTX_API_URL",
                "CTX_STORAGE_PATH",
                "CTX_NODE_ACCESS_TOKEN",
                "CTX_NODE_MODE"
            ]
        );

        let exclusive = NodeConfiguration {
            node_mode: NodeMode::FunctionExclusive,
            model_id: Some(99),
            secrets_key: Some("s3cret".to_string()),
            ..config()
        };
        let args = NodeContainerSpec::from_config(&exclusive, "https://api.coretex.ai/").run_args();
        assert!(args.contains(&"CTX_MODEL_ID=99".to_string()));
        assert!(args.contains(&"CTX_NODE_MODE=2".to_string()));
        assert!(args.contains(&"CTX_SECRETS_KEY=s3cret".to_string()));
        assert!(args.contains(&"CTX_NODE_ACCESS_TOKEN=access".to_string()));
    }
}
