use super::prompt::{Prompt, TerminalPrompt};
use crate::console::Console;
use crate::docker::DockerEngine;
use crate::operations::{session, NodeController, StartOutcome, StopOutcome, UpdateOutcome};
use crate::process::{ProcessRunner, SystemProcessRunner};
use crate::scheduler::AutoUpdate;
use crate::status::HttpStatusProbe;
use crate::APP_VERSION;
use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{debug, warn};
use shared::api::{PlatformApi, PlatformClient};
use shared::config::ConfigStore;
use shared::models::NodeStatus;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "coretex", author, version = APP_VERSION, about, long_about = None)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Authenticate with the Coretex platform
    Login {
        #[arg(long)]
        username: Option<String>,

        /// Password (not recommended, prefer the interactive prompt)
        #[arg(long)]
        password: Option<String>,
    },

    /// Configure and control the Coretex node
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },
}

#[derive(Subcommand)]
pub enum NodeCommands {
    /// Configure the node and register it with the platform
    Config {
        /// Ask for every setting instead of using host defaults
        #[arg(long, default_value = "false")]
        verbose: bool,
    },

    /// Start the node container
    Start {
        /// Image to run instead of the configured one, kept for later starts
        #[arg(long)]
        image: Option<String>,
    },

    /// Stop the node container and remove its network
    Stop {},

    /// Replace the node with the newest image
    Update {
        /// Terminate a busy node without asking
        #[arg(long, default_value = "false", conflicts_with = "no")]
        yes: bool,

        /// Leave a busy node running without asking
        #[arg(long, default_value = "false")]
        no: bool,
    },

    /// Show the state reported by the running node
    Status {},
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        let store = ConfigStore::from_env()?;
        let context = Context {
            store,
            runner: Arc::new(SystemProcessRunner),
            prompt: Arc::new(TerminalPrompt),
        };
        execute_command(&self.command, &context).await
    }
}

struct Context {
    store: ConfigStore,
    runner: Arc<dyn ProcessRunner>,
    prompt: Arc<dyn Prompt>,
}

impl Context {
    /// Platform client authorized with the current session.
    async fn platform(&self) -> Result<Arc<dyn PlatformApi>> {
        let user = self.store.load_user()?;
        let anonymous = PlatformClient::new(&user.server_url)?;
        let user = session::initialize(&self.store, &anonymous, Utc::now()).await?;

        let client = match user.token {
            Some(token) => anonymous.with_token(token),
            None => anonymous,
        };
        Ok(Arc::new(client))
    }

    /// Platform client for commands that only make best-effort calls.
    async fn platform_or_anonymous(&self) -> Result<Arc<dyn PlatformApi>> {
        match self.platform().await {
            Ok(api) => Ok(api),
            Err(e) => {
                debug!("Continuing without a platform session: {e}");
                self.anonymous()
            }
        }
    }

    /// Platform client for commands that never talk to the platform.
    fn anonymous(&self) -> Result<Arc<dyn PlatformApi>> {
        let user = self.store.load_user()?;
        Ok(Arc::new(PlatformClient::new(&user.server_url)?))
    }

    fn controller(&self, api: Arc<dyn PlatformApi>) -> Result<NodeController> {
        Ok(NodeController::new(
            DockerEngine::new(self.runner.clone()),
            self.store.clone(),
            AutoUpdate::new(self.runner.clone(), self.store.dir())?,
            Arc::new(HttpStatusProbe::new()),
            api,
            self.prompt.clone(),
        ))
    }
}

async fn execute_command(command: &Commands, context: &Context) -> Result<()> {
    match command {
        Commands::Login { username, password } => {
            let username = match username {
                Some(username) => username.clone(),
                None => context.prompt.input("Username", None),
            };
            let password = match password {
                Some(password) => password.clone(),
                None => context.prompt.input("Password", None),
            };

            let user = context.store.load_user()?;
            let api = PlatformClient::new(&user.server_url)?;
            session::login(&context.store, &api, &username, &password).await?;
            Console::success(&format!("Logged in as {username}"));
            Ok(())
        }
        Commands::Node { command } => execute_node_command(command, context).await,
    }
}

async fn execute_node_command(command: &NodeCommands, context: &Context) -> Result<()> {
    match command {
        NodeCommands::Config { verbose } => {
            let controller = context.controller(context.platform().await?)?;

            if controller.is_running().await? {
                if !context.prompt.confirm(
                    "Node is running, it has to be stopped before it can be configured. Stop it?",
                    false,
                ) {
                    Console::warning("Configuration cancelled, the node keeps running");
                    return Ok(());
                }
                if controller.stop().await? == StopOutcome::Declined {
                    Console::warning("Configuration cancelled, the node keeps running");
                    return Ok(());
                }
            }

            Console::section("NODE CONFIGURATION");
            let config = controller.configure_interactive(*verbose).await?;

            Console::section("CONFIGURATION PREVIEW");
            for line in config.to_string().lines() {
                match line.split_once(": ") {
                    Some((label, value)) => Console::info(label, value),
                    None => Console::plain(line),
                }
            }
            Console::success(&format!(
                "Configuration saved to {}",
                context.store.node_config_path().display()
            ));
            Console::plain("Run `coretex node start` to start the node");
            Ok(())
        }
        NodeCommands::Start { image } => {
            let controller = context.controller(context.anonymous()?)?;
            Console::progress("Starting Coretex node");

            match controller.start(image.as_deref()).await? {
                StartOutcome::Started => {
                    Console::success("Node started successfully");
                }
                StartOutcome::Declined => {
                    Console::warning("Node is already running, nothing was changed");
                }
            }
            Ok(())
        }
        NodeCommands::Stop {} => {
            let controller = context.controller(context.platform_or_anonymous().await?)?;
            Console::progress("Stopping Coretex node");

            match controller.stop().await? {
                StopOutcome::Stopped => Console::success("Node stopped"),
                StopOutcome::AlreadyOffline => Console::plain("Node is already offline"),
                StopOutcome::Declined => Console::warning("Node keeps running"),
            }
            Ok(())
        }
        NodeCommands::Update { yes, no } => {
            let answer = match (yes, no) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let controller = context.controller(context.anonymous()?)?;
            Console::progress("Checking for node updates");

            match controller.update(answer).await? {
                UpdateOutcome::Updated => Console::success("Node updated successfully"),
                UpdateOutcome::UpToDate => Console::success("Node is already up to date"),
                UpdateOutcome::NotRunning => {
                    Console::warning("Node is not running, start it with `coretex node start`")
                }
                UpdateOutcome::Reconnecting => {
                    Console::warning("Node is reconnecting, it cannot be updated right now")
                }
                UpdateOutcome::Declined => Console::warning("Update cancelled, the node is busy"),
            }
            Ok(())
        }
        NodeCommands::Status {} => {
            let status = context.controller(context.anonymous()?)?.status().await;
            if status == NodeStatus::Inactive {
                warn!("Node did not answer the status request");
            }
            Console::info("Node status", &status.to_string());
            Ok(())
        }
    }
}
