mod cli;
mod console;
mod docker;
mod operations;
mod process;
mod scheduler;
mod status;
mod utils;

pub use cli::Cli;
pub use utils::logging::setup_logging;

pub(crate) const APP_VERSION: &str = match option_env!("CORETEX_CLI_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};
