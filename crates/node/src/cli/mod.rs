pub(crate) mod command;
pub(crate) mod prompt;

pub use command::Cli;
