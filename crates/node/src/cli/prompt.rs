use console::style;
use std::io::{self, Write};

/// Operator interaction used by the node operations.
pub(crate) trait Prompt: Send + Sync {
    /// Yes/no question; an empty answer picks `default`.
    fn confirm(&self, message: &str, default: bool) -> bool;

    /// Free text answer; an empty answer picks `default` when there is one.
    fn input(&self, message: &str, default: Option<&str>) -> String;
}

pub(crate) struct TerminalPrompt;

impl TerminalPrompt {
    fn read_line() -> Option<String> {
        io::stdout().flush().ok()?;
        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(input.trim().to_string()),
        }
    }
}

impl Prompt for TerminalPrompt {
    fn confirm(&self, message: &str, default: bool) -> bool {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        print!("{} {hint}: ", style(message).bold());

        match Self::read_line() {
            Some(answer) if answer.is_empty() => default,
            Some(answer) => matches!(answer.to_lowercase().as_str(), "y" | "yes"),
            None => default,
        }
    }

    fn input(&self, message: &str, default: Option<&str>) -> String {
        match default {
            Some(default) => print!("{} [{}]: ", style(message).bold(), style(default).dim()),
            None => print!("{}: ", style(message).bold()),
        }

        let answer = Self::read_line().unwrap_or_default();
        if answer.is_empty() {
            return default.unwrap_or_default().to_string();
        }
        answer
    }
}
