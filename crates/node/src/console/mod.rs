use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub(crate) struct Console;

impl Console {
    const fn get_width() -> usize {
        40
    }

    fn horizontal_border() -> String {
        "═".repeat(Self::get_width())
    }

    pub(crate) fn section(title: &str) {
        println!();
        let width = Self::get_width();
        let formatted_title = format!("{title:^width$}");
        let border = Self::horizontal_border();

        println!("{}", style(format!("╔{border}╗")).magenta().bold());
        println!("{}", style(formatted_title).magenta().bold());
        println!("{}", style(format!("╚{border}╝")).magenta().bold());
    }

    pub(crate) fn info(label: &str, value: &str) {
        println!("{}: {}", style(label).dim().magenta(), style(value).white());
    }

    pub(crate) fn plain(text: &str) {
        println!("{text}");
    }

    pub(crate) fn success(text: &str) {
        println!("{} {}", style("✓").green().bold(), style(text).green());
    }

    pub(crate) fn warning(text: &str) {
        println!("{} {}", style("⚠").yellow().bold(), style(text).yellow());
    }

    pub(crate) fn progress(text: &str) {
        println!("{} {}", style("→").cyan().bold(), style(text).cyan());
    }

    /// Spinner shown while a long engine command runs. Not drawn when stderr
    /// is not a terminal.
    pub(crate) fn spinner(text: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner:.magenta} {msg}")
        {
            pb.set_style(spinner_style);
        }
        pb.set_message(text.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}
