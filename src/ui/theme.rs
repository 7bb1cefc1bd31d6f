//! Terminal color roles
//!
//! Output is colored by role rather than by ad-hoc styles at call
//! sites, and the whole palette collapses to no-ops when stdout is not
//! a terminal. Similarity scores get their own graded treatment so
//! suspicious pairs stand out in batch reports.

use owo_colors::Style;
use std::sync::OnceLock;

/// What a piece of CLI output represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Header,
    Success,
    Error,
    Warn,
    Info,
    Dim,
}

pub struct Theme {
    colored: bool,
}

impl Theme {
    pub fn style(&self, role: Role) -> Style {
        if !self.colored {
            return Style::new();
        }
        match role {
            Role::Header => Style::new().cyan().bold(),
            Role::Success => Style::new().green().bold(),
            Role::Error => Style::new().red().bold(),
            Role::Warn => Style::new().yellow().bold(),
            Role::Info => Style::new().magenta(),
            Role::Dim => Style::new().white().dimmed(),
        }
    }

    /// Grade a similarity score: likely plagiarism in bold red,
    /// worth-a-look in yellow, unremarkable in green.
    pub fn score(&self, value: f64) -> Style {
        if !self.colored {
            return Style::new();
        }
        if value >= 0.8 {
            Style::new().red().bold()
        } else if value >= 0.5 {
            Style::new().yellow()
        } else {
            Style::new().green()
        }
    }
}

pub fn theme() -> &'static Theme {
    static THEME: OnceLock<Theme> = OnceLock::new();
    THEME.get_or_init(|| Theme {
        colored: console::Term::stdout().is_term(),
    })
}
