//! Inspect command - prints a persisted view.

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use vsync_view::{View, load_view};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Summary for people.
    Human,
    /// The line-oriented view encoding.
    Text,
    Json,
}

pub fn run(path: &str, format: Format) -> Result<()> {
    let view = read(Path::new(path))?;
    print!("{}", render(&view, format)?);
    Ok(())
}

/// Loads a view, falling back to the swap file when the primary is missing.
pub fn read(path: &Path) -> Result<View> {
    load_view(path)
        .with_context(|| format!("failed to load view from {}", path.display()))?
        .with_context(|| format!("no view stored at {}", path.display()))
}

pub fn render(view: &View, format: Format) -> Result<String> {
    Ok(match format {
        Format::Human => format!("{view}\n"),
        Format::Text => view.to_text(),
        Format::Json => {
            let mut json = serde_json::to_string_pretty(view).context("failed to render view")?;
            json.push('\n');
            json
        }
    })
}
