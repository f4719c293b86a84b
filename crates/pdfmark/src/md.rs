use crate::prelude::{println, *};
use colored::Colorize;
use pdfmark_core::markdown::{parse_markdown_headings, MarkdownHeading};
use std::path::PathBuf;

#[derive(Debug, clap::Parser)]
#[command(name = "md")]
#[command(about = "Inspect Markdown outlines before using them as bookmark sources")]
pub struct App {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, clap::Subcommand)]
pub enum Commands {
    /// List the headings that `pdfmark markdown` would bookmark
    #[clap(name = "headings")]
    Headings(HeadingsOptions),
}

#[derive(Debug, clap::Args, Clone)]
pub struct HeadingsOptions {
    /// Path to the Markdown file
    #[clap(env = "PDFMARK_MARKDOWN")]
    path: PathBuf,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    match app.command {
        Commands::Headings(options) => headings(options, global.json).await,
    }
}

async fn headings(options: HeadingsOptions, json: bool) -> Result<()> {
    let markdown = tokio::fs::read_to_string(&options.path)
        .await
        .wrap_err_with(|| f!("Failed to read {}", options.path.display()))?;

    let headings = parse_markdown_headings(&markdown);
    log::debug!("found {} headings in {}", headings.len(), options.path.display());

    if options.json || json {
        println!("{}", serde_json::to_string_pretty(&headings)?);
    } else {
        output_table(&headings)?;
    }

    Ok(())
}

fn output_table(headings: &[MarkdownHeading]) -> Result<()> {
    if headings.is_empty() {
        return Err(eyre!("No headings found: the document would produce no bookmarks"));
    }

    let mut table = new_table();
    table.add_row(prettytable::row!["PREFIX".bold().cyan(), "LEVEL".bold().cyan(), "TITLE".bold().cyan()]);

    for heading in headings {
        let indent = "  ".repeat(usize::from(heading.level.saturating_sub(1)));
        table.add_row(prettytable::row![
            heading.prefix.dimmed(),
            heading.level,
            f!("{indent}{}", heading.title)
        ]);
    }

    table.printstd();
    Ok(())
}
