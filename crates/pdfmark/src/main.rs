use crate::prelude::*;
use clap::Parser;

mod bookmark;
mod error;
mod md;
mod prelude;
mod progress;
mod request;
mod runner;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Detect headings in PDF documents and write them back as bookmarks, or export existing bookmarks"
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Log every filter and matching decision
    #[clap(long, env = "PDFMARK_DEBUG", global = true, default_value = "false")]
    debug: bool,

    /// Print progress events and the result as JSON lines
    #[clap(long, env = "PDFMARK_JSON", global = true, default_value = "false")]
    json: bool,
}

#[derive(Debug, clap::Parser)]
pub enum SubCommands {
    /// Detect headings and write them as bookmarks
    Auto(crate::bookmark::AutoArgs),

    /// Bookmark the titles listed in a JSON, CSV or TXT file
    File(crate::bookmark::FileArgs),

    /// Bookmark the headings of a Markdown outline
    Markdown(crate::bookmark::MarkdownArgs),

    /// Export the existing bookmarks of a PDF
    Extract(crate::bookmark::ExtractArgs),

    /// Markdown outline utilities
    MD(crate::md::App),

    /// Run an invocation given as JSON (file or stdin)
    Run(crate::request::RunArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let app = App::parse();

    // RUST_LOG still takes precedence over the default filter.
    let default_filter = if app.global.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
    color_eyre::install()?;

    let result = match app.command {
        SubCommands::Auto(args) => crate::bookmark::auto(args, app.global).await,
        SubCommands::File(args) => crate::bookmark::file(args, app.global).await,
        SubCommands::Markdown(args) => crate::bookmark::markdown(args, app.global).await,
        SubCommands::Extract(args) => crate::bookmark::extract(args, app.global).await,
        SubCommands::MD(sub_app) => crate::md::run(sub_app, app.global).await,
        SubCommands::Run(args) => crate::request::run(args, app.global).await,
    };

    // The worker has already stopped and cleaned up by now.
    if let Err(err) = &result {
        if matches!(err.downcast_ref::<Error>(), Some(Error::Cancelled)) {
            std::process::exit(130);
        }
    }
    result.map_err(|err: color_eyre::eyre::Report| eyre!(err))
}
