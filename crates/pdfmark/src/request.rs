use std::io::Read;
use std::path::PathBuf;

use pdfmark_engine::Invocation;

use crate::prelude::*;

#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// JSON invocation file; reads stdin when omitted or "-"
    path: Option<PathBuf>,
}

/// Run an invocation described as JSON. Events are always printed as JSON
/// lines so the caller can follow progress.
pub async fn run(args: RunArgs, global: crate::Global) -> Result<()> {
    let raw = match args.path.as_deref() {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .wrap_err_with(|| f!("Failed to read invocation from {}", path.display()))?,
        _ => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .wrap_err("Failed to read invocation from stdin")?;
            buffer
        }
    };

    let mut invocation = parse_invocation(&raw)?;
    invocation.debug |= global.debug;

    let global = crate::Global {
        json: true,
        ..global
    };
    crate::runner::execute(invocation, &global).await
}

fn parse_invocation(raw: &str) -> Result<Invocation> {
    serde_json::from_str(raw).map_err(|err| Error::InvalidInvocation(err.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfmark_engine::config::InvocationMode;

    #[test]
    fn test_parse_invocation() {
        let inv = parse_invocation(
            r#"{"inputPath": "book.pdf", "mode": "bookmark-file-assisted", "bookmarkFilePath": "toc.csv"}"#,
        )
        .unwrap();
        assert_eq!(inv.mode, InvocationMode::BookmarkFileAssisted);
        assert_eq!(inv.bookmark_file_path, Some(PathBuf::from("toc.csv")));
        assert!(inv.include_page_info);
    }

    #[test]
    fn test_malformed_invocation() {
        let err = parse_invocation("{\"mode\": 3}").unwrap_err();
        assert!(err.to_string().starts_with("Invalid invocation"));
    }
}
