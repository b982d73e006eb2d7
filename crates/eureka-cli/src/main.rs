//! eureka: load, inspect and save EurekaBox documents from the command line.
//!
//! Drives the same `ContentEditor` session the block editor uses, against
//! the REST content API.

mod config;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use eureka_editor::{ContentEditor, HttpContentApi, LoadOutcome, html, markdown};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "eureka")]
#[command(about = "Load, inspect and save EurekaBox documents")]
struct Args {
    /// Content API base URL
    #[arg(long, global = true, env = "EUREKA_API_URL")]
    api_url: Option<String>,

    /// Bearer token, if the API requires one
    #[arg(long, global = true, env = "EUREKA_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a document as markdown
    Show {
        /// Document id
        id: String,
    },
    /// Write a document's blocks as annotated HTML
    Pull {
        /// Document id
        id: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replace a document's content with an HTML file and save it
    Push {
        /// Document id
        id: String,

        /// HTML file, as written by `pull`
        file: PathBuf,

        /// New document title (keeps the current one if omitted)
        #[arg(long)]
        title: Option<String>,
    },
}

type Editor = ContentEditor<HttpContentApi>;

/// Load a document, turning a failed load into an error.
async fn open(api: HttpContentApi, id: &str) -> Result<Editor> {
    let editor = ContentEditor::new(api, id);
    match editor.load().await {
        LoadOutcome::Loaded { blocks } => info!("Loaded {} ({} blocks)", id, blocks),
        LoadOutcome::Imported { blocks } => {
            info!("Imported {} from its snapshot ({} blocks)", id, blocks)
        }
        LoadOutcome::Failed => {
            let err = editor
                .error()
                .map(anyhow::Error::new)
                .unwrap_or_else(|| anyhow!("unknown error"));
            return Err(err.context(format!("Failed to load document {}", id)));
        }
        other => bail!("Load of document {} did not complete: {:?}", id, other),
    }
    Ok(editor)
}

/// Write `text` to `path`, or stdout when no path is given.
fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            print!("{}", text);
            Ok(())
        }
    }
}

async fn push(api: HttpContentApi, id: &str, file: &Path, title: Option<String>) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let blocks = html::html_to_blocks(&raw)
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    let editor = open(api, id).await?;
    let title = match title {
        Some(title) => title,
        None => editor
            .content()
            .map(|document| document.title)
            .unwrap_or_default(),
    };

    debug!("Replacing working copy with {} blocks", blocks.len());
    editor.replace_blocks(blocks);
    let report = editor
        .save(&title)
        .await
        .with_context(|| format!("Failed to save document {}", id))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Respects RUST_LOG, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,eureka=debug,eureka_editor=debug"
    } else {
        "eureka=info,eureka_editor=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::resolve(args.api_url, args.token)?;
    debug!("Content API: {}", config.api_url);

    let mut api = HttpContentApi::new(config.api_url);
    if let Some(token) = config.token {
        api = api.with_token(token);
    }

    match args.command {
        Command::Show { id } => {
            let editor = open(api, &id).await?;
            let markdown = markdown::blocks_to_markdown(&editor.blocks());
            println!("{}", markdown);
        }
        Command::Pull { id, output } => {
            let editor = open(api, &id).await?;
            let annotated = html::blocks_to_annotated_html(&editor.blocks());
            write_output(output.as_deref(), &annotated)?;
        }
        Command::Push { id, file, title } => push(api, &id, &file, title).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_args_parse_push() {
        let args = Args::parse_from([
            "eureka",
            "--api-url",
            "http://localhost:9000",
            "push",
            "doc-1",
            "doc.html",
            "--title",
            "Renamed",
        ]);

        assert_eq!(args.api_url.as_deref(), Some("http://localhost:9000"));
        match args.command {
            Command::Push { id, file, title } => {
                assert_eq!(id, "doc-1");
                assert_eq!(file, PathBuf::from("doc.html"));
                assert_eq!(title.as_deref(), Some("Renamed"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_args_global_flags_after_subcommand() {
        let args = Args::parse_from(["eureka", "show", "doc-1", "--verbose", "--token", "t"]);
        assert!(args.verbose);
        assert_eq!(args.token.as_deref(), Some("t"));
    }

    #[test]
    fn test_connection_flags_fall_back_to_env() {
        use clap::CommandFactory;
        use std::ffi::OsStr;

        let command = Args::command();
        let env_of = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .map(OsStr::to_os_string)
        };

        assert_eq!(env_of("api_url").as_deref(), Some(OsStr::new("EUREKA_API_URL")));
        assert_eq!(env_of("token").as_deref(), Some(OsStr::new("EUREKA_API_TOKEN")));
    }

    #[test]
    fn test_write_output_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.html");

        write_output(Some(&path), "<p>Hello</p>\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<p>Hello</p>\n");
    }
}
