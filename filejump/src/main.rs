mod commands;

use anyhow::Context;
use filejump_backend::{FileJumpFs, Options};
use tokio_util::sync::CancellationToken;

const USAGE: &str = "\
Usage: filejump [--root <path>] <command> [args]

Commands:
  ls [dir]                          List a directory
  stat <path>                       Show size, modification time and id of a file
  mkdir <dir>                       Create a directory and any missing parents
  rmdir <dir>                       Remove an empty directory
  purge <dir>                       Remove a directory and all of its contents
  cat <path> [--offset N] [--count N]
                                    Write a file (or a byte range of it) to stdout
  put <local-file> <path>           Upload a local file
  rm <path>                         Delete a file

Configuration is read from FILEJUMP_* variables (and .env):
  FILEJUMP_ACCESS_TOKEN (required), FILEJUMP_UPLOAD_CUTOFF, FILEJUMP_ENCODING,
  FILEJUMP_BASE_URL, FILEJUMP_LIST_CHUNK, FILEJUMP_PACER_MIN_SLEEP_MS,
  FILEJUMP_PACER_MAX_SLEEP_MS, FILEJUMP_LOW_LEVEL_RETRIES
Logging is controlled with RUST_LOG (default: warn).";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    List { dir: String },
    Stat { path: String },
    Mkdir { dir: String },
    Rmdir { dir: String },
    Purge { dir: String },
    Cat {
        path: String,
        offset: u64,
        count: Option<u64>,
    },
    Put { local: String, remote: String },
    Remove { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Run { root: String, command: Command },
    Help,
}

fn parse_cli<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut root = String::new();
    let mut positional = Vec::new();
    let mut offset = 0u64;
    let mut count = None;

    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(CliMode::Help),
            "--root" => root = args.next().context("--root needs a value")?,
            "--offset" => {
                let value = args.next().context("--offset needs a value")?;
                offset = value
                    .parse()
                    .with_context(|| format!("invalid --offset {value:?}"))?;
            }
            "--count" => {
                let value = args.next().context("--count needs a value")?;
                count = Some(
                    value
                        .parse()
                        .with_context(|| format!("invalid --count {value:?}"))?,
                );
            }
            other if other.starts_with("--") => anyhow::bail!("unknown argument: {other}"),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let Some(name) = positional.next() else {
        return Ok(CliMode::Help);
    };
    let mut operand = |what: &str| {
        positional
            .next()
            .with_context(|| format!("{name} needs {what}"))
    };
    let command = match name.as_str() {
        "ls" => Command::List {
            dir: operand("a directory").unwrap_or_default(),
        },
        "stat" => Command::Stat {
            path: operand("a path")?,
        },
        "mkdir" => Command::Mkdir {
            dir: operand("a directory")?,
        },
        "rmdir" => Command::Rmdir {
            dir: operand("a directory")?,
        },
        "purge" => Command::Purge {
            dir: operand("a directory")?,
        },
        "cat" => Command::Cat {
            path: operand("a path")?,
            offset,
            count,
        },
        "put" => Command::Put {
            local: operand("a local file")?,
            remote: operand("a destination path")?,
        },
        "rm" => Command::Remove {
            path: operand("a path")?,
        },
        other => anyhow::bail!("unknown command: {other}"),
    };
    if let Some(extra) = positional.next() {
        anyhow::bail!("unexpected argument: {extra}");
    }
    if (offset != 0 || count.is_some()) && !matches!(command, Command::Cat { .. }) {
        anyhow::bail!("--offset and --count only apply to cat");
    }
    Ok(CliMode::Run { root, command })
}

/// Respects `RUST_LOG` if set, otherwise logs warnings and errors to stderr.
fn setup_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let (root, command) = match parse_cli(std::env::args())? {
        CliMode::Help => {
            println!("{USAGE}");
            return Ok(());
        }
        CliMode::Run { root, command } => (root, command),
    };
    setup_tracing();

    let options = Options::from_env().context("failed to load FileJump configuration")?;
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling requests");
                cancel.cancel();
            }
        }
    });

    let fs = FileJumpFs::with_cancellation("filejump", &root, options, cancel)
        .await
        .with_context(|| format!("failed to open remote root {root:?}"))?;
    commands::run(&fs, command).await
}
