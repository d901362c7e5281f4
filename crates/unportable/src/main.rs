use std::ffi::OsString;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};
use unportable::config::ENV_LOG;
use unportable::{invoke, Config, Context, HttpFetcher, Registry};
use unportable_contracts::{EXIT_SUCCESS, EXIT_UNKNOWN_ERROR};

#[derive(Debug, Parser)]
#[command(name = "unportable")]
#[command(about = "Run a host-side operation on behalf of a Lua runtime.", long_about = None)]
#[command(version)]
#[command(override_usage = "unportable <OPERATION> [NAME VALUE...]")]
#[command(after_help = "Tokens after the operation are passed through as-is. Unknown names are ignored.")]
struct Cli {
    /// Operation to run, e.g. `create_dirs` or `request_urls`.
    operation: String,
}

/// Splits argv into the part clap parses (program and operation) and the
/// operation's tokens, which are taken verbatim even when they look like flags.
fn split_argv(mut argv: Vec<OsString>) -> (Vec<OsString>, Vec<String>) {
    let head = argv.len().min(2);
    let tokens = argv
        .drain(head..)
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    (argv, tokens)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("warn"));
    // stdout carries the protocol; diagnostics only ever go to stderr.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(false),
        )
        .try_init();
}

fn main() -> ExitCode {
    init_tracing();

    let (head, tokens) = split_argv(std::env::args_os().collect());
    let cli = match Cli::try_parse_from(head) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::from(EXIT_SUCCESS)
                }
                _ => ExitCode::from(EXIT_UNKNOWN_ERROR),
            };
        }
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("{err:#}");
            return ExitCode::from(EXIT_UNKNOWN_ERROR);
        }
    };

    let registry = Registry::builtin();
    let fetcher = HttpFetcher::new();
    let ctx = Context {
        config: &config,
        fetcher: &fetcher,
    };
    let mut stdout = std::io::stdout().lock();
    ExitCode::from(invoke(&registry, &cli.operation, &tokens, &ctx, &mut stdout))
}
