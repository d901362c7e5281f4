//! Operation registry and the single boundary where failures become exit codes.

use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use anyhow::Context as _;
use tracing::{debug, error, info, warn};
use unportable_contracts::{EXIT_SUCCESS, EXIT_UNKNOWN_ERROR, TEMP_FILE_OUTPUT_MARK};

use crate::args::{self, ArgDecl, Params};
use crate::config::Config;
use crate::error::{OpError, OpResult};
use crate::fetch::Fetcher;
use crate::lua::{self, Value};

/// A successful result that has something to hand back to the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub value: Value,
    /// Side file used when the rendered payload is over the spill threshold.
    pub spill_path: Option<PathBuf>,
}

impl Reply {
    pub fn new(value: impl Into<Value>) -> Self {
        Reply {
            value: value.into(),
            spill_path: None,
        }
    }

    pub fn spill_to(mut self, path: Option<&str>) -> Self {
        self.spill_path = path.filter(|p| !p.is_empty()).map(PathBuf::from);
        self
    }
}

/// What a handler can reach besides its parameters.
pub struct Context<'a> {
    pub config: &'a Config,
    pub fetcher: &'a dyn Fetcher,
}

pub type Handler = fn(&Params<'_>, &Context<'_>) -> OpResult<Option<Reply>>;

pub struct Operation {
    pub name: &'static str,
    pub decls: &'static [ArgDecl],
    pub handler: Handler,
}

/// Immutable name → operation table, built once at startup.
pub struct Registry {
    ops: Vec<Operation>,
}

impl Registry {
    pub fn new(ops: Vec<Operation>) -> Self {
        Registry { ops }
    }

    /// Every operation this binary ships.
    pub fn builtin() -> Self {
        let mut ops = crate::ops::operations();
        ops.push(crate::fetch::operation());
        Registry::new(ops)
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.ops.iter().find(|op| op.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.ops.iter().map(|op| op.name)
    }
}

/// Runs `name` against `tokens` and returns the process exit code.
///
/// On success with a reply, exactly one line goes to `out`. Failures write
/// nothing to `out`.
pub fn invoke(
    registry: &Registry,
    name: &str,
    tokens: &[String],
    ctx: &Context<'_>,
    out: &mut dyn Write,
) -> u8 {
    let Some(op) = registry.get(name) else {
        warn!(op = name, "unknown operation");
        return EXIT_UNKNOWN_ERROR;
    };

    let params = args::decode(tokens, op.decls);
    debug!(op = name, tokens = tokens.len(), params = ?params.slots(), "dispatch");

    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| (op.handler)(&params, ctx))) {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(OpError::Internal(anyhow::anyhow!("{name} panicked: {message}")))
        }
    };

    match outcome {
        Ok(None) => EXIT_SUCCESS,
        Ok(Some(reply)) => match emit(&reply, ctx.config.spill_threshold, out) {
            Ok(()) => EXIT_SUCCESS,
            Err(err) => {
                error!(op = name, "emit result: {err:#}");
                EXIT_UNKNOWN_ERROR
            }
        },
        Err(err) => {
            match &err {
                OpError::Precondition(_) => warn!(op = name, "{err}"),
                OpError::Internal(_) => error!(op = name, "{err}"),
            }
            err.exit_code()
        }
    }
}

fn emit(reply: &Reply, spill_threshold: usize, out: &mut dyn Write) -> anyhow::Result<()> {
    let text = lua::render_call(&reply.value);
    match &reply.spill_path {
        Some(path) if text.len() > spill_threshold => {
            std::fs::write(path, &text).with_context(|| format!("write {}", path.display()))?;
            info!(
                bytes = text.len(),
                path = %path.display(),
                "payload written to side file"
            );
            writeln!(out, "{TEMP_FILE_OUTPUT_MARK}").context("write stdout")?;
        }
        _ => {
            out.write_all(&text).context("write stdout")?;
            out.write_all(b"\n").context("write stdout")?;
        }
    }
    out.flush().context("flush stdout")?;
    Ok(())
}
