//! Filesystem, digest and process operations.
//!
//! Each handler checks its preconditions first and only then touches the
//! filesystem, so a precondition failure never leaves partial work behind.

use std::fs::File;
use std::io::{Read, Write as _};
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context as _, Result};
use md5::Md5;
use sha2::{Digest, Sha256};
use tracing::debug;
use unportable_contracts::{
    ARG_BYTE_COUNT, ARG_CMD_ARGS, ARG_CONTENT, ARG_DST_PATH, ARG_PATH, ARG_SRC_PATH,
    ARG_TMP_PATH, OP_CALCULATE_FILE_MD5, OP_CALCULATE_FILE_SHA256, OP_CREATE_DIRS,
    OP_DELETE_PATH, OP_MOVE_PATH, OP_READ_UTF8_FILE, OP_REDIRECT_EXTERNAL_COMMAND,
};

use crate::args::{ArgDecl, Params};
use crate::dispatch::{Context, Operation, Reply};
use crate::error::{ensure, OpError, OpResult};
use crate::lua::Value;

const PATH_DECLS: &[ArgDecl] = &[ArgDecl::str(ARG_PATH)];
const MOVE_DECLS: &[ArgDecl] = &[ArgDecl::str(ARG_SRC_PATH), ArgDecl::str(ARG_DST_PATH)];
const REDIRECT_DECLS: &[ArgDecl] = &[
    ArgDecl::str(ARG_CONTENT),
    ArgDecl::str_tuple(ARG_CMD_ARGS),
    ArgDecl::str(ARG_TMP_PATH),
];
const READ_DECLS: &[ArgDecl] = &[ArgDecl::str(ARG_PATH), ArgDecl::str(ARG_TMP_PATH)];
const DIGEST_DECLS: &[ArgDecl] = &[ArgDecl::str(ARG_PATH), ArgDecl::int(ARG_BYTE_COUNT)];

pub fn operations() -> Vec<Operation> {
    vec![
        Operation {
            name: OP_CREATE_DIRS,
            decls: PATH_DECLS,
            handler: create_dirs,
        },
        Operation {
            name: OP_DELETE_PATH,
            decls: PATH_DECLS,
            handler: delete_path,
        },
        Operation {
            name: OP_MOVE_PATH,
            decls: MOVE_DECLS,
            handler: move_path,
        },
        Operation {
            name: OP_REDIRECT_EXTERNAL_COMMAND,
            decls: REDIRECT_DECLS,
            handler: redirect_external_command,
        },
        Operation {
            name: OP_READ_UTF8_FILE,
            decls: READ_DECLS,
            handler: read_utf8_file,
        },
        Operation {
            name: OP_CALCULATE_FILE_MD5,
            decls: DIGEST_DECLS,
            handler: calculate_file_md5,
        },
        Operation {
            name: OP_CALCULATE_FILE_SHA256,
            decls: DIGEST_DECLS,
            handler: calculate_file_sha256,
        },
    ]
}

/// Requires a non-empty path whose existence matches `exists`.
fn assert_path<'p>(arg: &str, path: Option<&'p str>, exists: bool) -> OpResult<&'p Path> {
    let path = path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| OpError::precondition(format!("{arg} is required")))?;
    let path = Path::new(path);
    ensure(path.exists() == exists, || {
        let want = if exists { "exist" } else { "not exist" };
        format!("{arg} must {want}: {}", path.display())
    })?;
    Ok(path)
}

fn assert_file<'p>(arg: &str, path: Option<&'p str>) -> OpResult<&'p Path> {
    let path = assert_path(arg, path, true)?;
    ensure(path.is_file(), || {
        format!("{arg} must be a regular file: {}", path.display())
    })?;
    Ok(path)
}

fn create_dirs(p: &Params<'_>, _: &Context<'_>) -> OpResult<Option<Reply>> {
    let path = assert_path(ARG_PATH, p.str(ARG_PATH), false)?;
    std::fs::create_dir_all(path).with_context(|| format!("create dir: {}", path.display()))?;
    Ok(Some(Reply::new(true)))
}

fn delete_path(p: &Params<'_>, _: &Context<'_>) -> OpResult<Option<Reply>> {
    let path = assert_path(ARG_PATH, p.str(ARG_PATH), true)?;
    let meta = std::fs::symlink_metadata(path)
        .with_context(|| format!("stat {}", path.display()))?;
    // A symlink to a directory is removed as a link, never followed.
    if meta.is_dir() {
        std::fs::remove_dir_all(path).with_context(|| format!("remove dir: {}", path.display()))?;
    } else {
        std::fs::remove_file(path).with_context(|| format!("remove {}", path.display()))?;
    }
    Ok(Some(Reply::new(true)))
}

fn move_path(p: &Params<'_>, _: &Context<'_>) -> OpResult<Option<Reply>> {
    // Both paths are full paths; `dst_path` is never treated as a directory to move into.
    let src = assert_path(ARG_SRC_PATH, p.str(ARG_SRC_PATH), true)?;
    let dst = assert_path(ARG_DST_PATH, p.str(ARG_DST_PATH), false)?;
    if let Err(err) = std::fs::rename(src, dst) {
        debug!(src = %src.display(), dst = %dst.display(), "rename failed ({err}), copying");
        copy_then_remove(src, dst)?;
    }
    Ok(Some(Reply::new(true)))
}

fn copy_then_remove(src: &Path, dst: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(src).with_context(|| format!("stat {}", src.display()))?;
    if meta.is_dir() {
        copy_dir_all(src, dst)?;
        std::fs::remove_dir_all(src).with_context(|| format!("remove dir: {}", src.display()))?;
    } else {
        std::fs::copy(src, dst)
            .with_context(|| format!("copy {} -> {}", src.display(), dst.display()))?;
        std::fs::remove_file(src).with_context(|| format!("remove {}", src.display()))?;
    }
    Ok(())
}

fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst).with_context(|| format!("create dir: {}", dst.display()))?;
    for entry in std::fs::read_dir(src).with_context(|| format!("read_dir {}", src.display()))? {
        let entry = entry?;
        let ty = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if ty.is_dir() {
            copy_dir_all(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path).with_context(|| {
                format!("copy {} -> {}", src_path.display(), dst_path.display())
            })?;
        }
    }
    Ok(())
}

fn redirect_external_command(p: &Params<'_>, _: &Context<'_>) -> OpResult<Option<Reply>> {
    let cmd_args = p.str_tuple(ARG_CMD_ARGS).unwrap_or(&[]);
    ensure(!cmd_args.is_empty(), || format!("{ARG_CMD_ARGS} must be non-empty"))?;
    let tmp_path = p.str(ARG_TMP_PATH).filter(|s| !s.is_empty());

    let input = match (p.str(ARG_CONTENT).filter(|s| !s.is_empty()), tmp_path) {
        (Some(content), _) => content.as_bytes().to_vec(),
        (None, Some(_)) => {
            let path = assert_file(ARG_TMP_PATH, tmp_path)?;
            std::fs::read(path).with_context(|| format!("read {}", path.display()))?
        }
        (None, None) => Vec::new(),
    };
    ensure(!input.is_empty(), || "command input is empty".to_string())?;

    let out = run_with_stdin(cmd_args, input)?;
    let value = Value::Tuple(vec![Value::Int(out.exit_code), Value::Bytes(out.stdout)]);
    Ok(Some(Reply::new(value).spill_to(tmp_path)))
}

pub struct CommandOutput {
    pub exit_code: i64,
    pub stdout: Vec<u8>,
}

/// Runs `argv`, feeding `input` on stdin and collecting stdout. Stderr is inherited.
pub fn run_with_stdin(argv: &[String], input: Vec<u8>) -> Result<CommandOutput> {
    let (program, rest) = argv.split_first().context("empty command")?;
    let mut child = Command::new(program)
        .args(rest)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("spawn {program}"))?;

    let mut stdin = child.stdin.take().context("take stdin")?;
    let mut stdout = child.stdout.take().context("take stdout")?;

    // Feed stdin from a helper thread so a chatty child cannot deadlock us.
    let stdin_thread = std::thread::spawn(move || -> std::io::Result<()> {
        match stdin.write_all(&input).and_then(|()| stdin.flush()) {
            Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
    });

    let mut buf = Vec::new();
    stdout.read_to_end(&mut buf).context("read command stdout")?;
    let status = child.wait().with_context(|| format!("wait {program}"))?;
    stdin_thread
        .join()
        .unwrap_or_else(|_| Ok(()))
        .context("write command stdin")?;

    #[cfg(unix)]
    let exit_signal = {
        use std::os::unix::process::ExitStatusExt as _;
        status.signal()
    };
    #[cfg(not(unix))]
    let exit_signal: Option<i32> = None;

    let exit_code = match status.code() {
        Some(code) => code,
        None => exit_signal.map(|s| 128 + s).unwrap_or(1),
    };
    debug!(program = %program, exit_code, bytes = buf.len(), "command finished");
    Ok(CommandOutput {
        exit_code: i64::from(exit_code),
        stdout: buf,
    })
}

fn read_utf8_file(p: &Params<'_>, _: &Context<'_>) -> OpResult<Option<Reply>> {
    let path = assert_file(ARG_PATH, p.str(ARG_PATH))?;
    let text =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(Some(Reply::new(Value::Str(text)).spill_to(p.str(ARG_TMP_PATH))))
}

fn calculate_file_md5(p: &Params<'_>, _: &Context<'_>) -> OpResult<Option<Reply>> {
    let path = assert_file(ARG_PATH, p.str(ARG_PATH))?;
    let hex = digest_file::<Md5>(path, byte_limit(p))?;
    Ok(Some(Reply::new(hex)))
}

fn calculate_file_sha256(p: &Params<'_>, _: &Context<'_>) -> OpResult<Option<Reply>> {
    let path = assert_file(ARG_PATH, p.str(ARG_PATH))?;
    let hex = digest_file::<Sha256>(path, byte_limit(p))?;
    Ok(Some(Reply::new(hex)))
}

/// Zero, negative or missing `byte_count` hashes the whole file.
fn byte_limit(p: &Params<'_>) -> Option<u64> {
    p.int(ARG_BYTE_COUNT)
        .filter(|n| *n > 0)
        .map(i64::unsigned_abs)
}

fn digest_file<D: Digest>(path: &Path, limit: Option<u64>) -> Result<String> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader: Box<dyn Read> = match limit {
        Some(n) => Box::new(f.take(n)),
        None => Box::new(f),
    };
    let mut hasher = D::new();
    let mut buf = [0u8; 1024 * 64];
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_lower(&hasher.finalize()))
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}
