//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for everything the Lua host
//! side of the bridge matches on: exit codes, the callback identifier wrapped
//! around every payload, the side-file sentinel and the token vocabulary.

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_UNKNOWN_ERROR: u8 = 1;
pub const EXIT_ASSERT_FAILED: u8 = 2;

/// Name of the Lua function the host defines to receive results: `_(...)`.
pub const CALLBACK_FUNCTION_NAME: &str = "_";

/// Printed instead of the payload when the payload went to the side file.
pub const TEMP_FILE_OUTPUT_MARK: &str = "TEMP_FILE_OUTPUT";

/// Payloads longer than this are written to the side file when one is given.
pub const DEFAULT_SPILL_THRESHOLD_BYTES: usize = 8 * 1024 * 1024;

pub const OP_CREATE_DIRS: &str = "create_dirs";
pub const OP_DELETE_PATH: &str = "delete_path";
pub const OP_MOVE_PATH: &str = "move_path";
pub const OP_REDIRECT_EXTERNAL_COMMAND: &str = "redirect_external_command";
pub const OP_READ_UTF8_FILE: &str = "read_utf8_file";
pub const OP_CALCULATE_FILE_MD5: &str = "calculate_file_md5";
pub const OP_CALCULATE_FILE_SHA256: &str = "calculate_file_sha256";
pub const OP_REQUEST_URLS: &str = "request_urls";

pub const ARG_PATH: &str = "path";
pub const ARG_SRC_PATH: &str = "src_path";
pub const ARG_DST_PATH: &str = "dst_path";
pub const ARG_CONTENT: &str = "content";
pub const ARG_CMD_ARGS: &str = "cmd_args";
pub const ARG_TMP_PATH: &str = "tmp_path";
pub const ARG_BYTE_COUNT: &str = "byte_count";
pub const ARG_URLS: &str = "urls";
pub const ARG_TIMEOUT: &str = "timeout";
pub const ARG_FLAGS: &str = "flags";

// Per-URL flag bits for `request_urls`.
pub const REQUEST_FLAG_UNCOMPRESS: i64 = 1 << 0;
pub const REQUEST_FLAG_ACCEPT_XML: i64 = 1 << 1;

pub const REQUEST_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:44.0) Gecko/20100101 Firefox/44.0";

pub const REQUEST_STAGGER_BATCH: usize = 3;
pub const REQUEST_STAGGER_DELAY_MS: u64 = 400;
