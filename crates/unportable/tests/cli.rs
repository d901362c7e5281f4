use std::path::Path;
use std::process::{Command, Output};

fn run_unportable(args: &[&str], envs: &[(&str, &str)]) -> Output {
    let exe = env!("CARGO_BIN_EXE_unportable");
    let mut cmd = Command::new(exe);
    cmd.args(args);
    cmd.env_remove("UNPORTABLE_SPILL_THRESHOLD");
    for (k, v) in envs {
        cmd.env(k, v);
    }
    cmd.output().expect("run unportable")
}

fn stdout_of(out: &Output) -> String {
    String::from_utf8(out.stdout.clone()).expect("utf-8 stdout")
}

fn path_str(p: &Path) -> &str {
    p.to_str().expect("utf-8 temp path")
}

#[test]
fn unknown_operation_exits_1_without_output() {
    let out = run_unportable(&["no_such_op", "path", "/tmp"], &[]);
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
}

#[test]
fn missing_operation_exits_1() {
    let out = run_unportable(&[], &[]);
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
}

#[test]
fn create_dirs_on_fresh_path_prints_true() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let target = tmp.path().join("x/y");
    let out = run_unportable(&["create_dirs", "path", path_str(&target)], &[]);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert_eq!(stdout_of(&out), "_(true)\n");
    assert!(target.is_dir());
}

#[test]
fn delete_path_on_missing_path_exits_2() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let missing = tmp.path().join("gone");
    let out = run_unportable(&["delete_path", "path", path_str(&missing)], &[]);
    assert_eq!(out.status.code(), Some(2));
    assert!(out.stdout.is_empty());
}

#[test]
fn unknown_tokens_are_ignored() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let target = tmp.path().join("d");
    let out = run_unportable(
        &["create_dirs", "mode", "0755", "path", path_str(&target), "extra"],
        &[],
    );
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(stdout_of(&out), "_(true)\n");
}

#[test]
fn read_utf8_file_quotes_content() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let file = tmp.path().join("f.lua");
    std::fs::write(&file, "return t[a[1]]").expect("write");
    let out = run_unportable(&["read_utf8_file", "path", path_str(&file)], &[]);
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(stdout_of(&out), "_([=[return t[a[1]]]=])\n");
}

#[test]
fn large_payload_spills_to_tmp_path() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let file = tmp.path().join("big.txt");
    std::fs::write(&file, "0123456789").expect("write");
    let side = tmp.path().join("side.lua");
    let out = run_unportable(
        &[
            "read_utf8_file",
            "path",
            path_str(&file),
            "tmp_path",
            path_str(&side),
        ],
        &[("UNPORTABLE_SPILL_THRESHOLD", "8")],
    );
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(stdout_of(&out), "TEMP_FILE_OUTPUT\n");
    assert_eq!(
        std::fs::read_to_string(&side).expect("side file"),
        "_([[0123456789]])"
    );
}

#[test]
fn malformed_config_env_exits_1() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let target = tmp.path().join("never");
    let out = run_unportable(
        &["create_dirs", "path", path_str(&target)],
        &[("UNPORTABLE_SPILL_THRESHOLD", "lots")],
    );
    assert_eq!(out.status.code(), Some(1));
    assert!(!target.exists());
}

#[test]
fn md5_of_prefix() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let file = tmp.path().join("data");
    std::fs::write(&file, b"abcdef").expect("write");
    let out = run_unportable(
        &["calculate_file_md5", "byte_count", "3", "path", path_str(&file)],
        &[],
    );
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(stdout_of(&out), "_([[900150983cd24fb0d6963f7d28e17f72]])\n");
}

#[cfg(unix)]
#[test]
fn redirect_external_command_returns_code_and_stdout() {
    let out = run_unportable(
        &[
            "redirect_external_command",
            "cmd_args",
            "3",
            "sh",
            "-c",
            "tr a-z A-Z",
            "content",
            "shout",
        ],
        &[],
    );
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(stdout_of(&out), "_(0,[[SHOUT]])\n");
}

#[test]
fn hyphen_tokens_after_the_operation_are_plain_tokens() {
    let tmp = tempfile::tempdir().expect("tempdir");
    for (i, noise) in ["--help", "-x", "--", "--version"].into_iter().enumerate() {
        let target = tmp.path().join(format!("d{i}"));
        let out = run_unportable(&["create_dirs", noise, "path", path_str(&target)], &[]);
        assert_eq!(out.status.code(), Some(0), "noise token {noise:?}");
        assert_eq!(stdout_of(&out), "_(true)\n", "noise token {noise:?}");
        assert!(target.is_dir(), "noise token {noise:?}");
    }
}

#[test]
fn help_before_the_operation_is_handled_by_the_cli() {
    let out = run_unportable(&["--help"], &[]);
    assert_eq!(out.status.code(), Some(0));
    assert!(stdout_of(&out).contains("OPERATION"));
}
