use plugflow_core::{init_logging, init_stderr_logging, logging_status};

// Logging state is process-wide, so this binary holds a single test.
#[test]
fn stderr_logging_starts_once_and_rejects_file_sinks() {
    assert!(init_stderr_logging("loud").is_err());
    assert!(logging_status().is_none());

    init_stderr_logging("warning").expect("stderr logging");
    init_stderr_logging("WARN").expect("same level is idempotent");
    assert_eq!(logging_status(), Some(("warn", None)));

    let level_error = init_stderr_logging("debug").expect_err("level conflict");
    assert!(level_error.contains("refusing to switch"));

    let dir = std::env::temp_dir().join(format!("plugflow-stderr-{}", std::process::id()));
    let dir_error = init_logging("warn", &dir.to_string_lossy()).expect_err("sink conflict");
    assert!(dir_error.contains("already initialized at stderr"));
    log::warn!("event=stderr_logging module=tests status=ok");
}
