mod common;

#[test]
fn version_flag_prints_name_and_version() {
    let output = common::notifyd_bin().arg("--version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("notifyd "));
}

#[test]
fn help_flag_mentions_config_file() {
    let output = common::notifyd_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("config.toml"));
}

#[test]
fn unknown_option_exits_nonzero() {
    let output = common::notifyd_bin().arg("--bogus").output().unwrap();
    assert!(!output.status.success());
}
