use assert_cmd::Command;

pub fn notifyd_bin() -> Command {
    #[allow(deprecated)]
    {
        Command::cargo_bin("notifyd").expect("notifyd test binary should build")
    }
}
