use std::process::Command;

/// Path to the benchmark binary Cargo built for this test run.
const BIN: &str = env!("CARGO_BIN_EXE_group-comm-benchmark");

fn run(args: &[&str]) -> std::process::ExitStatus {
    Command::new(BIN)
        .args(args)
        .status()
        .expect("failed to run the benchmark binary")
}

/// A valid local-fabric run exits 0.
#[test]
fn a_valid_run_exits_zero() {
    let status = run(&[
        "--fabric",
        "local",
        "-p",
        "broadcast",
        "reduce",
        "-n",
        "2",
        "-s",
        "64",
        "--capacity",
        "256",
        "-i",
        "5",
    ]);
    assert!(status.success());
}

/// An out-of-range role exits 1 on the process that evaluated it.
#[test]
fn an_invalid_role_exits_one() {
    let status = run(&[
        "--fabric", "local", "-p", "broadcast", "-n", "2", "--", "9",
    ]);
    assert_eq!(status.code(), Some(1));
}

/// Ping-pong with a single member exits 1 before anything is wired.
#[test]
fn a_solo_ping_pong_exits_one() {
    let status = run(&["--fabric", "local", "-p", "ping-pong", "-n", "1"]);
    assert_eq!(status.code(), Some(1));
}

/// An inconsistent size configuration (message larger than capacity) is
/// rejected at configuration time with exit 1.
#[test]
fn an_oversized_message_exits_one() {
    let status = run(&[
        "--fabric", "local", "-s", "4096", "--capacity", "1024", "-n", "2",
    ]);
    assert_eq!(status.code(), Some(1));
}

/// The launcher spawns a real two-member TCP group and exits 0 when every
/// member completes.
#[test]
fn the_launcher_drives_a_tcp_pair_to_completion() {
    let status = run(&[
        "--fabric",
        "tcp",
        "-p",
        "broadcast",
        "scatter",
        "-n",
        "2",
        "-s",
        "128",
        "--capacity",
        "512",
        "-i",
        "5",
        "--port",
        "21900",
    ]);
    assert!(status.success());
}

/// The launcher exits 1 when its members reject the configuration.
#[test]
fn the_launcher_fails_when_members_reject_the_role() {
    let status = run(&[
        "--fabric",
        "tcp",
        "-p",
        "broadcast",
        "-n",
        "2",
        "--port",
        "21910",
        "--",
        "7",
    ]);
    assert_eq!(status.code(), Some(1));
}
