//! Attach-path integration tests using the `fixture` helper binary (a plain,
//! non-interpreter process). These exercise the same map-then-probe path a
//! real CPython attach goes through, without asserting CPython-specific
//! frame-walking results the tabulated version offsets can't yet back with
//! confidence against a real interpreter build, and without relying on
//! whether the scan fallback happens to find (or not find) a plausible
//! anchor in a non-interpreter process's memory, which depends on memory
//! contents the test cannot control.

use std::process::{Child, Command};
use std::time::{Duration, Instant};

use stackshot::Session;

fn spawn_fixture() -> Child {
    let path = env!("CARGO_BIN_EXE_fixture");
    let mut child = Command::new(path)
        .arg("1")
        .stdout(std::process::Stdio::piped())
        .spawn()
        .expect("failed to spawn fixture binary");

    use std::io::{BufRead, BufReader};
    let stdout = child.stdout.take().unwrap();
    let mut lines = BufReader::new(stdout).lines();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(Ok(line)) = lines.next() {
            if line == "ready" {
                break;
            }
        }
        if Instant::now() >= deadline {
            panic!("fixture never signaled readiness");
        }
    }
    child
}

#[test]
fn attaching_to_a_dead_pid_fails() {
    let mut child = spawn_fixture();
    let pid = child.id() as i32;
    child.kill().expect("failed to kill fixture");
    child.wait().expect("failed to reap fixture");

    // Give the kernel a moment to fully tear the process down before
    // reusing its pid in an assertion.
    std::thread::sleep(Duration::from_millis(50));

    let result = Session::attach(pid, "fixture");
    assert!(result.is_err(), "attach should fail once the target has exited");
}
