//! Exercises the Process Map Introspector against a real child process: the
//! `fixture` helper binary (see `src/bin/fixture.rs`), spawned fresh for
//! each test so nothing depends on this test process's own layout.

use std::process::{Child, Command};
use std::time::{Duration, Instant};

use stackshot::process_map;

fn spawn_fixture(thread_count: usize) -> Child {
    let path = env!("CARGO_BIN_EXE_fixture");
    let mut child = Command::new(path)
        .arg(thread_count.to_string())
        .stdout(std::process::Stdio::piped())
        .spawn()
        .expect("failed to spawn fixture binary");

    // Block until the fixture prints its ready line, so the map we read
    // reflects a process that has already mapped its heap and spawned its
    // threads.
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
fn finds_an_executable_mapping_for_the_fixture_binary() {
    let mut child = spawn_fixture(1);
    let pid = child.id() as i32;

    let map = process_map::load_memory_map(pid).expect("failed to read child's memory map");
    let selected = map
        .select_binary("fixture")
        .expect("expected an executable mapping matching 'fixture'");
    assert!(selected.executable);
    assert!(selected.size() > 0);

    child.kill().ok();
    child.wait().ok();
}

#[test]
fn finds_a_heap_mapping() {
    let mut child = spawn_fixture(1);
    let pid = child.id() as i32;

    let map = process_map::load_memory_map(pid).expect("failed to read child's memory map");
    assert!(map.heap().is_some(), "expected a heap mapping to be found");

    child.kill().ok();
    child.wait().ok();
}

#[test]
fn min_max_addr_span_the_real_mappings() {
    let mut child = spawn_fixture(1);
    let pid = child.id() as i32;

    let map = process_map::load_memory_map(pid).expect("failed to read child's memory map");
    assert!(map.min_addr > 0);
    assert!(map.max_addr > map.min_addr);

    const PSEUDO: &[&str] = &["[vsyscall]", "[vvar]", "[vdso]", "[vectors]"];
    let real_min = map
        .mappings
        .iter()
        .filter(|m| !m.path.as_deref().map(|p| PSEUDO.contains(&p)).unwrap_or(false))
        .map(|m| m.start.0)
        .min()
        .unwrap();
    let real_max = map
        .mappings
        .iter()
        .filter(|m| !m.path.as_deref().map(|p| PSEUDO.contains(&p)).unwrap_or(false))
        .map(|m| m.end.0)
        .max()
        .unwrap();
    assert_eq!(map.min_addr, real_min);
    assert_eq!(map.max_addr, real_max);

    child.kill().ok();
    child.wait().ok();
}

#[test]
fn select_binary_falls_back_to_size_when_name_hint_matches_nothing() {
    let mut child = spawn_fixture(1);
    let pid = child.id() as i32;

    let map = process_map::load_memory_map(pid).expect("failed to read child's memory map");
    let selected = map
        .select_binary("no-such-interpreter-name")
        .expect("expected a fallback match on a sizeable executable mapping");
    assert!(selected.executable);

    child.kill().ok();
    child.wait().ok();
}

#[test]
fn multithreaded_fixture_is_still_one_process_map() {
    let mut child = spawn_fixture(4);
    let pid = child.id() as i32;

    let map = process_map::load_memory_map(pid).expect("failed to read child's memory map");
    assert!(!map.mappings.is_empty());
    assert!(map.select_binary("fixture").is_some());

    child.kill().ok();
    child.wait().ok();
}

#[test]
fn load_memory_map_fails_for_a_nonexistent_pid() {
    // A pid far beyond any plausible live process on a freshly booted test
    // runner; `/proc/<pid>` (or the platform equivalent) simply won't exist.
    let result = process_map::load_memory_map(i32::MAX);
    assert!(result.is_err(), "expected no process to own pid i32::MAX");
}
