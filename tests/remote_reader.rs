//! Exercises the platform [`RemoteMemoryReader`] by reading this test
//! process's own memory through the same code path used against a real
//! target, mirroring the "write a known value, read it back remotely"
//! check used for the process-map parser.

use stackshot::remote::{self, RemoteAddress, RemoteMemoryReaderExt};

#[test]
fn reads_a_known_value_out_of_this_process() {
    let needle: u64 = 0xDEAD_BEEF_CAFE_F00D;
    let boxed = Box::new(needle);
    let addr = RemoteAddress(&*boxed as *const u64 as u64);

    let pid = std::process::id() as i32;
    let reader = remote::open_platform_reader(pid).expect("failed to open self reader");

    let value: u64 = reader.read_pod(addr).expect("failed to read known value");
    assert_eq!(value, needle);
}

#[test]
fn reads_a_nul_terminated_string_out_of_this_process() {
    let text = b"hello-stackshot\0";
    let addr = RemoteAddress(text.as_ptr() as u64);

    let pid = std::process::id() as i32;
    let reader = remote::open_platform_reader(pid).expect("failed to open self reader");

    let bytes = reader.read_cstr(addr, 64).expect("failed to read cstr");
    assert_eq!(bytes, b"hello-stackshot");
}

#[test]
fn bounded_reader_rejects_reads_outside_the_declared_range() {
    let needle: u64 = 42;
    let boxed = Box::new(needle);
    let addr = RemoteAddress(&*boxed as *const u64 as u64);

    let pid = std::process::id() as i32;
    let platform = remote::open_platform_reader(pid).expect("failed to open self reader");
    // Bounds that exclude the address entirely: any window elsewhere in the
    // address space works, since the point is to prove the bound is
    // enforced before the platform read ever runs.
    let bounded = remote::BoundedReader::new(platform, pid, 0x1, 0x2);

    let err = bounded.read_pod::<u64>(addr).unwrap_err();
    assert!(matches!(err, stackshot::ReadError::MemoryFault { .. }));
}
