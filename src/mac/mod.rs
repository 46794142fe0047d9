//! macOS-only Mach kernel bindings shared by the remote reader and process
//! map realizations, plus a thin `libproc` FFI helper used to recover a
//! mapped region's backing file path (Mach's own region-enumeration calls
//! don't carry one).

pub mod libproc;
pub mod mach;
