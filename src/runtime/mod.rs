//! Concrete [`crate::layout::RuntimeFamily`] implementations. `cpython` is
//! the one shipped with this crate; the trait boundary is where a second
//! family would plug in without touching the sampler core.

pub mod cpython;
