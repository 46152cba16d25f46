//! Common test utilities for parcel-sync integration tests

#[allow(dead_code)]
pub mod fixtures;
#[allow(dead_code)]
pub mod sessions;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use sessions::*;
