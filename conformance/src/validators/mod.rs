//! Validators, one module per conformance concern.

pub mod merge_policy;
pub mod namespaces;
pub mod references;
pub mod roundtrip;
