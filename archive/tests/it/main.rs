//! Integration tests.
//!
//! Fixture archives are generated at runtime with the `zip` crate so the suite
//! carries no binary test data. Tests in this module set up env_logger; use
//! `RUST_LOG=debug` to see its output.
