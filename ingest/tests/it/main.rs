//! Integration tests.
//!
//! Each test builds a disposable ingestion world on disk (a processing root,
//! source folders, and a seeded in-memory store), runs the pipeline or
//! scheduler against it, and asserts on the resulting trees and rows. Fixture
//! archives are generated at runtime; the suite carries no binary test data.

mod properties;
mod scenarios;
