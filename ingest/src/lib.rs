//! The library portion of the scheduled file-ingestion engine.
//!
//! Every tick the engine fans out over the configured data sources and, for
//! each (data source, environment) pair:
//!
//! 1. Drains the configured source folders into a per-environment working
//!    directory, recording where every file came from.
//! 2. Iteratively expands archives in place (zip, tar, gzipped tar, 7z),
//!    flattening directories and preserving each file's first-level archive
//!    through any depth of nesting.
//! 3. Quarantines name collisions, non-xml survivors, and unreadable archives
//!    into the error tree, one error-log row per offender.
//! 4. Packs the surviving files into size-capped zip bundles and records one
//!    bundle-tracking row per bundle, carrying the full lineage of its members.
//! 5. Offers each bundle to the data lake and moves it into the backup tree.
//!
//! A process-wide single-flight gate drops overlapping ticks, and a daily
//! housekeeping sweep expires old backups and run logs.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod housekeeping;
pub mod lake;
pub mod layout;
pub mod lineage;
pub mod pipeline;
pub mod runlog;
pub mod scheduler;
pub mod stamp;
pub mod store;
