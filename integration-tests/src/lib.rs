//! Empty crate root; the actual scenarios live under `tests/` as
//! standard Cargo integration tests, each isolated with its own
//! `tempfile::tempdir`.
