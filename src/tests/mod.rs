//! tests/mod.rs

mod config_tests;
mod download_tests;
mod fetch_tests;
mod supervisor_tests;
mod watcher_tests;
