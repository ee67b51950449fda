// ABOUTME: Library root for hoist - exposes the build and promotion components.
// ABOUTME: The main binary is in main.rs.

pub mod artifact;
pub mod build;
pub mod collab;
pub mod config;
pub mod diagnostics;
pub mod environment;
pub mod error;
pub mod event;
pub mod gate;
pub mod ledger;
pub mod output;
pub mod process;
pub mod promote;
pub mod registry;
pub mod retry;
pub mod rollback;
pub mod types;
pub mod version;
