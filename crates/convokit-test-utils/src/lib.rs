#![deny(unsafe_code)]

//! Shared test utilities for the Convokit workspace.
//!
//! Provides request builders, on-disk component trees, config builders, and
//! tracing helpers so that individual crate tests stay concise.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! convokit-test-utils = { workspace = true }
//! ```

pub mod component_dir;
pub mod config;
pub mod request;
pub mod tracing_setup;

pub use component_dir::ComponentDir;
pub use config::TestConfigBuilder;
pub use request::RequestBuilder;
pub use tracing_setup::{capture_logs, init_test_tracing};
