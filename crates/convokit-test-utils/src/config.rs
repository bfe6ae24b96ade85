//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use std::path::Path;

use convokit_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .listen_port(8080)
///     .component_dir(dir.path())
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn listen_addr(mut self, addr: &str) -> Self {
        self.config.server.listen_addr = addr.to_string();
        self
    }

    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.server.listen_port = port;
        self
    }

    pub fn base_path(mut self, base_path: &str) -> Self {
        self.config.server.base_path = base_path.to_string();
        self
    }

    pub fn component_dir(mut self, dir: &Path) -> Self {
        self.config.registry.component_dir = dir.to_path_buf();
        self
    }

    pub fn extensions(mut self, extensions: &[&str]) -> Self {
        self.config.registry.extensions = extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn recursive_merge(mut self, recursive: bool) -> Self {
        self.config.registry.recursive_merge = recursive;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
