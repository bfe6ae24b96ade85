//! Build-time metadata embedded by the build script.
//!
//! Reported by the `/health` route and stamped on every metadata index.

/// Package version of `convokit-core`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short commit hash, `unknown` when built outside a git checkout.
pub const GIT_HASH: &str = env!("CONVOKIT_GIT_HASH");

/// Cargo profile the runtime was built with.
pub const BUILD_PROFILE: &str = env!("CONVOKIT_BUILD_PROFILE");

/// `VERSION (GIT_HASH, BUILD_PROFILE)`, as logged when the service starts.
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_layout() {
        let expected = format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})");
        assert_eq!(version_string(), expected);
        assert!(!GIT_HASH.is_empty());
    }
}
