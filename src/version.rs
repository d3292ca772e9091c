//! Version and build information

use std::fmt;

use serde::Serialize;

/// Build information embedded at compile time
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    /// Short git hash, "unknown" outside a checkout
    pub git_hash: &'static str,
    pub git_dirty: bool,
    pub build_timestamp: &'static str,
    pub target: &'static str,
    pub profile: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    /// Information for this binary
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            git_hash: env!("LLM_LOADER_GIT_HASH"),
            git_dirty: env!("LLM_LOADER_GIT_DIRTY") == "true",
            build_timestamp: env!("LLM_LOADER_BUILD_TIMESTAMP"),
            target: env!("LLM_LOADER_TARGET"),
            profile: env!("LLM_LOADER_PROFILE"),
            rustc_version: env!("LLM_LOADER_RUSTC_VERSION"),
        }
    }

    /// Version with git revision, e.g. "0.1.0-abc1234"
    pub fn full_version(&self) -> String {
        let dirty = if self.git_dirty { "-dirty" } else { "" };
        format!("{}-{}{}", self.version, self.git_hash, dirty)
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.name, self.full_version())?;
        writeln!(f, "  built:   {} ({})", self.build_timestamp, self.profile)?;
        writeln!(f, "  target:  {}", self.target)?;
        writeln!(f, "  rustc:   {}", self.rustc_version)
    }
}

/// Print version information to stdout
pub fn print_version() {
    print!("{}", BuildInfo::current());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_info_exists() {
        let info = BuildInfo::current();
        assert_eq!(info.name, "llm-loader");
        assert!(!info.version.is_empty());
    }

    #[test]
    fn test_full_version_format() {
        let info = BuildInfo::current();
        let full = info.full_version();
        assert!(full.starts_with(info.version));
        assert!(full.contains(info.git_hash));
    }

    #[test]
    fn test_display_format() {
        let display = BuildInfo::current().to_string();
        assert!(display.contains("target:"));
        assert!(display.contains("rustc:"));
    }
}
