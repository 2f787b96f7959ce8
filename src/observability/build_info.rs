//! Build metadata: the version reported in `User-Agent` and the build-info gauge.

use crate::observability::metrics;

pub const SERVICE_NAME: &str = "psystrike";

/// Version information baked in at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: Option<String>,
    pub commit: Option<String>,
}

impl BuildInfo {
    /// Build info of the running binary. `PSYSTRIKE_GIT_COMMIT` may be set at
    /// build time to stamp the commit hash.
    pub fn current() -> Self {
        Self {
            version: option_env!("CARGO_PKG_VERSION")
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            commit: option_env!("PSYSTRIKE_GIT_COMMIT")
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        }
    }

    /// `psystrike/<version>`, or an empty string when the version is unknown.
    pub fn user_agent(&self) -> String {
        match self.version.as_deref() {
            Some(version) if !version.is_empty() => format!("{SERVICE_NAME}/{version}"),
            _ => String::new(),
        }
    }

    /// Publish the constant build-info gauge.
    pub fn export(&self) {
        metrics::record_build_info(
            self.version.as_deref().unwrap_or("unknown"),
            self.commit.as_deref().unwrap_or("unknown"),
        );
    }
}
