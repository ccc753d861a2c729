//! Chromium browsers read a `URLBlocklist` policy from managed locations. On Windows those
//! are registry keys, elsewhere JSON files in a `policies/managed` directory.
//! [system_policy_store] picks the implementation for the current build.

pub mod managed_file;
#[cfg(feature = "win")]
pub mod registry;

use crate::error::BlockerError;

/// Name of the Chromium policy holding blocked url patterns.
pub const URL_BLOCKLIST_POLICY: &str = "URLBlocklist";

/// Browser vendors whose policies are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Browser {
    Chrome,
    Edge,
    Brave,
}

impl Browser {
    pub const ALL: [Browser; 3] = [Browser::Chrome, Browser::Edge, Browser::Brave];

    /// Policy key below `HKEY_LOCAL_MACHINE`.
    pub fn registry_key(&self) -> &'static str {
        match self {
            Browser::Chrome => r"SOFTWARE\Policies\Google\Chrome\URLBlocklist",
            Browser::Edge => r"SOFTWARE\Policies\Microsoft\Edge\URLBlocklist",
            Browser::Brave => r"SOFTWARE\Policies\BraveSoftware\Brave\URLBlocklist",
        }
    }

    /// Configuration root of the browser on Linux. Managed policies live in
    /// `<root>/policies/managed`.
    pub fn policy_root(&self) -> &'static str {
        match self {
            Browser::Chrome => "/etc/opt/chrome",
            Browser::Edge => "/etc/opt/edge",
            Browser::Brave => "/etc/brave",
        }
    }
}

/// Contract for the places the url blocklist is written to.
pub trait PolicyStore: Send {
    /// Replaces the stored blocklist with `patterns`. Not additive.
    fn apply(&mut self, patterns: &[String]) -> Result<(), BlockerError>;

    /// Clears the blocklist.
    fn remove_all(&mut self) -> Result<(), BlockerError>;

    /// Currently active patterns.
    fn current(&self) -> Result<Vec<String>, BlockerError>;
}

/// Returns the policy store used by this build.
pub fn system_policy_store() -> Box<dyn PolicyStore> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "win")] {
            Box::new(registry::RegistryPolicyStore::new(Browser::ALL.to_vec()))
        } else if #[cfg(windows)] {
            Box::new(UnsupportedPolicyStore)
        } else {
            Box::new(managed_file::ManagedFilePolicyStore::for_installed_browsers())
        }
    }
}

/// Used by Windows builds without the registry writer. Every call fails instead of reporting
/// an empty blocklist as applied.
#[cfg(any(test, all(windows, not(feature = "win"))))]
pub struct UnsupportedPolicyStore;

#[cfg(any(test, all(windows, not(feature = "win"))))]
impl PolicyStore for UnsupportedPolicyStore {
    fn apply(&mut self, _patterns: &[String]) -> Result<(), BlockerError> {
        Err(BlockerError::Unsupported(
            "url blocking without the `win` feature",
        ))
    }

    fn remove_all(&mut self) -> Result<(), BlockerError> {
        Err(BlockerError::Unsupported(
            "url blocking without the `win` feature",
        ))
    }

    fn current(&self) -> Result<Vec<String>, BlockerError> {
        Err(BlockerError::Unsupported(
            "url blocking without the `win` feature",
        ))
    }
}

/// Deduplicates patterns keeping the first occurrence.
pub(crate) fn unique_patterns(patterns: &[String]) -> Vec<&str> {
    let mut unique: Vec<&str> = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let pattern = pattern.trim();
        if !pattern.is_empty() && !unique.contains(&pattern) {
            unique.push(pattern);
        }
    }
    unique
}
