use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::error::BlockerError;

use super::{unique_patterns, Browser, PolicyStore, URL_BLOCKLIST_POLICY};

pub const POLICY_FILE_NAME: &str = "focusguard.json";

/// Writes the blocklist as a Chromium managed policy file into every configured directory.
pub struct ManagedFilePolicyStore {
    directories: Vec<PathBuf>,
}

impl ManagedFilePolicyStore {
    pub fn new(directories: Vec<PathBuf>) -> Self {
        Self { directories }
    }

    /// Policy directories of the browsers that are installed on this machine.
    pub fn for_installed_browsers() -> Self {
        let directories = Browser::ALL
            .iter()
            .map(|browser| Path::new(browser.policy_root()))
            .filter(|root| root.exists())
            .map(|root| root.join("policies").join("managed"))
            .collect();
        Self::new(directories)
    }

    fn policy_files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.directories
            .iter()
            .map(|directory| directory.join(POLICY_FILE_NAME))
    }
}

impl PolicyStore for ManagedFilePolicyStore {
    fn apply(&mut self, patterns: &[String]) -> Result<(), BlockerError> {
        let policy = BTreeMap::from([(URL_BLOCKLIST_POLICY, unique_patterns(patterns))]);
        let content = serde_json::to_string_pretty(&policy)
            .map_err(|e| BlockerError::io("serializing url policy", e.into()))?;

        for file in self.policy_files() {
            if fs::read_to_string(&file).is_ok_and(|existing| existing == content) {
                debug!("Policy {file:?} already up to date");
                continue;
            }
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| BlockerError::io(format!("creating {parent:?}"), e))?;
            }
            fs::write(&file, &content)
                .map_err(|e| BlockerError::io(format!("writing url policy {file:?}"), e))?;
            info!("Wrote {} url patterns into {file:?}", policy[URL_BLOCKLIST_POLICY].len());
        }
        Ok(())
    }

    fn remove_all(&mut self) -> Result<(), BlockerError> {
        for file in self.policy_files() {
            match fs::remove_file(&file) {
                Ok(()) => info!("Removed url policy {file:?}"),
                Err(e) if e.kind() == ErrorKind::NotFound => (),
                Err(e) => {
                    return Err(BlockerError::io(format!("removing url policy {file:?}"), e))
                }
            }
        }
        Ok(())
    }

    fn current(&self) -> Result<Vec<String>, BlockerError> {
        for file in self.policy_files() {
            let content = match fs::read_to_string(&file) {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(BlockerError::io(format!("reading url policy {file:?}"), e))
                }
            };
            let mut policy: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)
                .map_err(|e| BlockerError::io(format!("parsing url policy {file:?}"), e.into()))?;
            return Ok(policy.remove(URL_BLOCKLIST_POLICY).unwrap_or_default());
        }
        Ok(vec![])
    }
}
