use std::{collections::HashSet, io::ErrorKind, path::PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::error::BlockerError;

/// Address blocked domains are redirected to.
pub const REDIRECT_IP: &str = "127.0.0.1";
/// Trailing comment that marks a hosts line as owned by this tool.
pub const MANAGED_MARKER: &str = "# focusguard";

/// Result of a single hosts file rewrite.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HostsChange {
    pub added: usize,
    pub removed: usize,
}

impl HostsChange {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// Editor of the managed lines of a hosts file. Lines without [MANAGED_MARKER] are never
/// touched.
#[derive(Debug, Clone)]
pub struct HostsFile {
    path: PathBuf,
}

impl HostsFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Raw bytes of the file. Hosts files are often in a legacy code page, so lines that are
    /// not ours are never decoded.
    async fn read(&self) -> Result<Vec<u8>, BlockerError> {
        match fs::read(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(BlockerError::io(
                format!("reading hosts file {:?}", self.path),
                e,
            )),
        }
    }

    /// Writes a sibling file and renames it over the hosts file, so readers never see a
    /// truncated file.
    async fn write(&self, content: &[u8]) -> Result<(), BlockerError> {
        let write_error =
            |e| BlockerError::io(format!("writing hosts file {:?}", self.path), e);

        let mut temporary = self.path.clone().into_os_string();
        temporary.push(".focusguard.tmp");
        let temporary = PathBuf::from(temporary);

        fs::write(&temporary, content).await.map_err(write_error)?;
        if let Err(e) = fs::rename(&temporary, &self.path).await {
            let _ = fs::remove_file(&temporary).await;
            return Err(write_error(e));
        }
        Ok(())
    }

    /// Makes the managed entries match `sites`. The file is only rewritten when something
    /// changed.
    #[tracing::instrument(skip(self, sites), fields(path = ?self.path))]
    pub async fn apply(&self, sites: &[String]) -> Result<HostsChange, BlockerError> {
        let content = self.read().await?;
        let (updated, change) = reconcile_content(&content, sites);
        if !change.is_empty() {
            self.write(&updated).await?;
            info!(
                "Hosts file updated, {} entries added and {} removed",
                change.added, change.removed
            );
        } else {
            debug!("Hosts file already up to date");
        }
        Ok(change)
    }

    /// Deletes every managed line. Returns the number of removed lines.
    pub async fn remove_all(&self) -> Result<usize, BlockerError> {
        Ok(self.apply(&[]).await?.removed)
    }

    /// Domains currently redirected by managed lines.
    pub async fn managed_domains(&self) -> Result<Vec<String>, BlockerError> {
        let content = self.read().await?;
        Ok(lines(&content)
            .filter_map(managed_line_domain)
            .map(str::to_owned)
            .collect())
    }
}

fn format_entry(domain: &str) -> Vec<u8> {
    format!("{REDIRECT_IP} {domain} {MANAGED_MARKER}").into_bytes()
}

/// Splits like [str::lines]: on `\n`, dropping a trailing `\r`, without a last empty line.
fn lines(content: &[u8]) -> impl Iterator<Item = &[u8]> {
    content.split_inclusive(|b| *b == b'\n').map(|line| {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        line.strip_suffix(b"\r").unwrap_or(line)
    })
}

/// Managed lines are plain ASCII, anything that is not UTF-8 belongs to the user.
fn managed_line_domain(line: &[u8]) -> Option<&str> {
    std::str::from_utf8(line).ok().and_then(managed_domain)
}

/// Extracts the domain of a managed line.
fn managed_domain(line: &str) -> Option<&str> {
    let body = line.trim().strip_suffix(MANAGED_MARKER)?;
    let mut parts = body.split_whitespace();
    let ip = parts.next()?;
    let domain = parts.next()?;
    if ip != REDIRECT_IP || parts.next().is_some() {
        return None;
    }
    Some(domain)
}

/// Rewrites `content` so that its managed lines are exactly `sites`, keeping existing managed
/// lines in place and appending missing ones at the end. Other lines are copied byte for byte
/// and the line endings of the original file are preserved.
fn reconcile_content(content: &[u8], sites: &[String]) -> (Vec<u8>, HostsChange) {
    let eol: &[u8] = if content.windows(2).any(|pair| pair == b"\r\n") {
        b"\r\n"
    } else {
        b"\n"
    };

    let mut wanted = Vec::new();
    let mut seen = HashSet::new();
    for site in sites {
        let site = site.trim().to_lowercase();
        if !site.is_empty() && seen.insert(site.clone()) {
            wanted.push(site);
        }
    }

    let mut change = HostsChange::default();
    let mut present = HashSet::new();
    let mut kept = Vec::new();
    for line in lines(content) {
        match managed_line_domain(line) {
            Some(domain) if seen.contains(domain) && present.insert(domain.to_owned()) => {
                kept.push(line.to_vec());
            }
            Some(_) => change.removed += 1,
            None => kept.push(line.to_vec()),
        }
    }

    for site in wanted.iter().filter(|site| !present.contains(*site)) {
        kept.push(format_entry(site));
        change.added += 1;
    }

    if change.is_empty() {
        return (content.to_vec(), change);
    }

    let mut updated = kept.join(eol);
    if !updated.is_empty() {
        updated.extend_from_slice(eol);
    }
    (updated, change)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::{managed_domain, reconcile_content, HostsChange, HostsFile};

    const STOCK_HOSTS: &str = "# Copyright (c) 1993-2009 Microsoft Corp.\n\
                               #\n\
                               127.0.0.1 localhost\n\
                               10.0.0.5 nas.lan\n";

    fn sites(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn managed_lines_are_recognized() {
        assert_eq!(
            managed_domain("127.0.0.1 youtube.com # focusguard"),
            Some("youtube.com")
        );
        assert_eq!(managed_domain("127.0.0.1 localhost"), None);
        assert_eq!(managed_domain("0.0.0.0 ads.com # focusguard"), None);
        assert_eq!(managed_domain("# focusguard"), None);
    }

    #[test]
    fn apply_is_idempotent() {
        let list = sites(&["a.com", "www.a.com"]);
        let (once, change) = reconcile_content(STOCK_HOSTS.as_bytes(), &list);
        assert_eq!(
            change,
            HostsChange {
                added: 2,
                removed: 0
            }
        );
        let (twice, change) = reconcile_content(&once, &list);
        assert!(change.is_empty());
        assert_eq!(once, twice);
    }

    #[test]
    fn duplicated_sites_produce_one_entry() {
        let (content, change) = reconcile_content(b"", &sites(&["a.com", "A.com", "a.com"]));
        assert_eq!(change.added, 1);
        assert_eq!(content, b"127.0.0.1 a.com # focusguard\n");
    }

    #[test]
    fn dropped_sites_are_removed() {
        let (content, _) = reconcile_content(STOCK_HOSTS.as_bytes(), &sites(&["a.com", "b.com"]));
        let (content, change) = reconcile_content(&content, &sites(&["b.com"]));
        assert_eq!(
            change,
            HostsChange {
                added: 0,
                removed: 1
            }
        );
        let content = String::from_utf8(content).unwrap();
        assert!(!content.contains("a.com"));
        assert!(content.contains("127.0.0.1 b.com # focusguard"));
    }

    #[test]
    fn crlf_files_keep_crlf() {
        let original = STOCK_HOSTS.replace('\n', "\r\n");
        let (content, _) = reconcile_content(original.as_bytes(), &sites(&["a.com"]));
        let content = String::from_utf8(content).unwrap();
        assert!(content.ends_with("127.0.0.1 a.com # focusguard\r\n"));
        assert!(!content.replace("\r\n", "").contains('\n'));
    }

    #[test]
    fn unchanged_file_is_returned_verbatim() {
        let original = b"127.0.0.1 localhost";
        let (content, change) = reconcile_content(original, &[]);
        assert!(change.is_empty());
        assert_eq!(content, original);
    }

    #[test]
    fn legacy_code_page_lines_are_kept_byte_for_byte() {
        let original = b"# R\xe9seau local\r\n127.0.0.1 localhost\r\n";
        let (content, change) = reconcile_content(original, &sites(&["a.com"]));
        assert_eq!(change.added, 1);
        assert_eq!(
            content,
            b"# R\xe9seau local\r\n127.0.0.1 localhost\r\n127.0.0.1 a.com # focusguard\r\n"
        );

        let (content, change) = reconcile_content(&content, &[]);
        assert_eq!(change.removed, 1);
        assert_eq!(content, original);
    }

    #[tokio::test]
    async fn non_utf8_hosts_file_can_be_edited() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("hosts");
        let original = b"# R\xe9seau local\n127.0.0.1 localhost\n";
        std::fs::write(&path, original)?;
        let hosts = HostsFile::new(path.clone());

        hosts.apply(&sites(&["a.com"])).await?;
        assert_eq!(hosts.managed_domains().await?, vec!["a.com"]);

        assert_eq!(hosts.remove_all().await?, 1);
        assert_eq!(std::fs::read(&path)?, original);
        Ok(())
    }

    #[tokio::test]
    async fn rewrite_leaves_no_temporary_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("hosts");
        std::fs::write(&path, STOCK_HOSTS)?;
        HostsFile::new(path).apply(&sites(&["a.com"])).await?;

        let names = std::fs::read_dir(dir.path())?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(names, vec!["hosts".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn remove_all_keeps_unmanaged_lines() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("hosts");
        std::fs::write(&path, STOCK_HOSTS)?;
        let hosts = HostsFile::new(path.clone());

        for round in 0..3 {
            hosts
                .apply(&sites(&["a.com", "www.a.com", &format!("r{round}.com")]))
                .await?;
        }
        assert_eq!(hosts.managed_domains().await?, vec!["a.com", "www.a.com", "r2.com"]);

        let removed = hosts.remove_all().await?;
        assert_eq!(removed, 3);
        assert!(hosts.managed_domains().await?.is_empty());
        assert_eq!(std::fs::read_to_string(&path)?, STOCK_HOSTS);
        Ok(())
    }

    #[tokio::test]
    async fn missing_hosts_file_is_created() -> Result<()> {
        let dir = tempdir()?;
        let hosts = HostsFile::new(dir.path().join("hosts"));
        hosts.apply(&sites(&["a.com"])).await?;
        assert_eq!(hosts.managed_domains().await?, vec!["a.com"]);
        Ok(())
    }
}
