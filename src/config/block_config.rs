use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The persisted block lists. Each list behaves as a set even though duplicates survive a
/// hand-edited file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockConfig {
    #[serde(default)]
    pub blocked_sites: Vec<String>,
    #[serde(default)]
    pub blocked_urls: Vec<String>,
    #[serde(default)]
    pub blocked_apps: Vec<String>,
}

impl BlockConfig {
    /// Adds a domain together with its `www.` variant. Returns the entries that were inserted.
    pub fn add_site(&mut self, domain: &str) -> Result<Vec<String>, ConfigError> {
        let domain = normalize_domain(domain)?;
        let mut candidates = vec![domain.clone()];
        if !domain.starts_with("www.") {
            candidates.push(format!("www.{domain}"));
        }
        Ok(insert_missing(&mut self.blocked_sites, candidates))
    }

    /// Removes a domain and its `www.` counterpart. Returns the entries that were removed.
    pub fn remove_site(&mut self, domain: &str) -> Result<Vec<String>, ConfigError> {
        let domain = normalize_domain(domain)?;
        let counterpart = match domain.strip_prefix("www.") {
            Some(bare) => bare.to_owned(),
            None => format!("www.{domain}"),
        };
        Ok(remove_matching(&mut self.blocked_sites, |site| {
            site.eq_ignore_ascii_case(&domain) || site.eq_ignore_ascii_case(&counterpart)
        }))
    }

    /// Adds the exact pattern and its wildcard-suffixed variant.
    pub fn add_url(&mut self, pattern: &str) -> Result<Vec<String>, ConfigError> {
        let pattern = normalize_url_pattern(pattern)?;
        let wildcard = wildcard_variant(&pattern);
        Ok(insert_missing(&mut self.blocked_urls, [pattern, wildcard]))
    }

    pub fn remove_url(&mut self, pattern: &str) -> Result<Vec<String>, ConfigError> {
        let pattern = normalize_url_pattern(pattern)?;
        let wildcard = wildcard_variant(&pattern);
        Ok(remove_matching(&mut self.blocked_urls, |url| {
            *url == pattern || *url == wildcard
        }))
    }

    /// Returns `true` when the app was not blocked before. Comparison ignores case and the
    /// spelling given first is kept.
    pub fn add_app(&mut self, name: &str) -> Result<bool, ConfigError> {
        let name = normalize_app(name)?;
        if self
            .blocked_apps
            .iter()
            .any(|app| app.eq_ignore_ascii_case(&name))
        {
            return Ok(false);
        }
        self.blocked_apps.push(name);
        Ok(true)
    }

    pub fn remove_app(&mut self, name: &str) -> Result<bool, ConfigError> {
        let name = normalize_app(name)?;
        let removed = remove_matching(&mut self.blocked_apps, |app| app.eq_ignore_ascii_case(&name));
        Ok(!removed.is_empty())
    }

    /// URL patterns whose domain is also blocked through the hosts file. For those the hosts
    /// block wins and the whole domain becomes unreachable.
    pub fn overlapping_urls(&self) -> Vec<&str> {
        self.blocked_urls
            .iter()
            .filter(|url| {
                let host = url_host(url);
                self.blocked_sites
                    .iter()
                    .any(|site| site.eq_ignore_ascii_case(host))
            })
            .map(String::as_str)
            .collect()
    }
}

/// Lowercases a domain and drops any scheme, path, query or trailing dot.
pub fn normalize_domain(input: &str) -> Result<String, ConfigError> {
    let without_scheme = strip_scheme(input.trim());
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('.')
        .to_lowercase();
    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidEntry(input.to_owned()));
    }
    Ok(host)
}

/// Drops the scheme and any trailing `/` or `/*`. Only the host part is lowercased, paths are
/// case sensitive for browsers.
pub fn normalize_url_pattern(input: &str) -> Result<String, ConfigError> {
    let without_scheme = strip_scheme(input.trim());
    let base = without_scheme
        .strip_suffix("/*")
        .unwrap_or(without_scheme)
        .trim_end_matches('/');
    let (host, path) = base.split_once('/').unwrap_or((base, ""));
    let host = host.to_lowercase();
    if host.is_empty() || base.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidEntry(input.to_owned()));
    }
    if path.is_empty() {
        Ok(host)
    } else {
        Ok(format!("{host}/{path}"))
    }
}

pub fn wildcard_variant(pattern: &str) -> String {
    format!("{pattern}/*")
}

fn normalize_app(input: &str) -> Result<String, ConfigError> {
    let name = input.trim();
    if name.is_empty() {
        return Err(ConfigError::InvalidEntry(input.to_owned()));
    }
    Ok(name.to_owned())
}

fn url_host(pattern: &str) -> &str {
    let host = pattern.split('/').next().unwrap_or_default();
    host.trim_start_matches("*.")
}

fn strip_scheme(value: &str) -> &str {
    value.split_once("://").map_or(value, |(_, rest)| rest)
}

fn insert_missing(
    list: &mut Vec<String>,
    candidates: impl IntoIterator<Item = String>,
) -> Vec<String> {
    let mut inserted = vec![];
    for candidate in candidates {
        if !list.contains(&candidate) {
            list.push(candidate.clone());
            inserted.push(candidate);
        }
    }
    inserted
}

fn remove_matching(list: &mut Vec<String>, predicate: impl Fn(&String) -> bool) -> Vec<String> {
    let (removed, kept): (Vec<_>, Vec<_>) = list.drain(..).partition(|entry| predicate(entry));
    *list = kept;
    removed
}

#[cfg(test)]
mod tests {
    use crate::error::ConfigError;

    use super::{normalize_domain, normalize_url_pattern, BlockConfig};

    #[test]
    fn add_site_inserts_www_variant() {
        let mut config = BlockConfig::default();
        let added = config.add_site("X.com").unwrap();
        assert_eq!(added, vec!["x.com", "www.x.com"]);
        assert_eq!(config.blocked_sites, vec!["x.com", "www.x.com"]);

        assert!(config.add_site("x.com").unwrap().is_empty());
        assert_eq!(config.blocked_sites.len(), 2);
    }

    #[test]
    fn add_www_site_does_not_double_prefix() {
        let mut config = BlockConfig::default();
        config.add_site("www.reddit.com").unwrap();
        assert_eq!(config.blocked_sites, vec!["www.reddit.com"]);
    }

    #[test]
    fn remove_site_strips_both_variants() {
        let mut config = BlockConfig {
            blocked_sites: vec!["x.com".into(), "www.x.com".into(), "y.com".into()],
            ..Default::default()
        };
        let removed = config.remove_site("www.x.com").unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(config.blocked_sites, vec!["y.com"]);

        assert!(config.remove_site("x.com").unwrap().is_empty());
    }

    #[test]
    fn add_url_inserts_exact_and_wildcard() {
        let mut config = BlockConfig::default();
        config.add_url("https://A.com/b/").unwrap();
        assert_eq!(config.blocked_urls, vec!["a.com/b", "a.com/b/*"]);

        config.add_url("a.com/b/*").unwrap();
        assert_eq!(config.blocked_urls.len(), 2);

        config.remove_url("a.com/b").unwrap();
        assert!(config.blocked_urls.is_empty());
    }

    #[test]
    fn prefix_wildcards_are_kept() {
        assert_eq!(
            normalize_url_pattern("a.com/shorts*").unwrap(),
            "a.com/shorts*"
        );
        assert_eq!(normalize_url_pattern("a.com/shorts/*").unwrap(), "a.com/shorts");

        let mut config = BlockConfig::default();
        config.add_url("a.com/shorts*").unwrap();
        assert_eq!(config.blocked_urls, vec!["a.com/shorts*", "a.com/shorts*/*"]);
    }

    #[test]
    fn apps_are_case_insensitive() {
        let mut config = BlockConfig::default();
        assert!(config.add_app("TikTok.exe").unwrap());
        assert!(!config.add_app("tiktok.EXE").unwrap());
        assert_eq!(config.blocked_apps, vec!["TikTok.exe"]);

        assert!(config.remove_app("TIKTOK.exe").unwrap());
        assert!(config.blocked_apps.is_empty());
        assert!(!config.remove_app("tiktok.exe").unwrap());
    }

    #[test]
    fn normalization_rejects_empty_input() {
        assert!(matches!(
            normalize_domain("   "),
            Err(ConfigError::InvalidEntry(_))
        ));
        assert!(matches!(
            normalize_url_pattern("https://"),
            Err(ConfigError::InvalidEntry(_))
        ));
        assert!(BlockConfig::default().add_app("").is_err());
    }

    #[test]
    fn normalize_domain_strips_scheme_and_path() {
        assert_eq!(
            normalize_domain("https://www.YouTube.com/watch?v=1").unwrap(),
            "www.youtube.com"
        );
        assert_eq!(normalize_domain("example.org.").unwrap(), "example.org");
    }

    #[test]
    fn overlapping_urls_are_detected() {
        let config = BlockConfig {
            blocked_sites: vec!["youtube.com".into()],
            blocked_urls: vec!["youtube.com/shorts".into(), "reddit.com/r/all".into()],
            blocked_apps: vec![],
        };
        assert_eq!(config.overlapping_urls(), vec!["youtube.com/shorts"]);
    }

    #[test]
    fn missing_keys_default_to_empty_lists() {
        let config: BlockConfig =
            serde_json::from_str(r#"{"blocked_sites": ["a.com"]}"#).unwrap();
        assert_eq!(config.blocked_sites, vec!["a.com"]);
        assert!(config.blocked_urls.is_empty());
        assert!(config.blocked_apps.is_empty());
    }
}
