//! Domain tags: the "work" and "fun" buckets used to classify websites.
//!
//! The extension colours its timer by what kind of site the user is on.  A
//! site belongs to a bucket when its host equals a listed domain or is a
//! subdomain of one, so listing `github.com` also covers `gist.github.com`.
//!
//! Both lists keep insertion order.  The front end renders them as-is, so
//! order is part of the persisted value and is never re-sorted here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The default tags shipped with the extension, compiled into the binary.
const BUNDLED_DEFAULT_JSON: &str = include_str!("../../assets/default-domain-tags.json");

/// Error type for domain-tag validation and editing.
#[derive(Debug, Error)]
pub enum TagsError {
    #[error("domain must not be empty")]
    EmptyDomain,
    #[error("domain {domain:?} is listed more than once")]
    Duplicate { domain: String },
    #[error("unknown tag {0:?}; expected \"work\" or \"fun\"")]
    UnknownTag(String),
    #[error("bundled default domain tags are not valid JSON: {0}")]
    InvalidAsset(#[from] serde_json::Error),
}

/// One of the two classification buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    /// 打工: sites the user works on.
    Work,
    /// 摸鱼: sites the user slacks off on.
    Fun,
}

impl Tag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Fun => "fun",
        }
    }

    fn other(self) -> Self {
        match self {
            Self::Work => Self::Fun,
            Self::Fun => Self::Work,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tag {
    type Err = TagsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "work" => Ok(Self::Work),
            "fun" => Ok(Self::Fun),
            _ => Err(TagsError::UnknownTag(s.to_string())),
        }
    }
}

/// Classification of domains into the two named buckets.
///
/// The JSON shape is `{"work": [...], "fun": [...]}`; both fields are
/// required, so a stored value missing one of them (or holding a non-array)
/// fails to deserialise and is reported as malformed by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainTags {
    pub work: Vec<String>,
    pub fun: Vec<String>,
}

impl DomainTags {
    /// Parses the default tags bundled with the crate.
    ///
    /// # Errors
    ///
    /// Returns [`TagsError::InvalidAsset`] if the bundled JSON does not match
    /// the `{work, fun}` shape.
    pub fn bundled_default() -> Result<Self, TagsError> {
        Ok(serde_json::from_str(BUNDLED_DEFAULT_JSON)?)
    }

    /// Returns the list for `tag`.
    pub fn list(&self, tag: Tag) -> &[String] {
        match tag {
            Tag::Work => &self.work,
            Tag::Fun => &self.fun,
        }
    }

    fn list_mut(&mut self, tag: Tag) -> &mut Vec<String> {
        match tag {
            Tag::Work => &mut self.work,
            Tag::Fun => &mut self.fun,
        }
    }

    /// Classifies `host`, returning the bucket of the most specific listed
    /// domain that matches it.
    ///
    /// `host` may be a bare host name or a URL; it is normalised the same way
    /// [`insert`](Self::insert) normalises its input.  Returns `None` for hosts
    /// that match nothing or cannot be normalised.
    pub fn tag_of(&self, host: &str) -> Option<Tag> {
        let host = normalize_domain(host).ok()?;

        let mut best: Option<(usize, Tag)> = None;
        for tag in [Tag::Work, Tag::Fun] {
            for listed in self.list(tag) {
                let Ok(listed) = normalize_domain(listed) else {
                    continue;
                };
                if host_matches(&host, &listed)
                    && best.map_or(true, |(len, _)| listed.len() > len)
                {
                    best = Some((listed.len(), tag));
                }
            }
        }
        best.map(|(_, tag)| tag)
    }

    /// Adds `domain` to the `tag` bucket.
    ///
    /// The domain is normalised first.  If it is currently listed under the
    /// other bucket it is moved; if it is already under `tag` nothing changes.
    /// Returns `true` when the tags were modified.
    ///
    /// # Errors
    ///
    /// Returns [`TagsError::EmptyDomain`] if nothing is left after
    /// normalisation.
    pub fn insert(&mut self, tag: Tag, domain: &str) -> Result<bool, TagsError> {
        let domain = normalize_domain(domain)?;

        if contains(self.list(tag), &domain) {
            return Ok(false);
        }
        self.list_mut(tag.other())
            .retain(|d| !same_domain(d, &domain));
        self.list_mut(tag).push(domain);
        Ok(true)
    }

    /// Removes `domain` from whichever bucket holds it.
    ///
    /// Returns the bucket it was removed from, or `None` if it was not listed.
    pub fn remove(&mut self, domain: &str) -> Option<Tag> {
        let domain = normalize_domain(domain).ok()?;
        for tag in [Tag::Work, Tag::Fun] {
            let list = self.list_mut(tag);
            let before = list.len();
            list.retain(|d| !same_domain(d, &domain));
            if list.len() != before {
                return Some(tag);
            }
        }
        None
    }

    /// Returns the bucket listing `domain` itself (not a parent domain).
    ///
    /// Entries are compared in normalised form, so a stored `www.example.com`
    /// is found by `example.com` and vice versa.
    pub fn bucket_of(&self, domain: &str) -> Option<Tag> {
        let domain = normalize_domain(domain).ok()?;
        [Tag::Work, Tag::Fun]
            .into_iter()
            .find(|tag| contains(self.list(*tag), &domain))
    }

    /// Checks that every entry is non-empty and that no domain appears twice,
    /// within one list or across both.  Entries that normalise to the same
    /// domain (`www.zhihu.com` and `zhihu.com`) count as duplicates.
    pub fn validate(&self) -> Result<(), TagsError> {
        let mut seen = std::collections::HashSet::new();
        for domain in self.work.iter().chain(self.fun.iter()) {
            let key = normalize_domain(domain)?;
            if !seen.insert(key) {
                return Err(TagsError::Duplicate {
                    domain: domain.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Reduces user input such as `https://www.GitHub.com/rust-lang` to
/// `github.com`.
pub fn normalize_domain(input: &str) -> Result<String, TagsError> {
    let mut rest = input.trim();
    if let Some((_, after)) = rest.split_once("://") {
        rest = after;
    }
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = host.split(':').next().unwrap_or_default();
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);

    if host.is_empty() {
        return Err(TagsError::EmptyDomain);
    }
    Ok(host)
}

fn host_matches(host: &str, listed: &str) -> bool {
    host == listed
        || (host.len() > listed.len()
            && host.ends_with(listed)
            && host.as_bytes()[host.len() - listed.len() - 1] == b'.')
}

/// `domain` must already be normalised.
fn same_domain(listed: &str, domain: &str) -> bool {
    normalize_domain(listed).map_or(false, |listed| listed == domain)
}

fn contains(list: &[String], domain: &str) -> bool {
    list.iter().any(|d| same_domain(d, domain))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(work: &[&str], fun: &[&str]) -> DomainTags {
        DomainTags {
            work: work.iter().map(|s| s.to_string()).collect(),
            fun: fun.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_bundled_default_parses_and_is_valid() {
        // Arrange / Act
        let defaults = DomainTags::bundled_default().expect("bundled asset must parse");

        // Assert
        assert!(!defaults.work.is_empty());
        assert!(!defaults.fun.is_empty());
        defaults.validate().expect("bundled asset must be valid");
    }

    #[test]
    fn test_bundled_default_preserves_asset_order() {
        let defaults = DomainTags::bundled_default().unwrap();
        let raw: serde_json::Value = serde_json::from_str(BUNDLED_DEFAULT_JSON).unwrap();
        let work: Vec<String> = serde_json::from_value(raw["work"].clone()).unwrap();
        assert_eq!(defaults.work, work);
    }

    #[test]
    fn test_deserialize_rejects_non_array_work() {
        let parsed: Result<DomainTags, _> =
            serde_json::from_str(r#"{"work": "github.com", "fun": []}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_deserialize_rejects_missing_bucket() {
        let parsed: Result<DomainTags, _> = serde_json::from_str(r#"{"work": []}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_tag_of_matches_exact_host() {
        let t = tags(&["github.com"], &["bilibili.com"]);
        assert_eq!(t.tag_of("github.com"), Some(Tag::Work));
        assert_eq!(t.tag_of("bilibili.com"), Some(Tag::Fun));
    }

    #[test]
    fn test_tag_of_matches_subdomains_and_urls() {
        let t = tags(&["github.com"], &["bilibili.com"]);
        assert_eq!(t.tag_of("gist.github.com"), Some(Tag::Work));
        assert_eq!(
            t.tag_of("https://www.bilibili.com/video/BV1xx"),
            Some(Tag::Fun)
        );
    }

    #[test]
    fn test_tag_of_does_not_match_suffix_without_dot() {
        let t = tags(&["hub.com"], &[]);
        assert_eq!(t.tag_of("github.com"), None);
    }

    #[test]
    fn test_tag_of_prefers_most_specific_domain() {
        let t = tags(&["google.com"], &["youtube.google.com"]);
        assert_eq!(t.tag_of("m.youtube.google.com"), Some(Tag::Fun));
        assert_eq!(t.tag_of("mail.google.com"), Some(Tag::Work));
    }

    #[test]
    fn test_tag_of_is_case_insensitive() {
        let t = tags(&["GitHub.com"], &[]);
        assert_eq!(t.tag_of("GITHUB.COM"), Some(Tag::Work));
    }

    #[test]
    fn test_insert_normalizes_and_appends() {
        // Arrange
        let mut t = tags(&["github.com"], &[]);

        // Act
        let changed = t.insert(Tag::Work, "  https://www.Docs.rs/serde ").unwrap();

        // Assert
        assert!(changed);
        assert_eq!(t.work, vec!["github.com".to_string(), "docs.rs".to_string()]);
    }

    #[test]
    fn test_insert_existing_domain_is_noop() {
        let mut t = tags(&["github.com"], &[]);
        assert!(!t.insert(Tag::Work, "github.com").unwrap());
        assert_eq!(t.work.len(), 1);
    }

    #[test]
    fn test_insert_moves_domain_between_buckets() {
        let mut t = tags(&["zhihu.com"], &["bilibili.com"]);

        t.insert(Tag::Fun, "zhihu.com").unwrap();

        assert!(t.work.is_empty());
        assert_eq!(t.fun, vec!["bilibili.com".to_string(), "zhihu.com".to_string()]);
    }

    #[test]
    fn test_stored_www_entry_matches_bare_host() {
        // Arrange
        let t = tags(&["www.example.com"], &[]);

        // Act / Assert
        assert_eq!(t.tag_of("www.example.com"), Some(Tag::Work));
        assert_eq!(t.tag_of("mail.example.com"), Some(Tag::Work));
        assert_eq!(t.bucket_of("example.com"), Some(Tag::Work));
    }

    #[test]
    fn test_insert_moves_stored_www_entry() {
        // Arrange
        let mut t = tags(&["www.example.com"], &[]);

        // Act
        let changed = t.insert(Tag::Fun, "www.example.com").unwrap();

        // Assert
        assert!(changed);
        assert!(t.work.is_empty());
        assert_eq!(t.fun, vec!["example.com".to_string()]);
        t.validate().unwrap();
    }

    #[test]
    fn test_insert_under_same_bucket_as_www_entry_is_noop() {
        let mut t = tags(&[], &["WWW.Zhihu.com"]);

        assert!(!t.insert(Tag::Fun, "zhihu.com").unwrap());
        assert_eq!(t.fun, vec!["WWW.Zhihu.com".to_string()]);
    }

    #[test]
    fn test_remove_matches_stored_www_entry() {
        let mut t = tags(&[], &["www.weibo.com"]);
        assert_eq!(t.remove("weibo.com"), Some(Tag::Fun));
        assert!(t.fun.is_empty());
    }

    #[test]
    fn test_validate_rejects_www_and_bare_forms_of_one_domain() {
        let t = tags(&["www.example.com"], &["example.com"]);
        assert!(matches!(t.validate(), Err(TagsError::Duplicate { .. })));
    }

    #[test]
    fn test_insert_rejects_empty_domain() {
        let mut t = DomainTags::default();
        assert!(matches!(t.insert(Tag::Fun, "   "), Err(TagsError::EmptyDomain)));
        assert!(matches!(t.insert(Tag::Fun, "https://"), Err(TagsError::EmptyDomain)));
    }

    #[test]
    fn test_remove_reports_bucket() {
        let mut t = tags(&["github.com"], &["weibo.com"]);
        assert_eq!(t.remove("weibo.com"), Some(Tag::Fun));
        assert_eq!(t.remove("weibo.com"), None);
        assert!(t.fun.is_empty());
    }

    #[test]
    fn test_validate_rejects_duplicate_across_buckets() {
        let t = tags(&["github.com"], &["GitHub.com"]);
        assert!(matches!(t.validate(), Err(TagsError::Duplicate { .. })));
    }

    #[test]
    fn test_validate_rejects_duplicate_within_bucket() {
        let t = tags(&["a.com", "a.com"], &[]);
        assert!(matches!(t.validate(), Err(TagsError::Duplicate { .. })));
    }

    #[test]
    fn test_validate_rejects_blank_entry() {
        let t = tags(&[" "], &[]);
        assert!(matches!(t.validate(), Err(TagsError::EmptyDomain)));
    }

    #[test]
    fn test_tag_parses_case_insensitively() {
        assert_eq!("Work".parse::<Tag>().unwrap(), Tag::Work);
        assert!(matches!("play".parse::<Tag>(), Err(TagsError::UnknownTag(_))));
    }

    #[test]
    fn test_normalize_domain_strips_port_and_credentials() {
        assert_eq!(
            normalize_domain("http://user@www.example.com:8080/path").unwrap(),
            "example.com"
        );
    }
}
