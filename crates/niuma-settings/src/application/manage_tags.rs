//! ManageTagsUseCase: edit the work/fun domain lists and classify hosts.
//!
//! Each edit reads the current [`DomainTags`], applies the change to a copy
//! and writes it back through the binding, so observers and the store see
//! one atomic replacement of the whole value.

use serde::Serialize;
use thiserror::Error;

use niuma_core::domain::normalize_domain;
use niuma_core::{Binding, DomainTags, SettingsError, Tag, TagsError};

/// Error type for domain-tag edits.
#[derive(Debug, Error)]
pub enum TagEditError {
    #[error(transparent)]
    Tags(#[from] TagsError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// What an edit did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "lowercase")]
pub enum TagChange {
    /// The domain was not listed and now is.
    Added { tag: Tag, domain: String },
    /// The domain was listed under the other tag.
    Moved { from: Tag, to: Tag, domain: String },
    /// The domain was already listed under the requested tag.
    Unchanged { tag: Tag, domain: String },
    /// The domain was removed from `tag`.
    Removed { tag: Tag, domain: String },
    /// Removal was requested for a domain that is not listed.
    NotListed { domain: String },
}

/// Result of classifying one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub host: String,
    pub tag: Option<Tag>,
}

/// Lists `domain` under `tag`, moving it from the other tag if necessary.
///
/// # Errors
///
/// [`TagEditError::Tags`] if `domain` is empty after normalisation, or
/// [`TagEditError::Settings`] if the new value cannot be stored.
pub fn add_domain(
    tags: &Binding<DomainTags>,
    tag: Tag,
    domain: &str,
) -> Result<TagChange, TagEditError> {
    let domain = normalize_domain(domain)?;
    let mut current = tags.get();
    let previous = current.bucket_of(&domain);

    if !current.insert(tag, &domain)? {
        return Ok(TagChange::Unchanged { tag, domain });
    }
    tags.set(current)?;

    Ok(match previous {
        Some(from) => TagChange::Moved { from, to: tag, domain },
        None => TagChange::Added { tag, domain },
    })
}

/// Removes `domain` from whichever list holds it.
pub fn remove_domain(tags: &Binding<DomainTags>, domain: &str) -> Result<TagChange, TagEditError> {
    let domain = normalize_domain(domain)?;
    let mut current = tags.get();

    match current.remove(&domain) {
        Some(tag) => {
            tags.set(current)?;
            Ok(TagChange::Removed { tag, domain })
        }
        None => Ok(TagChange::NotListed { domain }),
    }
}

/// Classifies `host` against the current tags.
pub fn classify(tags: &Binding<DomainTags>, host: &str) -> Classification {
    Classification {
        host: host.trim().to_string(),
        tag: tags.get().tag_of(host),
    }
}
