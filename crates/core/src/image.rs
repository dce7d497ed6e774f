//! Canonical image targets extracted from registry events.

use std::fmt;

fn require_non_empty(kind: &str, value: String) -> crate::Result<String> {
    if value.trim().is_empty() {
        return Err(crate::Error::InvalidImage(format!("{kind} cannot be empty")));
    }
    Ok(value)
}

/// A `(repository, tag)` pair announced by a push event.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageRef {
    repository: String,
    tag: String,
}

impl ImageRef {
    /// Create from components. Both must be non-empty.
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> crate::Result<Self> {
        Ok(Self {
            repository: require_non_empty("repository", repository.into())?,
            tag: require_non_empty("tag", tag.into())?,
        })
    }

    /// Full repository name (e.g. `org/app`).
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Tag name (e.g. `v1.2.0`).
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// A removal announced by a delete event.
///
/// A missing tag addresses every tag of the repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeleteTarget {
    repository: String,
    tag: Option<String>,
}

impl DeleteTarget {
    /// Delete one tag.
    pub fn tag(repository: impl Into<String>, tag: impl Into<String>) -> crate::Result<Self> {
        Ok(Self {
            repository: require_non_empty("repository", repository.into())?,
            tag: Some(require_non_empty("tag", tag.into())?),
        })
    }

    /// Delete every tag of a repository.
    pub fn repository_wide(repository: impl Into<String>) -> crate::Result<Self> {
        Ok(Self {
            repository: require_non_empty("repository", repository.into())?,
            tag: None,
        })
    }

    /// Full repository name.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// The tag, or `None` for a repository-wide delete.
    pub fn tag_name(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Whether this addresses the whole repository.
    pub fn is_repository_wide(&self) -> bool {
        self.tag.is_none()
    }
}

impl fmt::Display for DeleteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}:{}", self.repository, tag),
            None => write!(f, "{}:*", self.repository),
        }
    }
}

impl From<ImageRef> for DeleteTarget {
    fn from(image: ImageRef) -> Self {
        Self {
            repository: image.repository,
            tag: Some(image.tag),
        }
    }
}
