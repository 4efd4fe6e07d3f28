//! Tab records as stored in the session.

use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// Opaque tab identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub(crate) fn numbered(sequence: u64) -> Self {
        Self(format!("tab-{sequence}"))
    }

    /// Sequence number of ids minted by this crate.
    pub(crate) fn sequence(&self) -> Option<u64> {
        self.0.strip_prefix("tab-")?.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a playable item in the content catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRef(String);

impl ContentRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a tab shows. Only embedded content carries a content reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TabKind {
    Home,
    ListView,
    DetailView,
    EmbeddedContent { content_ref: ContentRef },
}

impl TabKind {
    pub fn default_title(&self) -> &'static str {
        match self {
            Self::Home => "Home",
            Self::ListView => "Games",
            Self::DetailView => "Details",
            Self::EmbeddedContent { .. } => "Game",
        }
    }

    /// Pseudo-URL shown in the address bar.
    pub fn address_label(&self) -> String {
        match self {
            Self::Home => "app://home".to_owned(),
            Self::ListView => "app://list".to_owned(),
            Self::DetailView => "app://detail".to_owned(),
            Self::EmbeddedContent { content_ref } => format!("app://content/{content_ref}"),
        }
    }

    pub fn content_ref(&self) -> Option<&ContentRef> {
        match self {
            Self::EmbeddedContent { content_ref } => Some(content_ref),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub id: TabId,
    pub title: String,
    pub address_label: String,
    #[serde(flatten)]
    pub kind: TabKind,
}

impl Tab {
    pub fn new(id: TabId, title: impl Into<String>, kind: TabKind) -> Self {
        Self {
            id,
            title: title.into(),
            address_label: kind.address_label(),
            kind,
        }
    }
}
