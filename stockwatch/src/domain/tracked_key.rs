//! Identity of one monitored condition.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator used by the canonical string form.
pub const KEY_SEPARATOR: char = '_';

/// Which condition of a (product, store) pair a key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    /// Regular new-stock availability.
    Availability,
    /// Open-box offer availability.
    OpenBox,
}

impl Facet {
    pub const ALL: [Facet; 2] = [Facet::Availability, Facet::OpenBox];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Availability => "availability",
            Self::OpenBox => "open_box",
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(subject, store, facet)` with structural equality.
///
/// The canonical string form `"{subject}_{store}_{facet}"` only exists at the
/// persistence boundary (see [`TrackedKey::canonical`] and [`TrackedKey::parse`]).
/// Subject ids must not contain [`KEY_SEPARATOR`], which the catalog enforces.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackedKey {
    pub subject: String,
    pub store: String,
    pub facet: Facet,
}

impl TrackedKey {
    pub fn new(subject: impl Into<String>, store: impl Into<String>, facet: Facet) -> Self {
        Self {
            subject: subject.into(),
            store: store.into(),
            facet,
        }
    }

    pub fn availability(subject: impl Into<String>, store: impl Into<String>) -> Self {
        Self::new(subject, store, Facet::Availability)
    }

    pub fn open_box(subject: impl Into<String>, store: impl Into<String>) -> Self {
        Self::new(subject, store, Facet::OpenBox)
    }

    /// The same (subject, store) pair under a different facet.
    pub fn with_facet(&self, facet: Facet) -> Self {
        Self::new(self.subject.clone(), self.store.clone(), facet)
    }

    pub fn canonical(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.subject,
            self.store,
            self.facet.as_str(),
            sep = KEY_SEPARATOR
        )
    }

    /// Parse the canonical form. Returns `None` for anything else.
    pub fn parse(raw: &str) -> Option<Self> {
        Facet::ALL.iter().find_map(|facet| {
            let suffix = format!("{}{}", KEY_SEPARATOR, facet.as_str());
            let rest = raw.strip_suffix(suffix.as_str())?;
            let (subject, store) = rest.split_once(KEY_SEPARATOR)?;
            if subject.is_empty() || store.is_empty() {
                return None;
            }
            Some(Self::new(subject, store, *facet))
        })
    }
}

impl fmt::Display for TrackedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl Serialize for TrackedKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical())
    }
}

impl<'de> Deserialize<'de> for TrackedKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid tracked key: {raw}")))
    }
}
