//! `RequiredFiles` manifest entries (the content-addressed descriptors the
//! CMS hands down before schedule evaluation).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKind {
    Layout,
    Media,
    Resource,
}

impl CacheKind {
    /// Matches the XMDS wire codes: `L` (layout), `M` (media), `R` (resource).
    pub fn from_wire_code(code: &str) -> Option<Self> {
        match code {
            "L" => Some(Self::Layout),
            "M" => Some(Self::Media),
            "R" => Some(Self::Resource),
            _ => None,
        }
    }

    pub fn wire_code(self) -> &'static str {
        match self {
            Self::Layout => "L",
            Self::Media => "M",
            Self::Resource => "R",
        }
    }
}

/// One entry of the RequiredFiles manifest. Unique key is `(kind, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredFile {
    pub kind: CacheKind,
    pub id: String,
    pub path: String,
    pub md5: String,
    pub size: u64,
    pub file_type: Option<String>,
    pub code: Option<String>,
}

impl RequiredFile {
    pub fn key(&self) -> (CacheKind, &str) {
        (self.kind, self.id.as_str())
    }
}
