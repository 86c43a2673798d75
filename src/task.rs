//! Task shapes shared by the worker pool.
//!
//! Each phase runs over exactly one of these types; they are never unified
//! into a single enum because no phase ever mixes path tasks with object
//! tasks.

use std::fmt;

/// A path relative to the remote `.git/` base URL, e.g. `.git/config` or
/// `refs/heads/master/` (a trailing slash marks a directory request for the
/// recursive worker).
pub type PathTask = String;

/// A lowercase 40-hex-character object id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid(String);

impl Oid {
    /// Parses a 40-hex-character string, rejecting anything else.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(s.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The on-disk/URL path for this object: `.git/objects/<aa>/<bb..>`.
    pub fn object_path(&self) -> String {
        format!(".git/objects/{}/{}", &self.0[..2], &self.0[2..])
    }
}

impl From<gix_hash::ObjectId> for Oid {
    fn from(id: gix_hash::ObjectId) -> Self {
        Self(id.to_hex().to_string())
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
