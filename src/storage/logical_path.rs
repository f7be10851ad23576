// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Logical paths: the stable, client-facing name of an entry.
//!
//! A logical path stays valid across a claim even though the bytes move into
//! the marker directory. It never contains `..` and never names the marker
//! directory itself, so a logical path can always be joined onto the pool
//! root without escaping it.

use std::fmt;
use std::path::PathBuf;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{PopError, Result};
use crate::storage::pool_store::MARKER_DIR;

/// Bytes escaped inside a single URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// `\` separates paths on Windows only; on Unix it is an ordinary filename
/// byte and the component is joined onto the root on its own.
fn is_foreign_separator(component: &str) -> bool {
    cfg!(windows) && component.contains('\\')
}

/// Root-relative path made of validated UTF-8 components. Empty is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalPath {
    components: Vec<String>,
}

impl LogicalPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a (percent-encoded) URL path such as `/a/b%20c.txt`.
    pub fn from_url_path(url_path: &str) -> Result<Self> {
        let decoded = percent_decode_str(url_path)
            .decode_utf8()
            .map_err(|_| PopError::InvalidPath(url_path.to_string()))?;
        Self::parse(&decoded)
    }

    /// Parse an already-decoded `/`-separated path.
    pub fn parse(path: &str) -> Result<Self> {
        let mut components = Vec::new();
        for part in path.split('/') {
            match part {
                "" | "." => continue,
                ".." => return Err(PopError::InvalidPath(path.to_string())),
                p if p == MARKER_DIR || p.contains('\0') || is_foreign_separator(p) => {
                    return Err(PopError::InvalidPath(path.to_string()));
                }
                p => components.push(p.to_string()),
            }
        }
        Ok(Self { components })
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Child path `self/name`. `name` must be a single plain component.
    pub fn join(&self, name: &str) -> Result<Self> {
        if name.is_empty() || name == "." || name.contains('/') {
            return Err(PopError::InvalidPath(name.to_string()));
        }
        let mut child = Self::parse(name)?;
        let mut components = self.components.clone();
        components.append(&mut child.components);
        Ok(Self { components })
    }

    /// Containing directory; the root is its own parent.
    pub fn parent(&self) -> Self {
        let mut components = self.components.clone();
        components.pop();
        Self { components }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// Relative filesystem path, to be joined onto the pool root.
    pub fn to_relative_path(&self) -> PathBuf {
        self.components.iter().collect()
    }

    /// Percent-encoded absolute URL path, e.g. `/a/b%20c.txt`.
    pub fn to_url_path(&self) -> String {
        let mut out = String::with_capacity(self.components.iter().map(|c| c.len() + 1).sum());
        for c in &self.components {
            out.push('/');
            out.extend(utf8_percent_encode(c, PATH_SEGMENT));
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }
}

/// Percent-encode one path segment for use in an href.
pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for c in &self.components {
            write!(f, "/{c}")?;
        }
        Ok(())
    }
}
