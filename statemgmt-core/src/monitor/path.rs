//! Watch path descriptors.
//!
//! Monitors declare their paths as text (`"count"`, `"user.address.city"`,
//! or several separated by whitespace). The text is parsed once, when the
//! monitor is registered; notification only walks the stored segments.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use smallvec::SmallVec;

use crate::error::{ObserveError, Result};

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct WatchPath {
    text: Rc<str>,
    segments: SmallVec<[Rc<str>; 4]>,
}

impl WatchPath {
    /// Parse a single dotted path.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ObserveError::InvalidPath(text.to_owned()));
        }
        let segments = text
            .split('.')
            .map(|segment| {
                if segment.is_empty() || segment.chars().any(char::is_whitespace) {
                    Err(ObserveError::InvalidPath(text.to_owned()))
                } else {
                    Ok(Rc::from(segment))
                }
            })
            .collect::<Result<SmallVec<_>>>()?;
        Ok(Self {
            text: Rc::from(text),
            segments,
        })
    }

    /// Parse a whitespace-separated list of paths.
    ///
    /// Duplicates are dropped, keeping the first occurrence, so declaration
    /// order is preserved.
    pub fn parse_list(paths: &str) -> Result<Vec<Self>> {
        let mut parsed: Vec<Self> = Vec::new();
        for text in paths.split_whitespace() {
            let path = Self::parse(text)?;
            if !parsed.contains(&path) {
                parsed.push(path);
            }
        }
        if parsed.is_empty() {
            return Err(ObserveError::InvalidPath(paths.to_owned()));
        }
        Ok(parsed)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub(crate) fn key(&self) -> Rc<str> {
        Rc::clone(&self.text)
    }

    pub fn segments(&self) -> &[Rc<str>] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}

impl FromStr for WatchPath {
    type Err = ObserveError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Debug for WatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WatchPath({:?})", self.text)
    }
}

impl fmt::Display for WatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
