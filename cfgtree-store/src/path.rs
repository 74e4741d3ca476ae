//! Logical configuration paths.

use std::fmt::Display;

use camino::{Utf8Path, Utf8PathBuf};

use crate::escape::escape;

/// An ordered sequence of logical path components. The empty sequence
/// denotes the root of the configuration tree.
///
/// Components are opaque UTF-8 strings; escaping for on-disk storage
/// happens only when a path is planted under a layer root with
/// [`CfgPath::storage_path`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CfgPath(Vec<String>);

impl CfgPath {
    /// The root path.
    pub fn root() -> Self {
        CfgPath(Vec::new())
    }

    /// Builds a path from any iterable of components.
    pub fn new<I, S>(comps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CfgPath(comps.into_iter().map(Into::into).collect())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn components(&self) -> &[String] {
        &self.0
    }

    pub fn push(&mut self, comp: impl Into<String>) {
        self.0.push(comp.into());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.0.pop()
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Returns the parent path, or `None` at the root.
    pub fn parent(&self) -> Option<CfgPath> {
        if self.0.is_empty() {
            None
        } else {
            Some(CfgPath(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Returns a new path with `comp` appended.
    pub fn join(&self, comp: impl Into<String>) -> CfgPath {
        let mut p = self.clone();
        p.push(comp);
        p
    }

    /// Whether `self` is `other` or a descendant of it.
    pub fn starts_with(&self, other: &CfgPath) -> bool {
        self.0.len() >= other.0.len() && self.0[..other.0.len()] == other.0[..]
    }

    /// Plants this path under a layer root, escaping every component.
    pub fn storage_path(&self, root: &Utf8Path) -> Utf8PathBuf {
        let mut p = root.to_owned();
        for comp in &self.0 {
            p.push(escape(comp));
        }
        p
    }
}

impl Display for CfgPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for comp in &self.0 {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{comp}")?;
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for CfgPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        CfgPath::new(iter)
    }
}

impl From<&[&str]> for CfgPath {
    fn from(comps: &[&str]) -> Self {
        CfgPath::new(comps.iter().copied())
    }
}
