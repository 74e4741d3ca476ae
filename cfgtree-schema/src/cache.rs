//! Append-only cache of parsed templates keyed by their `node.def` path.

use std::{collections::HashMap, sync::Mutex};

use anyhow::{anyhow, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};

use crate::{text, Template};

/// An append-only cache of parsed [`Template`]s keyed by their on-disk
/// file path.
#[derive(Default)]
pub struct TemplateCache {
    mapped: Mutex<HashMap<Utf8PathBuf, usize>>,
    templates: elsa::FrozenVec<Box<Template>>,
}

impl TemplateCache {
    /// Constructs an empty cache.
    pub fn new() -> Self {
        Default::default()
    }

    /// Parses the file at the given `path`, caches the parsed template,
    /// and returns a reference to it.
    pub fn load(&self, path: impl AsRef<Utf8Path>) -> Result<&Template> {
        let mut locked = self.mapped.lock().expect("Lock poisoned");

        // Early return for cache hit
        if let Some(index) = locked.get(path.as_ref()) {
            return Ok(&self.templates[*index]);
        }

        // Cache miss; load text from file and parse it
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to load template from: {}", path.as_ref()))?;
        let template = text::parse_node_def(&text)
            .map_err(|e| anyhow!("{}: {}", path.as_ref(), e))?;
        locked.insert(path.as_ref().to_owned(), self.templates.len());
        Ok(self.templates.push_get(Box::new(template)))
    }

    /// Injects a path to template mapping into the cache without loading
    /// from disk.
    ///
    /// This is primarily used for tests
    pub fn inject(&self, path: impl AsRef<Utf8Path>, template: Template) {
        let mut locked = self.mapped.lock().expect("Lock poisoned");
        locked.insert(path.as_ref().to_owned(), self.templates.len());
        self.templates.push(Box::new(template));
    }

    /// Returns a reference to an interned copy of `template` without
    /// associating it with any path.
    pub fn intern(&self, template: Template) -> &Template {
        self.templates.push_get(Box::new(template))
    }
}
