//! Mapping of logical paths to their schema nodes.

use anyhow::{bail, Result};
use camino::{Utf8Path, Utf8PathBuf};

use cfgtree_store::{escape, layout, unescape, CfgPath};

use crate::{cache::TemplateCache, Template};

/// A template resolved for a concrete logical path.
///
/// When the path terminates at a *value* (a tag value, or the value of a
/// single- or multi-value leaf), the template is the one of the enclosing
/// node, with `is_value` set.
#[derive(Clone, Copy)]
pub struct ResolvedTmpl<'t> {
    pub tmpl: &'t Template,
    pub is_value: bool,
}

impl<'t> ResolvedTmpl<'t> {
    pub fn is_tag(&self) -> bool {
        self.tmpl.is_tag
    }
    pub fn is_multi(&self) -> bool {
        self.tmpl.is_multi
    }
    /// A node whose children are tag values.
    pub fn is_tag_node(&self) -> bool {
        self.tmpl.is_tag && !self.is_value
    }
    /// A path ending at a tag value.
    pub fn is_tag_value(&self) -> bool {
        self.tmpl.is_tag && self.is_value
    }
    /// A path ending at the value of a single- or multi-value leaf.
    pub fn is_leaf_value(&self) -> bool {
        !self.tmpl.is_tag && self.is_value
    }
    /// A leaf node (single- or multi-valued), not one of its values.
    pub fn is_leaf_node(&self) -> bool {
        !self.is_value && !self.tmpl.is_tag && !self.tmpl.is_typeless()
    }
    pub fn is_typeless(&self) -> bool {
        self.tmpl.is_typeless()
    }
}

/// Walks and caches the on-disk template tree.
///
/// Under the template root every path component is a directory, the
/// schema lives in a `node.def` file, and a generic tag child is a
/// `node.tag` directory.
pub struct TemplateRegistry {
    root: Utf8PathBuf,
    cache: TemplateCache,
    /// Template used for existing nodes whose directory carries no
    /// `node.def` (plain interior nodes).
    typeless: Template,
}

impl TemplateRegistry {
    pub fn new(root: impl AsRef<Utf8Path>) -> Self {
        TemplateRegistry {
            root: root.as_ref().to_owned(),
            cache: TemplateCache::new(),
            typeless: Template::default(),
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Resolves the template for logical path `p`, walking literal child
    /// directories and falling back to the generic `node.tag` child under
    /// tag nodes.
    ///
    /// Fails with the canonical "not valid" error when no template
    /// matches the path.
    pub fn resolve(&self, path: &CfgPath) -> Result<ResolvedTmpl<'_>> {
        match self.try_resolve(path)? {
            Some(r) => Ok(r),
            None => bail!("The specified configuration node is not valid"),
        }
    }

    /// Like [`TemplateRegistry::resolve`], returning `None` for invalid
    /// paths instead of an error.
    pub fn try_resolve(&self, path: &CfgPath) -> Result<Option<ResolvedTmpl<'_>>> {
        let comps = path.components();
        let Some((last, init)) = comps.split_last() else {
            // the root itself has no template
            return Ok(None);
        };

        let mut dir = self.root.clone();
        for comp in init {
            if comp.is_empty() {
                // only the last component may be empty (as a value)
                return Ok(None);
            }
            match self.descend(&dir, comp) {
                Some(next) => dir = next,
                None => return Ok(None),
            }
        }

        // a path of length > 1 may terminate at a value of the node at
        // "full path - 1"
        if !init.is_empty() {
            if let Some(tmpl) = self.load_dir(&dir)? {
                if tmpl.is_tag || tmpl.is_multi || tmpl.type1.is_some() {
                    return Ok(Some(ResolvedTmpl {
                        tmpl,
                        is_value: true,
                    }));
                }
            }
        }

        if last.is_empty() {
            return Ok(None);
        }
        let node_dir = dir.join(escape(last));
        if !node_dir.is_dir() {
            return Ok(None);
        }
        let tmpl = match self.load_dir(&node_dir)? {
            Some(tmpl) => tmpl,
            None => &self.typeless,
        };
        Ok(Some(ResolvedTmpl {
            tmpl,
            is_value: false,
        }))
    }

    /// The template directory for logical path `p` (node level, never a
    /// value), or `None` if the path is invalid.
    pub fn template_dir(&self, path: &CfgPath) -> Option<Utf8PathBuf> {
        let mut dir = self.root.clone();
        for comp in path.components() {
            dir = self.descend(&dir, comp)?;
        }
        Some(dir)
    }

    /// Names of the template children of `p`. A tag node's generic child
    /// is reported as `node.tag`.
    pub fn child_names(&self, path: &CfgPath) -> Result<Vec<String>> {
        let Some(dir) = self.template_dir(path) else {
            return Ok(Vec::new());
        };
        let mut names = Vec::new();
        let rd = match dir.read_dir_utf8() {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        for entry in rd {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let name = entry.file_name();
                if name == layout::TAG_DIR {
                    names.push(name.to_owned());
                } else {
                    names.push(unescape(name));
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Loads the template of a tag node's generic child.
    pub fn tag_child(&self, tag_node_dir: &Utf8Path) -> Result<Option<&Template>> {
        self.load_dir(&tag_node_dir.join(layout::TAG_DIR))
    }

    fn descend(&self, dir: &Utf8Path, comp: &str) -> Option<Utf8PathBuf> {
        let literal = dir.join(escape(comp));
        if literal.is_dir() {
            return Some(literal);
        }
        let tag = dir.join(layout::TAG_DIR);
        tag.is_dir().then_some(tag)
    }

    fn load_dir(&self, dir: &Utf8Path) -> Result<Option<&Template>> {
        let def = dir.join(layout::DEF_FILE);
        if !def.is_file() {
            return Ok(None);
        }
        self.cache.load(&def).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Writes the scenario template tree used across the test suites:
    /// a tag node with a multi-leaf below it and a defaulted leaf.
    fn scenario_templates(root: &Utf8Path) {
        let eth = root.join("interfaces/ethernet");
        fs::create_dir_all(eth.join("node.tag/address")).unwrap();
        fs::write(
            eth.join("node.def"),
            "tag:\ntype: txt\npriority: 400\nhelp: Ethernet interface\n",
        )
        .unwrap();
        fs::write(
            eth.join("node.tag/address/node.def"),
            "multi:\ntype: ipv4net\npriority: 500\n",
        )
        .unwrap();
        let host = root.join("system/host-name");
        fs::create_dir_all(&host).unwrap();
        fs::write(host.join("node.def"), "type: txt\ndefault: \"router\"\n").unwrap();
    }

    fn registry() -> (tempfile::TempDir, TemplateRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap().to_owned();
        scenario_templates(&root);
        (dir, TemplateRegistry::new(root))
    }

    fn p(comps: &[&str]) -> CfgPath {
        CfgPath::from(comps)
    }

    #[test]
    fn resolves_literal_and_tag_paths() {
        let (_t, reg) = registry();
        let r = reg.resolve(&p(&["interfaces", "ethernet"])).unwrap();
        assert!(r.is_tag_node());
        assert_eq!(r.tmpl.priority, Some(400));

        let r = reg.resolve(&p(&["interfaces", "ethernet", "eth0"])).unwrap();
        assert!(r.is_tag_value());

        let r = reg
            .resolve(&p(&["interfaces", "ethernet", "eth0", "address"]))
            .unwrap();
        assert!(!r.is_value);
        assert!(r.tmpl.is_multi);

        let r = reg
            .resolve(&p(&["interfaces", "ethernet", "eth0", "address", "10.0.0.1/24"]))
            .unwrap();
        assert!(r.is_leaf_value());
    }

    #[test]
    fn interior_without_node_def_is_typeless() {
        let (_t, reg) = registry();
        let r = reg.resolve(&p(&["system"])).unwrap();
        assert!(r.is_typeless());
        assert!(!r.is_value);
    }

    #[test]
    fn invalid_paths_rejected() {
        let (_t, reg) = registry();
        assert!(reg.try_resolve(&p(&["bogus"])).unwrap().is_none());
        assert!(reg
            .try_resolve(&p(&["interfaces", "bogus", "x"]))
            .unwrap()
            .is_none());
        assert!(reg.try_resolve(&CfgPath::root()).unwrap().is_none());
    }

    #[test]
    fn leaf_value_of_defaulted_node() {
        let (_t, reg) = registry();
        let r = reg.resolve(&p(&["system", "host-name", "gw1"])).unwrap();
        assert!(r.is_leaf_value());
        assert_eq!(r.tmpl.default_value.as_deref(), Some("router"));
    }

    #[test]
    fn template_children() {
        let (_t, reg) = registry();
        let names = reg.child_names(&p(&["interfaces", "ethernet"])).unwrap();
        assert_eq!(names, ["node.tag"]);
        let names = reg
            .child_names(&p(&["interfaces", "ethernet", "eth0"]))
            .unwrap();
        assert_eq!(names, ["address"]);
    }

    #[test]
    fn caches_parsed_templates() {
        let (_t, reg) = registry();
        let a = reg.resolve(&p(&["interfaces", "ethernet"])).unwrap().tmpl;
        let b = reg.resolve(&p(&["interfaces", "ethernet"])).unwrap().tmpl;
        assert!(std::ptr::eq(a, b));
    }
}
