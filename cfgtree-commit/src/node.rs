//! Snapshot of a configuration (sub)tree read from one layer.

use anyhow::Result;

use cfgtree_schema::{Template, TemplateRegistry};
use cfgtree_store::{CfgPath, Layer, Marker, SortOrder, Store};

/// One node of a configuration snapshot.
///
/// A tag node's children are its tag values (nodes with `is_value` set
/// and the tag value in `value`); a leaf node carries its value list and
/// has no children.
#[derive(Debug)]
pub struct CfgNode<'t> {
    /// Logical path, tag values included; leaf paths end at the leaf
    /// name.
    pub path: CfgPath,
    pub name: String,
    /// The tag value for tag-value nodes, the value for single leaves.
    pub value: Option<String>,
    /// All values of a leaf.
    pub values: Vec<String>,
    pub is_value: bool,
    pub is_tag: bool,
    pub is_leaf: bool,
    pub is_multi: bool,
    pub is_default: bool,
    pub is_deactivated: bool,
    pub comment: Option<String>,
    /// `None` only for the synthetic root node.
    pub tmpl: Option<&'t Template>,
    pub children: Vec<CfgNode<'t>>,
}

impl<'t> CfgNode<'t> {
    /// Reads the whole configuration of `layer` into a snapshot rooted
    /// at a synthetic root node.
    pub fn read_root(
        store: &Store,
        registry: &'t TemplateRegistry,
        layer: Layer,
    ) -> Result<CfgNode<'t>> {
        let root = CfgPath::root();
        let mut children = Vec::new();
        for name in store.children(&root, layer, SortOrder::Lexical)? {
            if let Some(child) = Self::read(store, registry, &root.join(name), layer)? {
                children.push(child);
            }
        }
        Ok(CfgNode {
            path: root,
            name: String::new(),
            value: None,
            values: Vec::new(),
            is_value: false,
            is_tag: false,
            is_leaf: false,
            is_multi: false,
            is_default: false,
            is_deactivated: false,
            comment: None,
            tmpl: None,
            children,
        })
    }

    /// Reads the node at `path`, or `None` when it does not exist or has
    /// no valid template.
    pub fn read(
        store: &Store,
        registry: &'t TemplateRegistry,
        path: &CfgPath,
        layer: Layer,
    ) -> Result<Option<CfgNode<'t>>> {
        if !store.exists(path, layer) {
            return Ok(None);
        }
        let Some(resolved) = registry.try_resolve(path)? else {
            tracing::warn!(%path, "config node without template, skipping");
            return Ok(None);
        };
        let tmpl = resolved.tmpl;
        let name = path.last().unwrap_or_default().to_owned();
        let is_deactivated = store.marked(path, Marker::Deactivated, layer);
        let comment = store.comment(path, layer)?;

        let mut node = CfgNode {
            path: path.clone(),
            name: name.clone(),
            value: None,
            values: Vec::new(),
            is_value: resolved.is_value,
            is_tag: tmpl.is_tag,
            is_leaf: false,
            is_multi: tmpl.is_multi,
            is_default: false,
            is_deactivated,
            comment,
            tmpl: Some(tmpl),
            children: Vec::new(),
        };

        if resolved.is_tag_value() {
            node.value = Some(name);
        }

        if !tmpl.is_tag && !tmpl.is_typeless() && !resolved.is_value {
            // leaf node: values, no children
            node.is_leaf = true;
            node.values = store.read_values(path, layer)?.unwrap_or_default();
            if !tmpl.is_multi {
                node.value = node.values.first().cloned();
                node.is_default = store.marked(path, Marker::DisplayDefault, layer);
            }
            return Ok(Some(node));
        }

        let order = if tmpl.version_sorted_children {
            SortOrder::Version
        } else {
            SortOrder::Lexical
        };
        for child in store.children(path, layer, order)? {
            if let Some(c) = Self::read(store, registry, &path.join(child), layer)? {
                node.children.push(c);
            }
        }
        Ok(Some(node))
    }

    /// The key a parent uses to pair this node with its counterpart in
    /// the other layer: tag values pair by value, others by name.
    pub fn pair_key(&self) -> &str {
        if self.is_value {
            self.value.as_deref().unwrap_or(&self.name)
        } else {
            &self.name
        }
    }
}
