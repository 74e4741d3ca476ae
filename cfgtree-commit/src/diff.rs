//! Construction of the commit tree from the active and working
//! snapshots.

use std::collections::BTreeMap;

use cfgtree_schema::Template;
use cfgtree_store::CfgPath;

use crate::node::CfgNode;

/// Per-node (and per-value) change status in the commit tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    Unchanged,
    Added,
    Deleted,
    Changed,
}

pub type NodeId = usize;

/// One node of the commit tree, held in the tree's arena.
#[derive(Debug)]
pub struct CommitNode<'t> {
    pub path: CfgPath,
    pub name: String,
    /// The tag value for tag-value nodes.
    pub value: Option<String>,
    pub state: CommitState,
    pub tmpl: Option<&'t Template>,
    pub is_value: bool,
    pub is_tag: bool,
    pub is_leaf: bool,
    pub is_multi: bool,

    /// Values of an added or deleted leaf.
    pub values: Vec<String>,
    /// Value list of a changed multi-leaf with the per-value status:
    /// deleted values first, then the new value list in order.
    pub multi_values: Vec<(String, CommitState)>,
    /// Before/after value of a changed single leaf.
    pub value_before: Option<String>,
    pub value_after: Option<String>,
    pub default_before: bool,
    pub default_after: bool,

    /// Comments diff independently of the node status.
    pub comment_state: CommitState,
    pub comment_after: Option<String>,

    // execution bookkeeping
    pub subtree_changed: bool,
    pub create_failed: bool,
    pub child_delete_failed: bool,

    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl CommitNode<'_> {
    /// Whether the node opens its own begin/end block.
    pub fn is_begin_end(&self) -> bool {
        self.tmpl.map(|t| t.is_begin_end_node()).unwrap_or(false)
    }

    /// A tag node proper (not one of its values). Commit acts on tag
    /// values, never on tag nodes.
    pub fn is_tag_node(&self) -> bool {
        self.is_tag && !self.is_value
    }

    /// The value bound to `@` when this node's actions run.
    pub fn at(&self) -> String {
        if let Some(v) = &self.value {
            return v.clone();
        }
        if self.is_leaf && !self.is_multi {
            if self.state == CommitState::Changed {
                return self.value_after.clone().unwrap_or_default();
            }
            return self.values.first().cloned().unwrap_or_default();
        }
        self.name.clone()
    }

    /// The path shown to the user for this node's actions.
    pub fn display_path(&self, value: Option<&str>) -> CfgPath {
        let mut p = self.path.clone();
        if let Some(v) = value {
            p.push(v);
        } else if self.is_leaf && !self.is_multi {
            p.push(self.at());
        }
        p
    }
}

/// The commit tree: the difference between active and working, rooted at
/// the configuration root. Nodes own their children; parents are weak
/// index references into the arena.
#[derive(Debug, Default)]
pub struct CommitTree<'t> {
    pub nodes: Vec<CommitNode<'t>>,
}

impl<'t> CommitTree<'t> {
    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &CommitNode<'t> {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut CommitNode<'t> {
        &mut self.nodes[id]
    }

    /// Builds the commit tree from the two snapshots. `None` when
    /// nothing differs.
    pub fn build(active: &CfgNode<'t>, working: &CfgNode<'t>) -> Option<CommitTree<'t>> {
        let mut tree = CommitTree { nodes: Vec::new() };
        let root = tree.diff(Some(active), Some(working), None)?;
        debug_assert_eq!(root, 0);
        Some(tree)
    }

    /// Marks `id` and all its ancestors as having a changed subtree.
    pub fn mark_subtree_changed(&mut self, id: NodeId) {
        let mut cur = Some(id);
        while let Some(i) = cur {
            if self.nodes[i].subtree_changed {
                break;
            }
            self.nodes[i].subtree_changed = true;
            cur = self.nodes[i].parent;
        }
    }

    /// Marks the failed deletion below `id` on the node and all its
    /// ancestors, keeping them from being deleted themselves.
    pub fn mark_child_delete_failed(&mut self, id: NodeId) {
        let mut cur = Some(id);
        while let Some(i) = cur {
            self.nodes[i].child_delete_failed = true;
            cur = self.nodes[i].parent;
        }
    }

    /// Marks the create of `id` failed: every node of the subtree that
    /// is being created is blocked.
    pub fn mark_create_failed(&mut self, id: NodeId) {
        if self.nodes[id].state == CommitState::Added {
            self.nodes[id].create_failed = true;
        }
        for child in self.nodes[id].children.clone() {
            self.mark_create_failed(child);
        }
    }

    /// Detaches `id` from its parent (used when extracting priority
    /// subtrees); the parent keeps no reference to it.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent {
            self.nodes[parent].children.retain(|&c| c != id);
        }
        self.nodes[id].parent = None;
    }

    fn push(&mut self, node: CommitNode<'t>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(node);
        id
    }

    fn diff(
        &mut self,
        active: Option<&CfgNode<'t>>,
        working: Option<&CfgNode<'t>>,
        parent: Option<NodeId>,
    ) -> Option<NodeId> {
        // deactivated subtrees are absent on their side
        let active = active.filter(|n| !n.is_deactivated);
        let working = working.filter(|n| !n.is_deactivated);

        let (a, w) = match (active, working) {
            (None, None) => return None,
            pair => pair,
        };

        if a.map(|n| n.is_leaf).unwrap_or(false) || w.map(|n| n.is_leaf).unwrap_or(false) {
            return self.diff_leaf(a, w, parent);
        }

        match (a, w) {
            (None, Some(w)) => Some(self.adopt(w, CommitState::Added, parent)),
            (Some(a), None) => Some(self.adopt(a, CommitState::Deleted, parent)),
            (Some(a), Some(w)) => {
                let id = self.push(from_cfg(a, CommitState::Unchanged, parent));
                self.nodes[id].comment_state = comment_diff(&a.comment, &w.comment);
                self.nodes[id].comment_after = w.comment.clone();

                let mut keys: BTreeMap<&str, (Option<&CfgNode>, Option<&CfgNode>)> =
                    BTreeMap::new();
                for c in &a.children {
                    keys.entry(c.pair_key()).or_default().0 = Some(c);
                }
                for c in &w.children {
                    keys.entry(c.pair_key()).or_default().1 = Some(c);
                }
                let mut children = Vec::new();
                for (_, (ac, wc)) in keys {
                    if let Some(cid) = self.diff(ac, wc, Some(id)) {
                        children.push(cid);
                    }
                }
                if children.is_empty() && self.nodes[id].comment_state == CommitState::Unchanged {
                    self.nodes.truncate(id);
                    return None;
                }
                self.nodes[id].children = children;
                Some(id)
            }
            (None, None) => unreachable!(),
        }
    }

    fn diff_leaf(
        &mut self,
        a: Option<&CfgNode<'t>>,
        w: Option<&CfgNode<'t>>,
        parent: Option<NodeId>,
    ) -> Option<NodeId> {
        match (a, w) {
            (None, Some(w)) => Some(self.push(from_cfg(w, CommitState::Added, parent))),
            (Some(a), None) => Some(self.push(from_cfg(a, CommitState::Deleted, parent))),
            (Some(a), Some(w)) => {
                if a.is_multi {
                    let multi = diff_multi_values(&a.values, &w.values)?;
                    let mut node = from_cfg(a, CommitState::Changed, parent);
                    node.multi_values = multi;
                    Some(self.push(node))
                } else {
                    let val_a = a.value.clone().unwrap_or_default();
                    let val_w = w.value.clone().unwrap_or_default();
                    if val_a == val_w && a.is_default == w.is_default {
                        return None;
                    }
                    let mut node = from_cfg(a, CommitState::Changed, parent);
                    node.value_before = Some(val_a);
                    node.value_after = Some(val_w);
                    node.default_before = a.is_default;
                    node.default_after = w.is_default;
                    Some(self.push(node))
                }
            }
            (None, None) => None,
        }
    }

    // deep copy of a wholly added or deleted subtree
    fn adopt(&mut self, cfg: &CfgNode<'t>, state: CommitState, parent: Option<NodeId>) -> NodeId {
        let id = self.push(from_cfg(cfg, state, parent));
        if cfg.comment.is_some() {
            self.nodes[id].comment_state = state;
            self.nodes[id].comment_after = cfg.comment.clone();
        }
        let mut children = Vec::new();
        for c in &cfg.children {
            if c.is_deactivated {
                continue;
            }
            children.push(self.adopt(c, state, Some(id)));
        }
        self.nodes[id].children = children;
        id
    }
}

fn from_cfg<'t>(cfg: &CfgNode<'t>, state: CommitState, parent: Option<NodeId>) -> CommitNode<'t> {
    CommitNode {
        path: cfg.path.clone(),
        name: cfg.name.clone(),
        value: if cfg.is_value { cfg.value.clone() } else { None },
        state,
        tmpl: cfg.tmpl,
        is_value: cfg.is_value,
        is_tag: cfg.is_tag,
        is_leaf: cfg.is_leaf,
        is_multi: cfg.is_multi,
        values: cfg.values.clone(),
        multi_values: Vec::new(),
        value_before: None,
        value_after: None,
        default_before: false,
        default_after: false,
        comment_state: CommitState::Unchanged,
        comment_after: None,
        subtree_changed: false,
        create_failed: false,
        child_delete_failed: false,
        parent,
        children: Vec::new(),
    }
}

fn comment_diff(before: &Option<String>, after: &Option<String>) -> CommitState {
    match (before, after) {
        (None, None) => CommitState::Unchanged,
        (None, Some(_)) => CommitState::Added,
        (Some(_), None) => CommitState::Deleted,
        (Some(b), Some(a)) if b == a => CommitState::Unchanged,
        _ => CommitState::Changed,
    }
}

/// Compares the ordered value lists of a multi-leaf. Deleted values come
/// first, then every new value with its status. A value present in both
/// lists is unchanged only at the same index; at a different index it is
/// changed, so reorderings of order-sensitive leaves run their actions.
pub fn diff_multi_values(
    old: &[String],
    new: &[String],
) -> Option<Vec<(String, CommitState)>> {
    let mut out = Vec::new();
    let mut changed = false;
    for ov in old {
        if !new.contains(ov) {
            out.push((ov.clone(), CommitState::Deleted));
            changed = true;
        }
    }
    for (i, nv) in new.iter().enumerate() {
        if !old.contains(nv) {
            out.push((nv.clone(), CommitState::Added));
            changed = true;
        } else if old.get(i) == Some(nv) {
            out.push((nv.clone(), CommitState::Unchanged));
        } else {
            out.push((nv.clone(), CommitState::Changed));
            changed = true;
        }
    }
    changed.then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(values: &[(String, CommitState)]) -> Vec<(&str, CommitState)> {
        values.iter().map(|(v, s)| (v.as_str(), *s)).collect()
    }

    #[test]
    fn multi_diff_add_delete() {
        let old = ["a".to_owned(), "b".to_owned()];
        let new = ["b".to_owned(), "c".to_owned()];
        let diff = diff_multi_values(&old, &new).unwrap();
        assert_eq!(
            states(&diff),
            [
                ("a", CommitState::Deleted),
                ("b", CommitState::Changed),
                ("c", CommitState::Added),
            ]
        );
    }

    #[test]
    fn multi_diff_reorder_is_changed() {
        // [a, b, c] -> [a, c, b]: a unchanged, b and c changed
        let old = ["a".to_owned(), "b".to_owned(), "c".to_owned()];
        let new = ["a".to_owned(), "c".to_owned(), "b".to_owned()];
        let diff = diff_multi_values(&old, &new).unwrap();
        assert_eq!(
            states(&diff),
            [
                ("a", CommitState::Unchanged),
                ("c", CommitState::Changed),
                ("b", CommitState::Changed),
            ]
        );
    }

    #[test]
    fn multi_diff_identical_is_none() {
        let vals = ["a".to_owned(), "b".to_owned()];
        assert!(diff_multi_values(&vals, &vals).is_none());
    }
}
