//! Read-only observers of the working, active and effective configs.
//!
//! The plain observers hide deactivated nodes; the deactivate-aware
//! (`_da`) variants see them and exist only for configuration output
//! (show, save, load). The effective observers combine working, active
//! and the in-progress commit's committed markers.

use std::collections::BTreeSet;

use anyhow::Result;

use cfgtree_store::{CfgPath, Layer, Marker};

use super::Cstore;

/// Status of a child node relative to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Static,
    Added,
    Deleted,
    Changed,
}

impl NodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Static => "static",
            NodeStatus::Added => "added",
            NodeStatus::Deleted => "deleted",
            NodeStatus::Changed => "changed",
        }
    }
}

impl Cstore {
    ////// plain observers (not deactivate-aware)

    pub fn cfg_exists(&self, path: &CfgPath, active: bool) -> bool {
        self.path_exists(path, layer_of(active), false)
    }

    pub fn cfg_exists_da(&self, path: &CfgPath, active: bool, include_deactivated: bool) -> bool {
        self.path_exists(path, layer_of(active), include_deactivated)
    }

    /// The single value of a leaf.
    pub fn get_value(&self, path: &CfgPath, active: bool) -> Result<Option<String>> {
        Ok(self.get_values(path, active)?.and_then(|mut v| {
            if v.is_empty() {
                None
            } else {
                Some(v.remove(0))
            }
        }))
    }

    pub fn get_values(&self, path: &CfgPath, active: bool) -> Result<Option<Vec<String>>> {
        let layer = layer_of(active);
        if self.store().deactivated(path, layer) {
            return Ok(None);
        }
        self.store().read_values(path, layer)
    }

    pub fn get_values_da(&self, path: &CfgPath, active: bool) -> Result<Option<Vec<String>>> {
        self.store().read_values(path, layer_of(active))
    }

    pub fn get_child_nodes(&self, path: &CfgPath, active: bool) -> Result<Vec<String>> {
        self.child_names(path, layer_of(active), false)
    }

    pub fn get_child_nodes_da(&self, path: &CfgPath, active: bool) -> Result<Vec<String>> {
        self.child_names(path, layer_of(active), true)
    }

    pub fn get_comment(&self, path: &CfgPath, active: bool) -> Result<Option<String>> {
        self.store().comment(path, layer_of(active))
    }

    /// Whether the leaf at `path` still carries its schema default.
    pub fn is_default(&self, path: &CfgPath, active: bool) -> bool {
        self.store()
            .marked(path, Marker::DisplayDefault, layer_of(active))
    }

    /// Whether `path` itself carries the deactivated marker.
    pub fn marked_deactivated(&self, path: &CfgPath, active: bool) -> bool {
        self.store()
            .marked(path, Marker::Deactivated, layer_of(active))
    }

    /// Whether `path` behaves as deactivated (own or inherited marker).
    pub fn deactivated(&self, path: &CfgPath, active: bool) -> bool {
        self.store().deactivated(path, layer_of(active))
    }

    ////// working-versus-active observers

    pub fn deleted(&self, path: &CfgPath) -> bool {
        self.cfg_exists(path, true) && !self.cfg_exists(path, false)
    }

    pub fn added(&self, path: &CfgPath) -> bool {
        !self.cfg_exists(path, true) && self.cfg_exists(path, false)
    }

    pub fn changed(&self, path: &CfgPath) -> bool {
        self.deleted(path)
            || self.added(path)
            || self.store().marked(path, Marker::Changed, Layer::Working)
    }

    /// Child names of `path` that have been deleted in this session.
    pub fn deleted_child_nodes(&self, path: &CfgPath) -> Result<Vec<String>> {
        let working: BTreeSet<String> =
            self.get_child_nodes(path, false)?.into_iter().collect();
        Ok(self
            .get_child_nodes(path, true)?
            .into_iter()
            .filter(|c| !working.contains(c))
            .collect())
    }

    /// Values of a multi-leaf deleted in this session.
    pub fn deleted_values(&self, path: &CfgPath) -> Result<Vec<String>> {
        let working = self.get_values(path, false)?.unwrap_or_default();
        Ok(self
            .get_values(path, true)?
            .unwrap_or_default()
            .into_iter()
            .filter(|v| !working.contains(v))
            .collect())
    }

    /// Each child of `path` in either layer, with its session status.
    pub fn child_nodes_status(&self, path: &CfgPath) -> Result<Vec<(String, NodeStatus)>> {
        let active: BTreeSet<String> = self.get_child_nodes(path, true)?.into_iter().collect();
        let working: BTreeSet<String> =
            self.get_child_nodes(path, false)?.into_iter().collect();
        let mut out = Vec::new();
        for name in active.union(&working) {
            let child = path.join(name.clone());
            let status = match (active.contains(name), working.contains(name)) {
                (true, false) => NodeStatus::Deleted,
                (false, true) => NodeStatus::Added,
                _ if self.changed(&child) => NodeStatus::Changed,
                _ => NodeStatus::Static,
            };
            out.push((name.clone(), status));
        }
        Ok(out)
    }

    ////// effective observers
    //
    // During a commit a path is effective iff it is in both configs, or
    // its addition has already been committed, or its deletion has not
    // been committed (yet, or at all because it failed). Outside a
    // session the effective config is simply the active config.

    pub fn effective(&self, path: &CfgPath) -> Result<bool> {
        let Some(resolved) = self.registry().try_resolve(path)? else {
            return Ok(false);
        };
        let in_active = self.cfg_exists(path, true);
        if !self.in_session() {
            return Ok(in_active);
        }
        let in_working = self.cfg_exists(path, false);
        match (in_active, in_working) {
            (true, true) => Ok(true),
            (false, false) => Ok(false),
            _ => {
                if resolved.is_tag_node() {
                    /* tag nodes are never marked committed themselves;
                     * one effective tag value makes the node effective */
                    for tval in self.child_names(path, layer_of(in_active), false)? {
                        let vpath = path.join(tval);
                        let committed = self.store().marked_committed(&vpath, in_active)?;
                        if in_active != committed {
                            return Ok(true);
                        }
                    }
                    return Ok(false);
                }
                let committed = self.store().marked_committed(path, in_active)?;
                // a pending delete is still effective, a pending add is
                // not effective yet
                Ok(in_active != committed)
            }
        }
    }

    pub fn effective_child_nodes(&self, path: &CfgPath) -> Result<Vec<String>> {
        if !self.in_session() {
            return self.get_child_nodes(path, true);
        }
        let mut union: BTreeSet<String> =
            self.get_child_nodes(path, true)?.into_iter().collect();
        union.extend(self.get_child_nodes(path, false)?);
        let mut out = Vec::new();
        for name in union {
            if self.effective(&path.join(name.clone()))? {
                out.push(name);
            }
        }
        Ok(out)
    }

    pub fn effective_value(&self, path: &CfgPath) -> Result<Option<String>> {
        if !self.in_session() {
            return self.get_value(path, true);
        }
        let oval = self.get_value(path, true)?;
        let nval = self.get_value(path, false)?;
        if let Some(nval) = nval {
            if self.effective(&path.join(nval.clone()))? {
                return Ok(Some(nval));
            }
            return Ok(oval);
        }
        if let Some(oval) = oval {
            if self.effective(&path.join(oval.clone()))? {
                return Ok(Some(oval));
            }
        }
        Ok(None)
    }

    pub fn effective_values(&self, path: &CfgPath) -> Result<Vec<String>> {
        if !self.in_session() {
            return Ok(self.get_values(path, true)?.unwrap_or_default());
        }
        let mut union: Vec<String> = self.get_values(path, false)?.unwrap_or_default();
        for v in self.get_values(path, true)?.unwrap_or_default() {
            if !union.contains(&v) {
                union.push(v);
            }
        }
        let mut out = Vec::new();
        for v in union {
            if self.effective(&path.join(v.clone()))? {
                out.push(v);
            }
        }
        Ok(out)
    }
}

fn layer_of(active: bool) -> Layer {
    if active {
        Layer::Active
    } else {
        Layer::Working
    }
}
