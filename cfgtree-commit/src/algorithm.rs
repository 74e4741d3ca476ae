//! The priority-ordered commit engine.
//!
//! The commit tree is split into a forest of priority subtrees; deletes
//! run first from the highest priority down, then updates from the
//! lowest up. Each subtree runs its commit-time syntax checks, a
//! bottom-up delete pass and a top-down create/update pass, with
//! begin/end blocks inherited from the nearest ancestor that defines
//! them. Failures stay within their subtree: a failed delete protects
//! every ancestor from deletion, a failed create blocks every dependent
//! create below it.

use anyhow::{bail, Result};
use camino::Utf8PathBuf;

use cfgtree_eval::{execute, ActionRunner, EvalContext};
use cfgtree_schema::{ActionKind, TemplateRegistry};
use cfgtree_store::{CfgPath, Layer, Store};

use crate::diff::{CommitState, CommitTree, NodeId};
use crate::hooks::run_hook_dir;
use crate::lock::CommitLock;
use crate::node::CfgNode;

/// Commit engine configuration supplied by the session facade.
#[derive(Debug, Clone, Default)]
pub struct CommitOpts {
    /// Environment exported to every action and hook (the store roots,
    /// template root and edit levels).
    pub base_env: Vec<(String, String)>,
    /// Forward `_errloc_:` prefixes instead of stripping them.
    pub forward_errloc: bool,
    /// Per-session action log.
    pub log_file: Option<Utf8PathBuf>,
    pub pre_hook_dir: Option<Utf8PathBuf>,
    pub post_hook_dir: Option<Utf8PathBuf>,
}

/// Overall commit result reported to the hooks and the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    Success,
    Partial,
    Failure,
}

impl CommitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CommitStatus::Success => "SUCCESS",
            CommitStatus::Partial => "PARTIAL",
            CommitStatus::Failure => "FAILURE",
        }
    }
}

/// Per-commit report.
#[derive(Debug)]
pub struct CommitOutcome {
    pub status: CommitStatus,
    /// Display paths of the priority subtrees that failed.
    pub failed: Vec<String>,
}

type PrioId = usize;

/// One schedulable unit: a maximal subtree whose root carries a
/// priority. The forest root wraps the residual commit tree.
#[derive(Debug)]
struct PrioNode {
    cfg: NodeId,
    /// The commit-tree parent of the subtree root (the tag node's parent
    /// for tag values), used for cross-subtree failure propagation.
    cfg_parent: Option<NodeId>,
    priority: u32,
    state: CommitState,
    parent: Option<PrioId>,
    children: Vec<PrioId>,
    succeeded: bool,
    subtree_failure: bool,
    subtree_success: bool,
}

struct Engine<'a, 't> {
    store: &'a Store,
    registry: &'t TemplateRegistry,
    opts: &'a CommitOpts,
    tree: CommitTree<'t>,
    prio: Vec<PrioNode>,
}

/// Runs a full commit: locks, diffs, schedules, executes and publishes.
///
/// The caller has already verified that the session exists and has
/// changes to commit.
pub fn do_commit(
    store: &Store,
    registry: &TemplateRegistry,
    opts: &CommitOpts,
) -> Result<CommitOutcome> {
    let Some(_lock) = CommitLock::acquire(&store.commit_lock_file())? else {
        bail!("Configuration system temporarily locked due to another commit in progress");
    };

    let active = CfgNode::read_root(store, registry, Layer::Active)?;
    let working = CfgNode::read_root(store, registry, Layer::Working)?;
    let Some(tree) = CommitTree::build(&active, &working) else {
        // logically identical configs; regenerate active anyway so any
        // intermediate session state is cleaned up
        store.snapshot_working()?;
        store.stage_subtree(&CfgPath::root(), Layer::Working)?;
        store.publish_active()?;
        store.clear_committed_markers()?;
        return Ok(CommitOutcome {
            status: CommitStatus::Success,
            failed: Vec::new(),
        });
    };

    if let Some(dir) = &opts.pre_hook_dir {
        run_hook_dir(dir, &opts.base_env);
    }

    let mut engine = Engine {
        store,
        registry,
        opts,
        tree,
        prio: Vec::new(),
    };
    let outcome = engine.run()?;

    if let Some(dir) = &opts.post_hook_dir {
        let mut envs = opts.base_env.clone();
        envs.push(("COMMIT_STATUS".to_owned(), outcome.status.as_str().to_owned()));
        run_hook_dir(dir, &envs);
    }
    Ok(outcome)
}

impl<'a, 't> Engine<'a, 't> {
    fn run(&mut self) -> Result<CommitOutcome> {
        let root = self.tree.root();
        self.prio.push(PrioNode {
            cfg: root,
            cfg_parent: None,
            priority: 0,
            state: self.tree.node(root).state,
            parent: None,
            children: Vec::new(),
            succeeded: true,
            subtree_failure: false,
            subtree_success: false,
        });
        let children = self.tree.node(root).children.clone();
        for c in children {
            self.extract_prio_subtrees(c, 0);
        }

        // delete queue: highest priority first; update queue: lowest
        // first. Ties are broken arbitrarily.
        let mut deletes: Vec<PrioId> = Vec::new();
        let mut updates: Vec<PrioId> = Vec::new();
        for id in 0..self.prio.len() {
            if self.prio[id].state == CommitState::Deleted {
                deletes.push(id);
            } else {
                updates.push(id);
            }
        }
        deletes.sort_by_key(|&id| std::cmp::Reverse(self.prio[id].priority));
        updates.sort_by_key(|&id| self.prio[id].priority);

        let mut succeeded = 0usize;
        let mut failed = Vec::new();
        for id in deletes {
            if self.exec_prio_subtree(id)? {
                succeeded += 1;
            } else {
                let path = self.subtree_display(id);
                println!("delete [ {path} ] failed");
                failed.push(path);
            }
        }
        for id in updates {
            if self.exec_prio_subtree(id)? {
                succeeded += 1;
            } else {
                let path = self.subtree_display(id);
                println!("[[{path}]] failed");
                failed.push(path);
            }
        }

        let status = if failed.is_empty() {
            CommitStatus::Success
        } else {
            println!("Commit failed");
            if succeeded > 0 {
                CommitStatus::Partial
            } else {
                CommitStatus::Failure
            }
        };

        // publish: per-subtree staging, then the atomic layer swap
        self.store.snapshot_working()?;
        self.stage(0)?;
        self.store.publish_active()?;
        self.store.clear_committed_markers()?;
        if succeeded > 0 {
            // the running config now differs from the saved one
            self.store.mark_session_unsaved()?;
        }
        Ok(CommitOutcome { status, failed })
    }

    fn subtree_display(&self, id: PrioId) -> String {
        self.tree.node(self.prio[id].cfg).path.to_string()
    }

    ////// priority forest

    fn extract_prio_subtrees(&mut self, cfg_id: NodeId, prio_parent: PrioId) {
        let mut pn = prio_parent;
        let children = self.tree.node(cfg_id).children.clone();
        let node = self.tree.node(cfg_id);
        // only non-"tag node" roots apply; tag nodes are not acted on
        if let Some(prio) = node.tmpl.and_then(|t| t.priority) {
            if node.is_value || !node.is_tag {
                let pprio = self.prio[prio_parent].priority;
                let mut effective = prio;
                if prio <= pprio {
                    let child = node.path.to_string();
                    let parent = self.subtree_display(prio_parent);
                    println!(
                        "Warning: priority inversion [{child}]({prio}) <= [{parent}]({pprio})\n\
                                  changing [{child}] to ({})",
                        pprio + 1
                    );
                    effective = pprio + 1;
                }
                // tag values hang off the tag node, which commit skips
                let cfg_parent = match node.parent {
                    Some(p) if node.is_tag => self.tree.node(p).parent,
                    other => other,
                };
                let id = self.prio.len();
                self.prio.push(PrioNode {
                    cfg: cfg_id,
                    cfg_parent,
                    priority: effective,
                    state: node.state,
                    parent: Some(prio_parent),
                    children: Vec::new(),
                    succeeded: true,
                    subtree_failure: false,
                    subtree_success: false,
                });
                self.prio[prio_parent].children.push(id);
                self.tree.detach(cfg_id);
                pn = id;
            }
        }
        for c in children {
            self.extract_prio_subtrees(c, pn);
        }
    }

    fn set_succeeded(&mut self, id: PrioId, succeeded: bool) {
        if succeeded {
            let mut cur = self.prio[id].parent;
            while let Some(p) = cur {
                if self.prio[p].subtree_success {
                    break;
                }
                self.prio[p].subtree_success = true;
                cur = self.prio[p].parent;
            }
            return;
        }
        self.prio[id].succeeded = false;
        let mut cur = self.prio[id].parent;
        while let Some(p) = cur {
            if self.prio[p].subtree_failure {
                break;
            }
            self.prio[p].subtree_failure = true;
            cur = self.prio[p].parent;
        }
        if self.prio[id].state == CommitState::Deleted {
            if let Some(cfg_parent) = self.prio[id].cfg_parent {
                // protect the hierarchy above the failed delete
                self.tree.mark_child_delete_failed(cfg_parent);
            }
        }
        self.tree.mark_create_failed(self.prio[id].cfg);
    }

    ////// per-subtree execution

    fn exec_prio_subtree(&mut self, id: PrioId) -> Result<bool> {
        let cfg = self.prio[id].cfg;
        let span = tracing::debug_span!("prio_subtree", path = %self.tree.node(cfg).path);
        let _span = span.enter();

        let parent_create_failed = self.prio[id]
            .cfg_parent
            .map(|p| self.tree.node(p).create_failed)
            .unwrap_or(false);
        if self.prio[id].state == CommitState::Added && parent_create_failed {
            self.set_succeeded(id, false);
            return Ok(false);
        }

        let mut clist = Vec::new();
        let ok = self.check_pass(cfg, &mut clist)? && self.exec_block(cfg)?;
        if !ok {
            self.set_succeeded(id, false);
            return Ok(false);
        }
        for (is_delete, path) in clist {
            self.store.mark_committed(&path, is_delete)?;
        }
        self.set_succeeded(id, true);
        Ok(true)
    }

    /// Commit-time syntax pass over the whole subtree, recording the
    /// committed-path list as it goes.
    fn check_pass(&mut self, root: NodeId, clist: &mut Vec<(bool, CfgPath)>) -> Result<bool> {
        let mut list = Vec::new();
        collect(&self.tree, root, false, Order::Pre, &mut list, true, true);
        for id in list {
            let state = self.tree.node(id).state;
            if state == CommitState::Unchanged {
                let child_changed = self
                    .tree
                    .node(id)
                    .children
                    .iter()
                    .any(|&c| self.tree.node(c).state != CommitState::Unchanged);
                if child_changed && !self.exec_node_actions(id, ActionKind::Syntax)? {
                    return Ok(false);
                }
                continue;
            }
            self.tree.mark_subtree_changed(id);

            if self.tree.node(id).is_multi {
                self.record_multi_committed(id, clist);
                for (v, s) in self.multi_items(id) {
                    if s == CommitState::Added
                        && !self.exec_value_actions(id, ActionKind::Syntax, &v, s)?
                    {
                        return Ok(false);
                    }
                }
                continue;
            }
            self.record_committed(id, clist);
            if matches!(state, CommitState::Changed | CommitState::Added)
                && !self.exec_node_actions(id, ActionKind::Syntax)?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Executes one begin/end block rooted at `root`: begin, bottom-up
    /// delete pass, the root's own action, top-down create/update pass,
    /// end. Nested begin/end nodes recurse as blocks of their own.
    fn exec_block(&mut self, root: NodeId) -> Result<bool> {
        if !self.tree.node(root).subtree_changed {
            return Ok(true);
        }
        if self.tree.node(root).is_multi {
            // a multi committed as a top-level node runs both passes
            return Ok(self.multi_pass(root, ActionKind::Delete)?
                && self.multi_pass(root, ActionKind::Update)?);
        }

        if !self.exec_node_actions(root, ActionKind::Begin)? {
            return Ok(false);
        }

        // delete pass (bottom-up)
        let mut list = Vec::new();
        collect(&self.tree, root, true, Order::Post, &mut list, false, true);
        for id in list {
            let node = self.tree.node(id);
            if node.is_multi {
                if !self.multi_pass(id, ActionKind::Delete)? {
                    return Ok(false);
                }
                continue;
            }
            if node.state != CommitState::Deleted {
                continue;
            }
            if node.is_begin_end() {
                if !self.exec_block(id)? {
                    return Ok(false);
                }
            } else if !self.exec_node_actions(id, ActionKind::Delete)? {
                return Ok(false);
            }
        }

        // the block root itself
        match self.tree.node(root).state {
            CommitState::Unchanged => {}
            CommitState::Deleted => {
                if !self.exec_node_actions(root, ActionKind::Delete)? {
                    return Ok(false);
                }
            }
            CommitState::Added => {
                if !self.exec_node_actions(root, ActionKind::Create)? {
                    return Ok(false);
                }
                if !self.exec_node_actions(root, ActionKind::Activate)? {
                    return Ok(false);
                }
            }
            CommitState::Changed => {
                if !self.exec_node_actions(root, ActionKind::Update)? {
                    return Ok(false);
                }
            }
        }

        // create/update pass (top-down)
        let mut list = Vec::new();
        collect(&self.tree, root, true, Order::Pre, &mut list, false, true);
        for id in list {
            let node = self.tree.node(id);
            if node.is_multi {
                if !self.multi_pass(id, ActionKind::Update)? {
                    return Ok(false);
                }
                continue;
            }
            match node.state {
                // deleted nodes were handled in the previous pass
                CommitState::Deleted | CommitState::Unchanged if !node.is_begin_end() => continue,
                _ => {}
            }
            if node.is_begin_end() {
                if node.state != CommitState::Deleted && !self.exec_block(id)? {
                    return Ok(false);
                }
                continue;
            }
            match node.state {
                CommitState::Added => {
                    if !self.exec_node_actions(id, ActionKind::Create)? {
                        return Ok(false);
                    }
                    if !self.exec_node_actions(id, ActionKind::Activate)? {
                        return Ok(false);
                    }
                }
                CommitState::Changed => {
                    if !self.exec_node_actions(id, ActionKind::Update)? {
                        return Ok(false);
                    }
                }
                _ => {}
            }
        }

        self.exec_node_actions(root, ActionKind::End)
    }

    /// Runs one kind of action on a non-multi node.
    fn exec_node_actions(&mut self, id: NodeId, kind: ActionKind) -> Result<bool> {
        let node = self.tree.node(id);
        if node.is_multi {
            bail!("node actions invoked on multi leaf [{}]", node.path);
        }
        if node.state == CommitState::Deleted && node.child_delete_failed {
            return Ok(false);
        }
        // a value change that only flips the default status is a nop
        if node.is_leaf
            && node.state == CommitState::Changed
            && node.value_before == node.value_after
        {
            return Ok(true);
        }
        let at = node.at();
        let path_display = if node.is_value {
            node.path.clone()
        } else {
            node.display_path(None)
        };
        let ok = self.run_tmpl_action(id, kind, &at, &path_display)?;
        if !ok && kind == ActionKind::Create {
            self.tree.mark_create_failed(id);
        }
        Ok(ok)
    }

    fn exec_value_actions(
        &mut self,
        id: NodeId,
        kind: ActionKind,
        value: &str,
        state: CommitState,
    ) -> Result<bool> {
        let path_display = self.tree.node(id).path.join(value);
        self.run_tmpl_action_with(id, kind, value, state, &path_display)
    }

    /// Delete or update pass over a multi-leaf's values, each framed by
    /// its own begin/end. The delete pass walks the old value list, the
    /// update pass the new one, so reordered values are torn down in
    /// their old order and re-created in the new.
    fn multi_pass(&mut self, id: NodeId, kind: ActionKind) -> Result<bool> {
        let items = match kind {
            ActionKind::Delete => self.multi_delete_items(id),
            _ => self.multi_update_items(id),
        };
        for (v, s) in items {
            if !self.exec_value_actions(id, ActionKind::Begin, &v, s)? {
                return Ok(false);
            }
            // a changed value needs both its delete and its re-create so
            // value ordering is reapplied
            let act = match kind {
                ActionKind::Delete => ActionKind::Delete,
                _ => ActionKind::Create,
            };
            if !self.exec_value_actions(id, act, &v, s)? {
                return Ok(false);
            }
            if !self.exec_value_actions(id, ActionKind::End, &v, s)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Values the delete pass acts on, in old-list order.
    fn multi_delete_items(&self, id: NodeId) -> Vec<(String, CommitState)> {
        let node = self.tree.node(id);
        match node.state {
            CommitState::Deleted => {
                node.values.iter().map(|v| (v.clone(), node.state)).collect()
            }
            CommitState::Changed => node
                .values
                .iter()
                .filter_map(|v| {
                    let s = multi_state_of(&node.multi_values, v);
                    matches!(s, CommitState::Deleted | CommitState::Changed)
                        .then(|| (v.clone(), s))
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Values the update pass acts on, in new-list order.
    fn multi_update_items(&self, id: NodeId) -> Vec<(String, CommitState)> {
        let node = self.tree.node(id);
        match node.state {
            CommitState::Added => {
                node.values.iter().map(|v| (v.clone(), node.state)).collect()
            }
            CommitState::Changed => node
                .multi_values
                .iter()
                .filter(|(_, s)| matches!(s, CommitState::Added | CommitState::Changed))
                .cloned()
                .collect(),
            _ => Vec::new(),
        }
    }

    fn multi_items(&self, id: NodeId) -> Vec<(String, CommitState)> {
        let node = self.tree.node(id);
        if node.state == CommitState::Changed {
            node.multi_values.clone()
        } else {
            node.values
                .iter()
                .map(|v| (v.clone(), node.state))
                .collect()
        }
    }

    fn record_committed(&self, id: NodeId, clist: &mut Vec<(bool, CfgPath)>) {
        let node = self.tree.node(id);
        let is_delete = node.state == CommitState::Deleted;
        if node.is_leaf {
            if matches!(node.state, CommitState::Added | CommitState::Deleted) {
                clist.push((is_delete, node.path.clone()));
            }
            clist.push((is_delete, node.display_path(None)));
        } else {
            /* tag values and typeless nodes record their own path; tag
             * nodes are never recorded, the effective query handles them
             * by looking at their tag values. */
            clist.push((is_delete, node.path.clone()));
        }
    }

    fn record_multi_committed(&self, id: NodeId, clist: &mut Vec<(bool, CfgPath)>) {
        let node = self.tree.node(id);
        if matches!(node.state, CommitState::Added | CommitState::Deleted) {
            clist.push((node.state == CommitState::Deleted, node.path.clone()));
        }
        for (v, s) in self.multi_items(id) {
            if s != CommitState::Unchanged {
                clist.push((s == CommitState::Deleted, node.path.join(v)));
            }
        }
    }

    ////// action invocation

    fn run_tmpl_action(
        &mut self,
        id: NodeId,
        kind: ActionKind,
        at: &str,
        path_display: &CfgPath,
    ) -> Result<bool> {
        let state = self.tree.node(id).state;
        self.run_action_inner(id, kind, at, state, path_display)
    }

    fn run_tmpl_action_with(
        &mut self,
        id: NodeId,
        kind: ActionKind,
        at: &str,
        state: CommitState,
        path_display: &CfgPath,
    ) -> Result<bool> {
        self.run_action_inner(id, kind, at, state, path_display)
    }

    fn run_action_inner(
        &mut self,
        id: NodeId,
        kind: ActionKind,
        at: &str,
        state: CommitState,
        path_display: &CfgPath,
    ) -> Result<bool> {
        let node = self.tree.node(id);
        let Some(tmpl) = node.tmpl else {
            return Ok(true);
        };
        let mut programs = Vec::new();
        if kind == ActionKind::Syntax {
            // commit-time validation runs syntax and commit programs
            programs.extend(tmpl.action(ActionKind::Syntax));
            programs.extend(tmpl.action(ActionKind::Commit));
        } else {
            programs.extend(tmpl.action_or_fallback(kind));
        }
        if programs.is_empty() {
            return Ok(true);
        }

        let commit_action = match state {
            CommitState::Added | CommitState::Changed => "SET",
            CommitState::Deleted => "DELETE",
            CommitState::Unchanged => "ACTIVE",
        };
        let mut envs = self.opts.base_env.clone();
        envs.push(("COMMIT_ACTION".to_owned(), commit_action.to_owned()));
        if let Some(position) = self.sibling_position(id) {
            envs.push(("SIBLING_POSITION".to_owned(), position.to_owned()));
        }
        let runner = ActionRunner {
            envs,
            prepend: Some(path_display.to_string()),
            forward_errloc: self.opts.forward_errloc,
            log_file: self.opts.log_file.clone(),
        };

        let cfg_path = node.path.clone();
        tracing::debug!(path = %path_display, ?kind, commit_action, "executing actions");
        let ctx = EvalContext::for_commit(
            self.store,
            self.registry,
            cfg_path,
            tmpl,
            at.to_owned(),
            kind == ActionKind::Delete,
            runner,
        );
        for program in programs {
            let ok = execute(&ctx, program)?;
            if !ok {
                for msg in ctx.take_messages() {
                    println!("[{path_display}]\n{msg}\n");
                }
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn sibling_position(&self, id: NodeId) -> Option<&'static str> {
        let parent = self.tree.node(id).parent?;
        let siblings = &self.tree.node(parent).children;
        if siblings.first() == Some(&id) {
            Some("FIRST")
        } else if siblings.last() == Some(&id) {
            Some("LAST")
        } else {
            None
        }
    }

    ////// publication

    /// Builds the staged next-active layer from the per-subtree
    /// outcomes: a succeeded subtree contributes its working content, a
    /// failed one keeps its active content.
    fn stage(&mut self, id: PrioId) -> Result<()> {
        let cfg = self.prio[id].cfg;
        let path = self.tree.node(cfg).path.clone();
        self.store.unstage_subtree(&path)?;
        if self.tree.node(cfg).is_value {
            // a dissolved tag node leaves an empty staged parent behind
            self.store.prune_staged_parent(&path)?;
        }
        if self.prio[id].succeeded {
            self.store.stage_subtree(&path, Layer::Working)?;
            if !self.prio[id].subtree_failure {
                return Ok(());
            }
        } else {
            self.store.stage_subtree(&path, Layer::Active)?;
            if !self.prio[id].subtree_success {
                return Ok(());
            }
        }
        for c in self.prio[id].children.clone() {
            self.stage(c)?;
        }
        Ok(())
    }
}

fn multi_state_of(multi_values: &[(String, CommitState)], value: &str) -> CommitState {
    for (v, s) in multi_values {
        if v == value {
            return *s;
        }
    }
    CommitState::Unchanged
}

#[derive(Clone, Copy, PartialEq)]
enum Order {
    Pre,
    Post,
}

/// Commit traversal: tag nodes are passed through (only their values are
/// listed), and with `block_only` the walk stops at nested begin/end
/// nodes, which execute as blocks of their own.
fn collect(
    tree: &CommitTree,
    id: NodeId,
    block_only: bool,
    order: Order,
    out: &mut Vec<NodeId>,
    include_root: bool,
    init: bool,
) {
    let node = tree.node(id);
    if order == Order::Pre && !node.is_tag_node() && include_root {
        out.push(id);
    }
    if init || !block_only || node.is_tag_node() || !node.is_begin_end() {
        for &c in &node.children {
            collect(tree, c, block_only, order, out, true, false);
        }
    }
    if order == Order::Post && !node.is_tag_node() && include_root {
        out.push(id);
    }
}
