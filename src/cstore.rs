//! The configuration store facade: session lifecycle, edit operations
//! on the working layer, and the read-only query surface.

use std::fmt::Display;

use anyhow::{anyhow, Result};

use cfgtree_commit::{do_commit, CommitOpts, CommitOutcome};
use cfgtree_eval::{validate_value, EvalContext};
use cfgtree_schema::{ResolvedTmpl, TemplateRegistry};
use cfgtree_store::{layout, CfgPath, Layer, Marker, SortOrder, Store};

use crate::env;

/// A user-level failure: invalid path, failed validation, violated
/// limit. Reported on stderr with exit code 1, unlike internal errors.
#[derive(Debug)]
pub struct UserError(pub String);

impl Display for UserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UserError {}

fn user_error<T>(msg: impl Into<String>) -> Result<T> {
    Err(anyhow!(UserError(msg.into())))
}

/// One configuration session over the layered store.
///
/// Edit operations take path components relative to the session's edit
/// level, validate them against the templates, and leave the store
/// unchanged on failure.
pub struct Cstore {
    store: Store,
    registry: TemplateRegistry,
    edit_level: CfgPath,
}

impl Cstore {
    pub fn new(store: Store, registry: TemplateRegistry) -> Self {
        Cstore {
            store,
            registry,
            edit_level: CfgPath::root(),
        }
    }

    /// Builds a session from the environment contract, honoring the
    /// current edit level.
    pub fn from_env() -> Result<Self> {
        let roots = env::Roots::from_env()?;
        let store = Store::new(&roots.active, &roots.changes, &roots.working, &roots.tmp);
        let registry = TemplateRegistry::new(&roots.templates);
        Ok(Cstore {
            store,
            registry,
            edit_level: env::parse_edit_level(),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn set_edit_level(&mut self, level: CfgPath) {
        self.edit_level = level;
    }

    fn full_path<S: AsRef<str>>(&self, comps: &[S]) -> CfgPath {
        let mut p = self.edit_level.clone();
        for c in comps {
            p.push(c.as_ref().to_owned());
        }
        p
    }

    ////// session lifecycle

    pub fn setup_session(&self) -> Result<()> {
        self.store.setup_session()
    }

    pub fn teardown_session(&self) -> Result<()> {
        self.store.teardown_session()
    }

    pub fn in_session(&self) -> bool {
        self.store.in_session()
    }

    pub fn session_changed(&self) -> bool {
        self.store.session_changed()
    }

    pub fn session_unsaved(&self) -> bool {
        self.store.session_unsaved()
    }

    pub fn mark_session_unsaved(&self) -> Result<()> {
        self.store.mark_session_unsaved()
    }

    pub fn unmark_session_unsaved(&self) -> Result<()> {
        self.store.unmark_session_unsaved()
    }

    /// Discards every session change, reporting whether anything was
    /// dropped.
    pub fn discard(&self) -> Result<()> {
        let removed = self.store.discard_changes()?;
        if removed > 0 {
            println!("Changes have been discarded");
        } else {
            println!("No changes have been discarded");
        }
        Ok(())
    }

    ////// set

    /// Validates and applies a `set` of the given path.
    pub fn set<S: AsRef<str>>(&self, comps: &[S]) -> Result<()> {
        let path = self.full_path(comps);
        let resolved = self.validate_set_path(&path)?;
        self.apply_set(&path, resolved)
    }

    /// Checks that the path resolves, that every value along it (tag
    /// values and the final leaf value) validates, and that a value is
    /// present where one is required.
    fn validate_set_path(&self, path: &CfgPath) -> Result<ResolvedTmpl<'_>> {
        let resolved = self.resolve(path)?;
        for depth in 1..=path.len() {
            let prefix: CfgPath = path.components()[..depth].iter().cloned().collect();
            let Some(r) = self.registry.try_resolve(&prefix)? else {
                continue;
            };
            if r.is_value {
                self.check_value(&prefix, r)?;
            }
        }
        if !resolved.is_value {
            if resolved.tmpl.type1.is_some() {
                return user_error("The specified configuration node requires a value");
            }
            // typeless node: the syntax program still runs, with an
            // empty value bound to @
            let ctx = EvalContext::for_validation(
                &self.store,
                &self.registry,
                path.clone(),
                resolved.tmpl,
                "",
            );
            if !validate_value(&ctx)? {
                for msg in ctx.take_messages() {
                    println!("{msg}");
                }
                return user_error("Value validation failed");
            }
        }
        Ok(resolved)
    }

    fn check_value(&self, value_path: &CfgPath, r: ResolvedTmpl<'_>) -> Result<()> {
        let value = value_path.last().expect("value path is never the root");
        let node_path = value_path.parent().expect("value path has a parent");
        let ctx =
            EvalContext::for_validation(&self.store, &self.registry, node_path, r.tmpl, value);
        if !validate_value(&ctx)? {
            for msg in ctx.take_messages() {
                println!("{msg}");
            }
            return user_error("Value validation failed");
        }
        Ok(())
    }

    fn apply_set(&self, path: &CfgPath, resolved: ResolvedTmpl<'_>) -> Result<()> {
        let mut path_existed = true;
        for depth in 1..=path.len() {
            let prefix: CfgPath = path.components()[..depth].iter().cloned().collect();
            if self.path_exists(&prefix, Layer::Working, true) {
                continue;
            }
            path_existed = false;
            let r = self.resolve(&prefix)?;
            if !r.is_value {
                self.store.add_node(&prefix)?;
                self.create_default_children(&prefix)?;
            } else if r.is_tag_value() {
                self.add_tag_value(&prefix, r)?;
            } else {
                self.add_leaf_value(&prefix, r)?;
            }
            self.store.mark_changed_with_ancestors(&prefix)?;
        }

        if resolved.is_value && resolved.tmpl.default_value.is_some() {
            /* explicitly setting a defaulted leaf makes it non-default,
             * even when the value itself is unchanged. the value file is
             * rewritten so the change layer carries it. */
            let node = path.parent().expect("value path has a parent");
            if self.store.marked(&node, Marker::DisplayDefault, Layer::Working) {
                self.store.unmark(&node, Marker::DisplayDefault)?;
                let values = self
                    .store
                    .read_values(&node, Layer::Working)?
                    .unwrap_or_default();
                self.store.write_values(&node, &values)?;
                self.store.mark_changed_with_ancestors(&node)?;
                path_existed = false;
            }
        }
        if path_existed {
            println!("The specified configuration node already exists");
        }
        Ok(())
    }

    fn add_tag_value(&self, path: &CfgPath, r: ResolvedTmpl<'_>) -> Result<()> {
        let value = path.last().expect("tag value path is never the root");
        let parent = path.parent().expect("tag value path has a parent");
        let limit = r.tmpl.tag_limit;
        if limit > 0 {
            let siblings = self.child_names(&parent, Layer::Working, false)?;
            if siblings.len() as u32 >= limit {
                return user_error(format!(
                    "Cannot set node \"{value}\": number of values exceeds limit ({limit} allowed)"
                ));
            }
        }
        self.store.add_node(path)?;
        self.create_default_children(path)
    }

    fn add_leaf_value(&self, path: &CfgPath, r: ResolvedTmpl<'_>) -> Result<()> {
        let value = path.last().expect("leaf value path is never the root").to_owned();
        let node = path.parent().expect("leaf value path has a parent");
        if !self.store.exists(&node, Layer::Working) {
            self.store.add_node(&node)?;
        }
        if r.is_multi() {
            let mut values = self
                .store
                .read_values(&node, Layer::Working)?
                .unwrap_or_default();
            let limit = r.tmpl.multi_limit;
            if limit > 0 && values.len() as u32 >= limit {
                return user_error(format!(
                    "Cannot set value \"{value}\": number of values exceeds limit ({limit} allowed)"
                ));
            }
            values.push(value);
            self.store.write_values(&node, &values)
        } else {
            self.store.write_values(&node, &[value])
        }
    }

    /// Materializes the defaults of a freshly created node's children.
    fn create_default_children(&self, path: &CfgPath) -> Result<()> {
        for name in self.registry.child_names(path)? {
            if name == layout::TAG_DIR {
                continue;
            }
            let child = path.join(name);
            let Some(r) = self.registry.try_resolve(&child)? else {
                continue;
            };
            if let Some(default) = &r.tmpl.default_value {
                self.store.add_node(&child)?;
                self.store.write_values(&child, &[default.clone()])?;
                self.store.mark(&child, Marker::DisplayDefault)?;
            }
        }
        Ok(())
    }

    ////// delete

    /// Validates and applies a `delete` of the given path.
    pub fn delete<S: AsRef<str>>(&self, comps: &[S]) -> Result<()> {
        let path = self.full_path(comps);
        let resolved = self.resolve(&path)?;
        if !self.path_exists(&path, Layer::Working, true) {
            let what = if !resolved.is_value || resolved.is_tag() {
                "node"
            } else {
                "value"
            };
            println!("Nothing to delete (the specified {what} does not exist)");
            return Ok(());
        }

        if let Some(default) = &resolved.tmpl.default_value {
            // a defaulted leaf reverts to its default instead of going away
            let node = if resolved.is_value {
                path.parent().expect("value path has a parent")
            } else {
                path.clone()
            };
            self.store.write_values(&node, &[default.clone()])?;
            self.store.mark(&node, Marker::DisplayDefault)?;
            self.store.unmark(&node, Marker::Deactivated)?;
            return self.store.mark_changed_with_ancestors(&node);
        }

        let removed = if !resolved.is_value {
            self.store.remove_subtree(&path)?;
            Some(path.clone())
        } else if resolved.is_tag() {
            self.store.remove_subtree(&path)?;
            Some(path.clone())
        } else {
            let node = path.parent().expect("value path has a parent");
            let value = path.last().expect("value path is never the root");
            if resolved.is_multi() {
                let values = self
                    .store
                    .read_values(&node, Layer::Working)?
                    .unwrap_or_default();
                let remaining: Vec<String> =
                    values.into_iter().filter(|v| v != value).collect();
                if remaining.is_empty() {
                    self.store.remove_subtree(&node)?;
                    Some(node)
                } else {
                    self.store.write_values(&node, &remaining)?;
                    None
                }
            } else {
                self.store.remove_subtree(&node)?;
                Some(node)
            }
        };
        if let Some(removed) = removed {
            self.remove_emptied_tag_ancestors(&removed)?;
        }
        self.store.mark_changed_with_ancestors(&path)
    }

    /// A removal that empties a tag value dissolves it, and an emptied
    /// tag node with it.
    fn remove_emptied_tag_ancestors(&self, removed: &CfgPath) -> Result<()> {
        let mut cur = removed.parent();
        while let Some(p) = cur {
            if p.is_root() {
                break;
            }
            let Some(r) = self.registry.try_resolve(&p)? else {
                break;
            };
            if !(r.is_tag_value() || r.is_tag_node()) {
                break;
            }
            if !self.child_names(&p, Layer::Working, true)?.is_empty()
                || self.store.is_leaf_value(&p, Layer::Working)
            {
                break;
            }
            self.store.remove_subtree(&p)?;
            cur = p.parent();
        }
        Ok(())
    }

    ////// activate / deactivate

    pub fn activate<S: AsRef<str>>(&self, comps: &[S]) -> Result<()> {
        let path = self.full_path(comps);
        let resolved = self.validate_act_deact(&path, "activate")?;
        if !self.store.marked(&path, Marker::Deactivated, Layer::Working) {
            return user_error(
                "Activate can only be performed on a node on which the deactivate\n\
                 command has been performed.",
            );
        }
        if resolved.is_tag_value() && resolved.tmpl.tag_limit > 0 {
            let parent = path.parent().expect("tag value path has a parent");
            let active_siblings = self.child_names(&parent, Layer::Working, false)?;
            if resolved.tmpl.tag_limit as usize <= active_siblings.len() {
                let value = path.last().unwrap_or_default();
                return user_error(format!(
                    "Cannot activate \"{value}\": number of values exceeds limit ({} allowed)",
                    resolved.tmpl.tag_limit
                ));
            }
        }
        self.store.unmark(&path, Marker::Deactivated)?;
        self.store.mark_changed_with_ancestors(&path)
    }

    pub fn deactivate<S: AsRef<str>>(&self, comps: &[S]) -> Result<()> {
        let path = self.full_path(comps);
        self.validate_act_deact(&path, "deactivate")?;
        if self.store.deactivated(&path, Layer::Working) {
            println!("The specified configuration node is already deactivated");
            return Ok(());
        }
        self.store.mark(&path, Marker::Deactivated)?;
        self.store.unmark_deactivated_descendants(&path)?;
        self.store.mark_changed_with_ancestors(&path)
    }

    fn validate_act_deact(&self, path: &CfgPath, op: &str) -> Result<ResolvedTmpl<'_>> {
        let resolved = self.resolve(path)?;
        if resolved.is_leaf_value() {
            return user_error(format!("Cannot {op} a leaf configuration value"));
        }
        if !self.path_exists(path, Layer::Working, true) {
            return user_error(format!(
                "Nothing to {op} (the specified node does not exist)"
            ));
        }
        Ok(resolved)
    }

    ////// rename / copy / move

    pub fn rename<S: AsRef<str>>(&self, args: &[S]) -> Result<()> {
        let (tag, old, new) = self.validate_rename_copy(args, "rename")?;
        self.store.rename_child(&tag, &old, &new)?;
        self.store.mark_changed_with_ancestors(&tag)
    }

    pub fn copy<S: AsRef<str>>(&self, args: &[S]) -> Result<()> {
        let (tag, old, new) = self.validate_rename_copy(args, "copy")?;
        self.store.copy_child(&tag, &old, &new)?;
        self.store.mark_changed_with_ancestors(&tag)
    }

    /// `move` is `edit <parent>; rename <tag> <old> to <tag> <new>`.
    pub fn move_node<S: AsRef<str>>(&self, args: &[S]) -> Result<()> {
        if args.len() < 4 {
            return user_error("Invalid move command");
        }
        let n = args.len();
        let scoped = Cstore {
            store: self.store.clone(),
            registry: TemplateRegistry::new(self.registry.root()),
            edit_level: self.full_path(&args[..n - 4]),
        };
        let rn_args = [
            args[n - 4].as_ref(),
            args[n - 3].as_ref(),
            args[n - 2].as_ref(),
            args[n - 4].as_ref(),
            args[n - 1].as_ref(),
        ];
        scoped.rename(&rn_args)
    }

    fn validate_rename_copy<S: AsRef<str>>(
        &self,
        args: &[S],
        op: &str,
    ) -> Result<(CfgPath, String, String)> {
        let [tag, old, to, ntag, new] = args else {
            return user_error(format!("Invalid {op} command"));
        };
        let (tag, old, to, ntag, new) = (
            tag.as_ref(),
            old.as_ref(),
            to.as_ref(),
            ntag.as_ref(),
            new.as_ref(),
        );
        if to != "to" {
            return user_error(format!("Invalid {op} command"));
        }
        if tag != ntag {
            return user_error(format!("Cannot {op} from \"{tag}\" to \"{ntag}\""));
        }
        let old_path = self.full_path(&[tag, old]);
        let resolved = self.resolve(&old_path)?;
        if !resolved.is_tag_value() {
            return user_error(format!("Cannot {op} under \"{tag}\""));
        }
        if !self.path_exists(&old_path, Layer::Working, true) {
            return user_error(format!("Configuration \"{tag} {old}\" does not exist"));
        }
        let new_path = self.full_path(&[tag, new]);
        if self.path_exists(&new_path, Layer::Working, true) {
            return user_error(format!("Configuration \"{tag} {new}\" already exists"));
        }
        let new_resolved = self.resolve(&new_path)?;
        self.check_value(&new_path, new_resolved)?;
        Ok((self.full_path(&[tag]), old.to_owned(), new.to_owned()))
    }

    ////// comment

    pub fn comment<S: AsRef<str>>(&self, args: &[S]) -> Result<()> {
        let Some((text, comps)) = args.split_last() else {
            return user_error("Invalid comment command");
        };
        let text = text.as_ref();
        let path = self.full_path(comps);
        let resolved = self.resolve(&path)?;
        if !self.path_exists(&path, Layer::Working, true) {
            return user_error("The specified config node does not exist");
        }
        if resolved.is_leaf_value() {
            return user_error("Cannot comment on config values");
        }
        if resolved.is_tag_node() {
            return user_error("Cannot add comment at this level");
        }
        if text.contains('*') {
            // config files use C-style comments
            return user_error("Cannot use the '*' character in a comment");
        }
        if text.is_empty() {
            self.store.remove_comment(&path).map_err(|_| {
                anyhow!(UserError(
                    "Failed to remove comment for specified config node".to_owned()
                ))
            })?;
        } else {
            self.store.set_comment(&path, text)?;
        }
        /* unlike the original, comment changes mark the session changed
         * so a comment-only edit can be committed */
        self.store.mark_changed_with_ancestors(&path)
    }

    ////// commit

    /// Runs a full commit of the session.
    pub fn commit(&self) -> Result<CommitOutcome> {
        let opts = CommitOpts {
            base_env: self.action_env(),
            forward_errloc: std::env::var_os(env::OUTPUT_ERROR_LOCATION).is_some(),
            log_file: Some(self.store.tmp_root().join("cfg-stdout.log")),
            pre_hook_dir: Some(env::PRE_COMMIT_HOOK_DIR.into()),
            post_hook_dir: Some(env::POST_COMMIT_HOOK_DIR.into()),
        };
        do_commit(&self.store, &self.registry, &opts).map_err(|e| {
            let msg = e.to_string();
            if msg.starts_with("Configuration system temporarily locked") {
                anyhow!(UserError(msg))
            } else {
                e
            }
        })
    }

    fn action_env(&self) -> Vec<(String, String)> {
        let mut envs = vec![
            (env::ACTIVE_ROOT.to_owned(), self.store.active_root().to_string()),
            (env::CHANGES_ROOT.to_owned(), self.store.change_root().to_string()),
            (env::WORKING_ROOT.to_owned(), self.store.work_root().to_string()),
            (env::TMP_ROOT.to_owned(), self.store.tmp_root().to_string()),
            (
                env::TEMPLATE_ROOT.to_owned(),
                self.registry.root().to_string(),
            ),
            (
                env::EDIT_LEVEL.to_owned(),
                env::format_edit_level(&self.edit_level),
            ),
        ];
        if let Some(dir) = self.registry.template_dir(&self.edit_level) {
            envs.push((env::TEMPLATE_LEVEL.to_owned(), dir.to_string()));
        }
        envs
    }

    ////// shared helpers

    fn resolve(&self, path: &CfgPath) -> Result<ResolvedTmpl<'_>> {
        match self.registry.try_resolve(path)? {
            Some(r) => Ok(r),
            None => user_error("The specified configuration node is not valid"),
        }
    }

    /// Whether the path exists as a node or as a value of its parent.
    pub fn path_exists(&self, path: &CfgPath, layer: Layer, include_deactivated: bool) -> bool {
        let found = self.store.exists(path, layer) || self.value_exists(path, layer);
        if !found {
            return false;
        }
        include_deactivated || !self.store.deactivated(path, layer)
    }

    fn value_exists(&self, path: &CfgPath, layer: Layer) -> bool {
        let (Some(parent), Some(value)) = (path.parent(), path.last()) else {
            return false;
        };
        match self.store.read_values(&parent, layer) {
            Ok(Some(values)) => values.iter().any(|v| v == value),
            _ => false,
        }
    }

    /// Child node names, optionally hiding deactivated children, in the
    /// order the parent's template asks for.
    pub fn child_names(
        &self,
        path: &CfgPath,
        layer: Layer,
        include_deactivated: bool,
    ) -> Result<Vec<String>> {
        let order = match self.registry.try_resolve(path)? {
            Some(r) if r.tmpl.version_sorted_children => SortOrder::Version,
            _ => SortOrder::Lexical,
        };
        let mut out = Vec::new();
        for name in self.store.children(path, layer, order)? {
            if !include_deactivated
                && self
                    .store
                    .marked(&path.join(name.clone()), Marker::Deactivated, layer)
            {
                continue;
            }
            out.push(name);
        }
        Ok(out)
    }
}

mod queries;
pub use queries::NodeStatus;
