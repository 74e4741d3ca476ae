//! Evaluation context threaded through validator and resolver.

use std::cell::RefCell;

use cfgtree_schema::{Template, TemplateRegistry, ValueType};
use cfgtree_store::{CfgPath, Store};

use crate::exec::ActionRunner;

/// Everything an action program evaluation needs to know about its
/// surroundings.
///
/// One context is constructed per action invocation; the commit engine
/// owns one for each action it runs, the set-time validator one per
/// validated value.
pub struct EvalContext<'a> {
    pub store: &'a Store,
    pub registry: &'a TemplateRegistry,
    /// Logical path of the node whose action is evaluated (node level,
    /// never a value).
    pub cfg_path: CfgPath,
    /// Template of that node.
    pub tmpl: &'a Template,
    /// The value bound to `@`.
    pub at: String,
    /// Every value under validation. Multi-line values validate each
    /// line; otherwise this is just `[at]`.
    pub at_values: Vec<String>,
    /// Whether a commit is in progress.
    pub in_commit: bool,
    /// Whether the running action is a delete action. Variable
    /// references then resolve against the active view.
    pub in_delete_action: bool,
    /// Exec mode: commit-time action evaluation. `ASSIGN` nodes only
    /// take effect here.
    pub exec_mode: bool,
    runner: ActionRunner,
    messages: RefCell<Vec<String>>,
}

impl<'a> EvalContext<'a> {
    /// A context for set-time validation of `value` at `path`.
    pub fn for_validation(
        store: &'a Store,
        registry: &'a TemplateRegistry,
        cfg_path: CfgPath,
        tmpl: &'a Template,
        value: &str,
    ) -> Self {
        let at_values: Vec<String> = if value.contains('\n') {
            value.lines().map(str::to_owned).collect()
        } else {
            vec![value.to_owned()]
        };
        EvalContext {
            store,
            registry,
            cfg_path,
            tmpl,
            at: value.to_owned(),
            at_values,
            in_commit: false,
            in_delete_action: false,
            exec_mode: false,
            runner: ActionRunner::default(),
            messages: RefCell::new(Vec::new()),
        }
    }

    /// A context for commit-time execution of an action at `path`.
    #[allow(clippy::too_many_arguments)]
    pub fn for_commit(
        store: &'a Store,
        registry: &'a TemplateRegistry,
        cfg_path: CfgPath,
        tmpl: &'a Template,
        at: String,
        in_delete_action: bool,
        runner: ActionRunner,
    ) -> Self {
        EvalContext {
            store,
            registry,
            cfg_path,
            tmpl,
            at_values: vec![at.clone()],
            at,
            in_commit: true,
            in_delete_action,
            exec_mode: true,
            runner,
            messages: RefCell::new(Vec::new()),
        }
    }

    /// The declared type of the node's values, `Txt` for typeless nodes.
    pub fn value_type(&self) -> ValueType {
        self.tmpl.type1.unwrap_or(ValueType::Txt)
    }

    /// Which view variable references read: delete actions see the
    /// active config, everything else the working config.
    pub fn ref_active(&self) -> bool {
        self.in_delete_action
    }

    pub fn runner(&self) -> &ActionRunner {
        &self.runner
    }

    /// Records a user-visible diagnostic produced during evaluation.
    pub fn message(&self, text: impl Into<String>) {
        self.messages.borrow_mut().push(text.into());
    }

    /// Drains the recorded diagnostics.
    pub fn take_messages(&self) -> Vec<String> {
        std::mem::take(&mut self.messages.borrow_mut())
    }
}
