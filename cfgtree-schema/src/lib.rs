//! Template (schema) model for the configuration tree.
//!
//! Every logical path maps to a [`Template`] describing what may live
//! there: the value type(s), tag/multi markers, default value, limits,
//! documentation strings, and the action programs run during validation
//! and commit. Templates live on disk under a template root, one
//! directory per path component with the schema in a `node.def` file and
//! a generic tag child in a `node.tag` directory; [`TemplateRegistry`]
//! walks and caches them.

use std::fmt::Display;

mod cache;
mod registry;
pub mod text;
pub mod types;

pub use self::{
    cache::TemplateCache,
    registry::{ResolvedTmpl, TemplateRegistry},
    text::{parse_expression, parse_node_def, ParseError},
    types::validate_type,
};

/// Primitive value types a leaf may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    U32,
    Ipv4,
    Ipv4Net,
    Ipv6,
    Ipv6Net,
    Mac,
    Domain,
    Txt,
    Bool,
    Priority,
}

impl ValueType {
    /// The name used in `node.def` files and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::U32 => "u32",
            ValueType::Ipv4 => "ipv4",
            ValueType::Ipv4Net => "ipv4net",
            ValueType::Ipv6 => "ipv6",
            ValueType::Ipv6Net => "ipv6net",
            ValueType::Mac => "macaddr",
            ValueType::Domain => "domain",
            ValueType::Txt => "txt",
            ValueType::Bool => "bool",
            ValueType::Priority => "priority",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "u32" => ValueType::U32,
            "ipv4" => ValueType::Ipv4,
            "ipv4net" => ValueType::Ipv4Net,
            "ipv6" => ValueType::Ipv6,
            "ipv6net" => ValueType::Ipv6Net,
            "macaddr" => ValueType::Mac,
            "domain" => ValueType::Domain,
            "txt" => ValueType::Txt,
            "bool" => ValueType::Bool,
            "priority" => ValueType::Priority,
            _ => return None,
        })
    }

    /// Detects the most specific type a literal satisfies. Used to type
    /// literals in template expressions.
    pub fn detect(literal: &str) -> ValueType {
        for t in [
            ValueType::U32,
            ValueType::Ipv4,
            ValueType::Ipv4Net,
            ValueType::Ipv6,
            ValueType::Ipv6Net,
            ValueType::Mac,
            ValueType::Bool,
        ] {
            if types::validate_type(t, literal) {
                return t;
            }
        }
        ValueType::Txt
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Comparison operators of `COND` syntax nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Set membership over the right operand's multiset; short-circuits
    /// on the first match.
    In,
}

impl Display for CondOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CondOp::Eq => "==",
            CondOp::Ne => "!=",
            CondOp::Lt => "<",
            CondOp::Le => "<=",
            CondOp::Gt => ">",
            CondOp::Ge => ">=",
            CondOp::In => "in",
        })
    }
}

/// The action slots a template may populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Validation program, run at set time and again at commit time.
    Syntax,
    /// Validation program run only at commit time.
    Commit,
    Begin,
    Create,
    Activate,
    Update,
    Delete,
    End,
}

/// A literal value (or value list) in an expression, typed by detection.
#[derive(Debug, Clone, PartialEq)]
pub struct ValLiteral {
    pub values: Vec<String>,
    pub vtype: ValueType,
}

impl ValLiteral {
    pub fn single(value: impl Into<String>) -> Self {
        let value = value.into();
        let vtype = ValueType::detect(&value);
        ValLiteral {
            values: vec![value],
            vtype,
        }
    }
}

/// One node of an action program's syntax tree.
///
/// The operator is a tagged sum dispatched with a single `match` by the
/// evaluator; there is no behavior attached here.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionNode {
    /// Sequence; all elements must succeed.
    List(Vec<ActionNode>),
    Or(Box<ActionNode>, Box<ActionNode>),
    And(Box<ActionNode>, Box<ActionNode>),
    Not(Box<ActionNode>),
    /// Comparison of two value-producing operands.
    Cond {
        op: CondOp,
        left: Box<ActionNode>,
        right: Box<ActionNode>,
    },
    /// Extended-regex match of the operand's value(s).
    Pattern {
        operand: Box<ActionNode>,
        pattern: String,
    },
    /// External shell command; non-zero exit is failure. `@` and
    /// `$VAR(...)` references in the command are substituted before
    /// execution.
    Exec { command: String },
    /// Attaches an error message to the left subtree's failure.
    Help {
        inner: Box<ActionNode>,
        message: String,
    },
    /// Writes a resolved value back through the variable resolver. Only
    /// evaluated in exec mode during commit.
    Assign {
        reference: String,
        value: Box<ActionNode>,
    },
    /// Literal value(s).
    Val(ValLiteral),
    /// A `$VAR(...)` reference.
    Var(String),
}

/// The action programs attached to a template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Actions {
    pub syntax: Option<ActionNode>,
    pub commit: Option<ActionNode>,
    pub begin: Option<ActionNode>,
    pub create: Option<ActionNode>,
    pub activate: Option<ActionNode>,
    pub update: Option<ActionNode>,
    pub delete: Option<ActionNode>,
    pub end: Option<ActionNode>,
}

impl Actions {
    pub fn get(&self, kind: ActionKind) -> Option<&ActionNode> {
        match kind {
            ActionKind::Syntax => self.syntax.as_ref(),
            ActionKind::Commit => self.commit.as_ref(),
            ActionKind::Begin => self.begin.as_ref(),
            ActionKind::Create => self.create.as_ref(),
            ActionKind::Activate => self.activate.as_ref(),
            ActionKind::Update => self.update.as_ref(),
            ActionKind::Delete => self.delete.as_ref(),
            ActionKind::End => self.end.as_ref(),
        }
    }

    fn slot(&mut self, kind: ActionKind) -> &mut Option<ActionNode> {
        match kind {
            ActionKind::Syntax => &mut self.syntax,
            ActionKind::Commit => &mut self.commit,
            ActionKind::Begin => &mut self.begin,
            ActionKind::Create => &mut self.create,
            ActionKind::Activate => &mut self.activate,
            ActionKind::Update => &mut self.update,
            ActionKind::Delete => &mut self.delete,
            ActionKind::End => &mut self.end,
        }
    }

    /// Appends a program to a slot, forming a `List` when the slot is
    /// already populated (templates may repeat expression fields).
    pub fn append(&mut self, kind: ActionKind, node: ActionNode) {
        let slot = self.slot(kind);
        *slot = Some(match slot.take() {
            None => node,
            Some(ActionNode::List(mut list)) => {
                list.push(node);
                ActionNode::List(list)
            }
            Some(prev) => ActionNode::List(vec![prev, node]),
        });
    }
}

/// Schema node for a logical path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    /// First value type; `None` means the node is typeless (interior).
    pub type1: Option<ValueType>,
    /// Optional second accepted type.
    pub type2: Option<ValueType>,
    /// Children are keyed by user-supplied tag values.
    pub is_tag: bool,
    /// Leaf holds an ordered multiset of values.
    pub is_multi: bool,
    pub default_value: Option<String>,
    /// Smaller runs earlier during commit; `None` is lowest priority.
    pub priority: Option<u32>,
    pub help: Option<String>,
    pub value_help: Option<String>,
    pub type_help: Option<String>,
    /// Expression producing completion candidates (external collaborator).
    pub enumeration: Option<String>,
    /// Command producing allowed values (external collaborator).
    pub allowed: Option<String>,
    /// Maximum number of tag values; 0 is unbounded.
    pub tag_limit: u32,
    /// Maximum number of leaf values; 0 is unbounded.
    pub multi_limit: u32,
    /// Children are listed in Debian version order.
    pub version_sorted_children: bool,
    pub actions: Actions,
}

impl Template {
    pub fn is_typeless(&self) -> bool {
        self.type1.is_none()
    }

    pub fn num_types(&self) -> usize {
        match (self.type1, self.type2) {
            (None, _) => 0,
            (Some(_), None) => 1,
            (Some(_), Some(_)) => 2,
        }
    }

    pub fn action(&self, kind: ActionKind) -> Option<&ActionNode> {
        self.actions.get(kind)
    }

    /// The actions to run for `kind` during commit, with `create` falling
    /// back to `update` when no create program exists.
    pub fn action_or_fallback(&self, kind: ActionKind) -> Option<&ActionNode> {
        match self.actions.get(kind) {
            None if kind == ActionKind::Create => self.actions.get(ActionKind::Update),
            other => other,
        }
    }

    /// Whether the node opens its own begin/end block during commit.
    pub fn is_begin_end_node(&self) -> bool {
        self.actions.begin.is_some() || self.actions.end.is_some()
    }
}
