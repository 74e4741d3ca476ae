//! Evaluation of template action programs against the configuration.
//!
//! This crate hosts the value validator, the `$VAR(path)` reference
//! resolver used inside templates, the `@`-substitution expander for
//! external commands, and the runner that supervises those commands.
//!
//! All evaluation state that the original design kept in process-global
//! singletons (the `@` string, commit and delete-action flags, the
//! current config path) lives in an explicit [`EvalContext`] constructed
//! per evaluation and passed through.

mod context;
mod exec;
mod expand;
mod syntax;
mod validate;
mod varref;

pub use self::{
    context::EvalContext,
    exec::ActionRunner,
    expand::expand_command,
    syntax::execute,
    validate::validate_value,
    varref::VarRef,
};
