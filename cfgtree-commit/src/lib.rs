//! Diffing and committing of the candidate configuration.
//!
//! [`CfgNode`] snapshots the active and working views, [`CommitTree`]
//! diffs them into a four-state commit tree, and [`do_commit`] splits
//! the tree into priority subtrees, executes their actions in order and
//! publishes the new active configuration.

mod algorithm;
mod diff;
mod hooks;
mod lock;
mod node;

pub use self::{
    algorithm::{do_commit, CommitOpts, CommitOutcome, CommitStatus},
    diff::{diff_multi_values, CommitNode, CommitState, CommitTree, NodeId},
    hooks::{run_hook_dir, CommitHook},
    lock::CommitLock,
    node::CfgNode,
};

#[cfg(test)]
mod tests;
