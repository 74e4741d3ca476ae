//! cfgtree: the configuration backend of a network appliance.
//!
//! A hierarchical, typed, transactional configuration tree that shells
//! edit and system daemons read. Every shell session gets an isolated
//! candidate configuration (the working layer) over the running one (the
//! active layer); template nodes drive path and value validation; and a
//! priority-ordered commit engine diffs, validates, executes per-node
//! actions and atomically publishes the new running config.
//!
//! This crate is the session facade and command-line surface over the
//! member crates:
//!
//! * [`cfgtree_store`] - the layered on-disk store,
//! * [`cfgtree_schema`] - template model, parser and registry,
//! * [`cfgtree_eval`] - validator, variable resolver and action runner,
//! * [`cfgtree_commit`] - diff and commit engines.

pub mod env;

mod cstore;

pub use cstore::{Cstore, NodeStatus, UserError};

use anyhow::Result;

/// Exit codes of the command-line entry points: 0 on success, 1 on user
/// error, 255 on internal error.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if err.is::<UserError>() {
        1
    } else {
        255
    }
}

/// Shared entry-point wrapper: runs `f` over an environment-built
/// session, reporting errors on stderr with the documented exit codes.
pub fn run_op<F>(f: F) -> !
where
    F: FnOnce(&Cstore) -> Result<()>,
{
    init_tracing();
    let code = match Cstore::from_env().and_then(|cstore| f(&cstore)) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{err}");
            exit_code(&err)
        }
    };
    std::process::exit(code)
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("CFGTREE_LOG"))
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}
