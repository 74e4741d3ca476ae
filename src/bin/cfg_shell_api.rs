//! Read-only query multiplexer for shell scripts.
//!
//! Predicates report through the exit status so scripts can use them in
//! conditions; value queries print to stdout, mostly as text the shell
//! can eval.

use anyhow::Result;
use clap::{Parser, Subcommand};

use cfgtree::Cstore;
use cfgtree_store::CfgPath;

#[derive(Parser)]
#[command(name = "cfg-shell-api")]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create the session directories for this session's environment.
    SetupSession,
    /// Remove this session's directories.
    TeardownSession,
    /// Whether a config session is active (exit status).
    InSession,
    /// Whether the session has uncommitted changes (exit status).
    SessionChanged,
    /// Whether the session carries the unsaved marker (exit status).
    SessionUnsaved,
    MarkSessionUnsaved,
    UnmarkSessionUnsaved,

    /// Whether the path exists in the working config (exit status).
    Exists { path: Vec<String> },
    /// Whether the path exists in the active config (exit status).
    ExistsActive { path: Vec<String> },
    /// Deactivate-aware existence in the working config (exit status).
    ExistsDa { path: Vec<String> },
    /// Whether the path is effective during commit (exit status).
    ExistsEffective { path: Vec<String> },

    /// Child node names in the working config.
    ListNodes { path: Vec<String> },
    /// Child node names in the active config.
    ListActiveNodes { path: Vec<String> },
    /// Deactivate-aware child node names in the working config.
    ListNodesDa { path: Vec<String> },
    /// Effective child node names during commit.
    ListEffectiveNodes { path: Vec<String> },

    /// The value of a single-valued leaf in the working config.
    ReturnValue { path: Vec<String> },
    ReturnActiveValue { path: Vec<String> },
    ReturnEffectiveValue { path: Vec<String> },
    /// The values of a multi-valued leaf in the working config.
    ReturnValues { path: Vec<String> },
    ReturnActiveValues { path: Vec<String> },
    ReturnEffectiveValues { path: Vec<String> },

    /// The comment attached to a node.
    ReturnComment { path: Vec<String> },
    /// Whether the leaf still carries its schema default (exit status).
    IsDefault { path: Vec<String> },
    /// Whether the node itself is marked deactivated (exit status).
    IsDeactivated { path: Vec<String> },
    IsChanged { path: Vec<String> },
    IsAdded { path: Vec<String> },
    IsDeleted { path: Vec<String> },
    /// Each child with its session status, as `name=status` lines.
    GetChildNodesStatus { path: Vec<String> },
}

fn quoted_list(names: &[String]) -> String {
    let mut out = String::new();
    for name in names {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push('\'');
        out.push_str(&name.replace('\'', "'\\''"));
        out.push('\'');
    }
    out
}

fn predicate(result: bool) -> ! {
    std::process::exit(if result { 0 } else { 1 })
}

fn run(cstore: &Cstore, cmd: Cmd) -> Result<()> {
    match cmd {
        Cmd::SetupSession => cstore.setup_session()?,
        Cmd::TeardownSession => cstore.teardown_session()?,
        Cmd::InSession => predicate(cstore.in_session()),
        Cmd::SessionChanged => predicate(cstore.session_changed()),
        Cmd::SessionUnsaved => predicate(cstore.session_unsaved()),
        Cmd::MarkSessionUnsaved => cstore.mark_session_unsaved()?,
        Cmd::UnmarkSessionUnsaved => cstore.unmark_session_unsaved()?,

        Cmd::Exists { path } => predicate(cstore.cfg_exists(&p(path), false)),
        Cmd::ExistsActive { path } => predicate(cstore.cfg_exists(&p(path), true)),
        Cmd::ExistsDa { path } => predicate(cstore.cfg_exists_da(&p(path), false, true)),
        Cmd::ExistsEffective { path } => predicate(cstore.effective(&p(path))?),

        Cmd::ListNodes { path } => {
            println!("{}", quoted_list(&cstore.get_child_nodes(&p(path), false)?))
        }
        Cmd::ListActiveNodes { path } => {
            println!("{}", quoted_list(&cstore.get_child_nodes(&p(path), true)?))
        }
        Cmd::ListNodesDa { path } => {
            println!("{}", quoted_list(&cstore.get_child_nodes_da(&p(path), false)?))
        }
        Cmd::ListEffectiveNodes { path } => {
            println!("{}", quoted_list(&cstore.effective_child_nodes(&p(path))?))
        }

        Cmd::ReturnValue { path } => {
            if let Some(v) = cstore.get_value(&p(path), false)? {
                println!("{v}");
            }
        }
        Cmd::ReturnActiveValue { path } => {
            if let Some(v) = cstore.get_value(&p(path), true)? {
                println!("{v}");
            }
        }
        Cmd::ReturnEffectiveValue { path } => {
            if let Some(v) = cstore.effective_value(&p(path))? {
                println!("{v}");
            }
        }
        Cmd::ReturnValues { path } => {
            println!(
                "{}",
                quoted_list(&cstore.get_values(&p(path), false)?.unwrap_or_default())
            )
        }
        Cmd::ReturnActiveValues { path } => {
            println!(
                "{}",
                quoted_list(&cstore.get_values(&p(path), true)?.unwrap_or_default())
            )
        }
        Cmd::ReturnEffectiveValues { path } => {
            println!("{}", quoted_list(&cstore.effective_values(&p(path))?))
        }

        Cmd::ReturnComment { path } => {
            if let Some(c) = cstore.get_comment(&p(path), false)? {
                println!("{c}");
            }
        }
        Cmd::IsDefault { path } => predicate(cstore.is_default(&p(path), false)),
        Cmd::IsDeactivated { path } => predicate(cstore.marked_deactivated(&p(path), false)),
        Cmd::IsChanged { path } => predicate(cstore.changed(&p(path))),
        Cmd::IsAdded { path } => predicate(cstore.added(&p(path))),
        Cmd::IsDeleted { path } => predicate(cstore.deleted(&p(path))),
        Cmd::GetChildNodesStatus { path } => {
            let path = p(path);
            for (name, status) in cstore.child_nodes_status(&path)? {
                println!("{name}={}", status.as_str());
            }
        }
    }
    Ok(())
}

fn p(comps: Vec<String>) -> CfgPath {
    CfgPath::new(comps)
}

fn main() {
    let args = Args::parse();
    let result = Cstore::from_env().map(|mut cstore| {
        // queries always take full paths from the configuration root
        cstore.set_edit_level(CfgPath::root());
        cstore
    });
    let code = match result.and_then(|cstore| run(&cstore, args.cmd)) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{err}");
            cfgtree::exit_code(&err)
        }
    };
    std::process::exit(code)
}
