use anyhow::Result;
use clap::Parser;

use cfgtree::Cstore;
use cfgtree_commit::CommitStatus;

/// Commit the working configuration: run per-node actions in priority
/// order and publish the new active configuration.
#[derive(Parser)]
#[command(name = "commit")]
struct Args {}

fn run() -> Result<i32> {
    let cstore = Cstore::from_env()?;
    if !cstore.in_session() {
        eprintln!("Not in a configuration session");
        return Ok(1);
    }
    if !cstore.session_changed() {
        println!("No configuration changes to commit");
        return Ok(0);
    }
    let outcome = cstore.commit()?;
    Ok(match outcome.status {
        CommitStatus::Success => 0,
        _ => 1,
    })
}

fn main() {
    let _ = Args::parse();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err}");
            cfgtree::exit_code(&err)
        }
    };
    std::process::exit(code)
}
