use clap::Parser;

/// Discard all changes in the working configuration.
#[derive(Parser)]
#[command(name = "discard")]
struct Args {}

fn main() {
    let _ = Args::parse();
    cfgtree::run_op(|cstore| cstore.discard())
}
