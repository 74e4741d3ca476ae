use clap::Parser;

/// Set a configuration path in the working configuration.
#[derive(Parser)]
#[command(name = "set")]
struct Args {
    /// Whitespace-separated configuration path, ending in a value where
    /// the node requires one.
    #[arg(required = true)]
    path: Vec<String>,
}

fn main() {
    let args = Args::parse();
    cfgtree::run_op(|cstore| cstore.set(&args.path))
}
