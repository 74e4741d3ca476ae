use clap::Parser;

/// Clear the deactivated mark from a configuration node.
#[derive(Parser)]
#[command(name = "activate")]
struct Args {
    #[arg(required = true)]
    path: Vec<String>,
}

fn main() {
    let args = Args::parse();
    cfgtree::run_op(|cstore| cstore.activate(&args.path))
}
