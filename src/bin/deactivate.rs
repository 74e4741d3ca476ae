use clap::Parser;

/// Mark a configuration node deactivated: hidden from the running
/// system while remaining in the configuration.
#[derive(Parser)]
#[command(name = "deactivate")]
struct Args {
    #[arg(required = true)]
    path: Vec<String>,
}

fn main() {
    let args = Args::parse();
    cfgtree::run_op(|cstore| cstore.deactivate(&args.path))
}
