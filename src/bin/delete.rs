use clap::Parser;

/// Delete a configuration path from the working configuration.
#[derive(Parser)]
#[command(name = "delete")]
struct Args {
    /// Whitespace-separated configuration path; a trailing value deletes
    /// one value of a multi-valued leaf.
    #[arg(required = true)]
    path: Vec<String>,
}

fn main() {
    let args = Args::parse();
    cfgtree::run_op(|cstore| cstore.delete(&args.path))
}
