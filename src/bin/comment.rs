use clap::Parser;

/// Attach a comment to a configuration node; an empty comment removes
/// the existing one.
#[derive(Parser)]
#[command(name = "comment")]
struct Args {
    /// The configuration path followed by the comment text.
    #[arg(required = true)]
    args: Vec<String>,
}

fn main() {
    let args = Args::parse();
    cfgtree::run_op(|cstore| cstore.comment(&args.args))
}
