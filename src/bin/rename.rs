use clap::Parser;

/// Rename a tag value: `rename <tag> <old> to <tag> <new>`.
#[derive(Parser)]
#[command(name = "rename")]
struct Args {
    #[arg(required = true)]
    args: Vec<String>,
}

fn main() {
    let args = Args::parse();
    cfgtree::run_op(|cstore| cstore.rename(&args.args))
}
