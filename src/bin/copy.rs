use clap::Parser;

/// Copy a tag value's subtree: `copy <tag> <old> to <tag> <new>`.
#[derive(Parser)]
#[command(name = "copy")]
struct Args {
    #[arg(required = true)]
    args: Vec<String>,
}

fn main() {
    let args = Args::parse();
    cfgtree::run_op(|cstore| cstore.copy(&args.args))
}
