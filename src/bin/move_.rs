use clap::Parser;

/// Move a tag value: `move <path...> <tag> <old> to <new>`, equivalent
/// to editing the parent and renaming.
#[derive(Parser)]
#[command(name = "move")]
struct Args {
    #[arg(required = true)]
    args: Vec<String>,
}

fn main() {
    let args = Args::parse();
    cfgtree::run_op(|cstore| cstore.move_node(&args.args))
}
