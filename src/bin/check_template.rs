//! Internal helper: validates a template path and prints the parsed
//! template as `key=value` lines for the shell to eval.

use anyhow::Result;
use clap::Parser;

use cfgtree::Cstore;
use cfgtree_store::CfgPath;

#[derive(Parser)]
#[command(name = "check-template")]
struct Args {
    #[arg(required = true)]
    path: Vec<String>,
}

fn run(cstore: &Cstore, path: CfgPath) -> Result<bool> {
    let Some(resolved) = cstore.registry().try_resolve(&path)? else {
        eprintln!("The specified configuration node is not valid");
        return Ok(false);
    };
    let t = resolved.tmpl;
    if resolved.is_value {
        println!("is_value=1");
    }
    if let Some(t1) = t.type1 {
        println!("type={t1}");
    }
    if let Some(t2) = t.type2 {
        println!("type2={t2}");
    }
    if let Some(help) = &t.help {
        println!("help={help}");
    }
    if t.is_multi {
        println!("multi=1");
        if t.multi_limit > 0 {
            println!("limit={}", t.multi_limit);
        }
    } else if t.is_tag {
        println!("tag=1");
        if t.tag_limit > 0 {
            println!("limit={}", t.tag_limit);
        }
    } else if let Some(default) = &t.default_value {
        println!("default={default}");
    }
    if let Some(p) = t.priority {
        println!("priority={p}");
    }
    if let Some(e) = &t.enumeration {
        println!("enum={e}");
    }
    if let Some(a) = &t.allowed {
        println!("allowed={a}");
    }
    if let Some(v) = &t.value_help {
        println!("val_help={v}");
    }
    Ok(true)
}

fn main() {
    let args = Args::parse();
    let code = match Cstore::from_env().and_then(|cstore| run(&cstore, CfgPath::new(args.path))) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            eprintln!("{err}");
            cfgtree::exit_code(&err)
        }
    };
    std::process::exit(code)
}
