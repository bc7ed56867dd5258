// src/main.rs

use taskgraph::config::load_and_validate;
use taskgraph::{cli, logging, run};

fn main() {
    if let Err(err) = run_main() {
        eprintln!("taskgraph error: {err:?}");
        std::process::exit(1);
    }
}

fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    let cfg = load_and_validate(&args.config)?;
    logging::init_logging(args.log_level.or(cfg.logging.level))?;
    run(&args, &cfg)
}
