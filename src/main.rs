use std::process;

use clap::Parser;

use dae2mesh::{cli::Cli, pipeline::run_batch};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let options = match cli.options() {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{err:#}");
            process::exit(1);
        }
    };

    if let Err(err) = cli.save_effective_settings(&options) {
        eprintln!("{err:#}");
        process::exit(1);
    }

    let summary = run_batch(&cli.files, &options, cli.report);
    log::info!(
        "done: {} converted, {} failed",
        summary.succeeded,
        summary.failed
    );
}
