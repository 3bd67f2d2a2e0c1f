use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use visimager::{
    ImagerConfig,
    cli::{Cli, Commands},
    input::Simulation,
    precision::Precision,
    run,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match &cli.command {
        Commands::Generate(args) => {
            let params = args.params()?;
            params.print_parameters();
            let simulation = Simulation::new(&params);
            if args.binary {
                let precision = if args.single {
                    Precision::Single
                } else {
                    Precision::Double
                };
                simulation
                    .write_binary(&args.output, args.max_times_per_block, precision)
                    .with_context(|| format!("writing {}", args.output.display()))?;
            } else {
                simulation
                    .write_npy(&args.output)
                    .with_context(|| format!("writing {}", args.output.display()))?;
            }
            info!("Wrote {}", args.output.display());
        }
        Commands::Image(args) => {
            let config = ImagerConfig::from_args(args)?;
            run::run(&config).with_context(|| format!("imaging {}", args.input.display()))?;
        }
    }

    info!("done!");
    Ok(())
}
