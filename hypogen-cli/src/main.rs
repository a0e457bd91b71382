use clap::Parser;
use tracing::info;

use hypogen_cli::{commands, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hypogen=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match &cli.command {
        Command::Generate(args) => {
            let path = commands::generate(config, args).await?;
            info!(path = %path.display(), "Final hypotheses written");
            println!("{}", path.display());
        }
        Command::Infer(args) => {
            let results = commands::infer(config, args).await?;
            for result in &results {
                println!(
                    "seed {}: accuracy {:.4}, f1 {:.4}",
                    result.seed, result.metrics.accuracy, result.metrics.macro_f1
                );
            }
            if let Some(mean) = commands::average(&results) {
                println!(
                    "mean over {} seeds: accuracy {:.4}, f1 {:.4}",
                    results.len(),
                    mean.accuracy,
                    mean.macro_f1
                );
            }
        }
    }

    Ok(())
}
