mod cli;

use std::env;

use anyhow::Context;
use log::info;

use cli::{Args, Command, USAGE};
use orchestrator::configs::{DatasetConfig, TrainingConfig};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = match Command::parse(env::args().skip(1))? {
        Command::Run(args) => args,
        Command::Help => {
            println!("{USAGE}");
            return Ok(());
        }
    };

    run(args)
}

fn run(args: Args) -> anyhow::Result<()> {
    let training = match &args.config {
        Some(path) => TrainingConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => TrainingConfig::default(),
    };
    let dataset = DatasetConfig::new(args.dataset, args.shard_count)?;

    if let Some(weights) = args.weights {
        let report = orchestrator::evaluate(dataset, training, &weights)
            .with_context(|| format!("failed to evaluate {}", weights.display()))?;

        println!("{}", report.train);
        println!("{}", report.test);
        return Ok(());
    }

    let name = dataset.name.clone();
    let report = orchestrator::train(dataset, training)
        .with_context(|| format!("training on dataset '{name}' failed"))?;
    info!("wrote {} checkpoint(s)", report.checkpoints.len());

    let last = report.last().context("the schedule ran no pass")?;
    println!("{}", last.train);
    println!("{}", last.test);

    Ok(())
}
