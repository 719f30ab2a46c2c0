use std::{num::NonZeroUsize, path::PathBuf};

use anyhow::{Context, bail};

pub const USAGE: &str = "\
usage: disparity -d <dataset> -n <shards> [-w <weights>] [-c <config.json>]

  -d, --dataset <name>       dataset name, files are read as {name}.{split}.{component}[.{index}].npz
  -n, --num_dataset <count>  amount of training shards, at least 1
  -w, --weights <path>       evaluate these pretrained weights instead of training
  -c, --config <path>        JSON training config, every field optional
  -h, --help                 print this message";

#[derive(Debug, PartialEq, Eq)]
pub struct Args {
    pub dataset: String,
    pub shard_count: NonZeroUsize,
    pub weights: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// What the command line asked for.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Run(Args),
    Help,
}

impl Command {
    /// Parses the arguments that follow the program name.
    pub fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let mut dataset = None;
        let mut shard_count = None;
        let mut weights = None;
        let mut config = None;

        while let Some(flag) = args.next() {
            let mut value = || {
                args.next()
                    .with_context(|| format!("{flag} expects a value"))
            };

            match flag.as_str() {
                "-d" | "--dataset" => dataset = Some(value()?),
                "-n" | "--num_dataset" => {
                    let raw = value()?;
                    let count = raw
                        .parse::<NonZeroUsize>()
                        .with_context(|| format!("invalid shard count '{raw}'"))?;
                    shard_count = Some(count);
                }
                "-w" | "--weights" => weights = Some(PathBuf::from(value()?)),
                "-c" | "--config" => config = Some(PathBuf::from(value()?)),
                "-h" | "--help" => return Ok(Self::Help),
                other => bail!("unknown argument '{other}'\n\n{USAGE}"),
            }
        }

        let (Some(dataset), Some(shard_count)) = (dataset, shard_count) else {
            bail!("both a dataset and a shard count are required\n\n{USAGE}");
        };

        Ok(Self::Run(Args {
            dataset,
            shard_count,
            weights,
            config,
        }))
    }
}
