use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::{CommandFactory, Parser};
use log::error;

use imgsign::{
    init_logging,
    structure_test::{self, TestOptions},
    RunMode, Runner, Tool, Toolbox,
};

/// Run container-structure-test against a local image.
#[derive(Debug, Parser)]
#[clap(name = "structure-test", version)]
struct Args {
    /// Image to test; `:latest` is assumed when no tag or digest is given
    #[clap(long)]
    image: String,
    /// container-structure-test config (.yaml or .yml)
    #[clap(long)]
    config: PathBuf,
    /// Don't check that the image exists locally first
    #[clap(long)]
    skip_preflight: bool,
    /// Log the commands that would run without executing them
    #[clap(long)]
    dry_run: bool,
}

fn main() -> Result<ExitCode> {
    if std::env::args_os().len() <= 1 {
        Args::command().print_help()?;
        return Ok(ExitCode::SUCCESS);
    }
    let args = Args::parse();
    init_logging();

    let mut tools = Toolbox::new();
    let mut needed = vec![Tool::ContainerStructureTest];
    if !args.skip_preflight {
        needed.push(Tool::Docker);
    }
    if tools.require_all(&needed).is_err() {
        return Ok(ExitCode::FAILURE);
    }

    let runner = Runner::new(RunMode::from_dry_run(args.dry_run), tools);

    let opts = TestOptions {
        image: &args.image,
        config: &args.config,
        preflight: !args.skip_preflight,
    };
    match structure_test::run(&runner, &opts) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            error!("{err}");
            Ok(ExitCode::FAILURE)
        }
    }
}
