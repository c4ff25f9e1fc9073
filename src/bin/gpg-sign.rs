use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::{CommandFactory, Parser};
use log::{error, info};

use imgsign::{
    discover::resolve_inputs,
    gpg::{self, SignOptions},
    init_logging, RunMode, Runner, Tool, Toolbox,
};

/// Create detached GPG signatures for tarballs, or verify them.
///
/// Signatures are written next to each tarball as `<tarball>.asc`.
#[derive(Debug, Parser)]
#[clap(name = "gpg-sign", version)]
struct Args {
    /// Directory to search recursively for tarballs, or a single .tar file
    #[clap(long, default_value = "dist/")]
    directory: PathBuf,
    /// GPG key ID to sign with
    #[clap(long)]
    gpg_key_id: Option<String>,
    /// Passphrase for the signing key
    #[clap(long)]
    passphrase: Option<String>,
    /// Signature file to verify against (defaults to `<tarball>.asc`)
    #[clap(long, requires = "verify")]
    sig_file: Option<PathBuf>,
    /// Verify signatures instead of signing
    #[clap(long)]
    verify: bool,
    /// Overwrite existing signature files
    #[clap(long, conflicts_with = "verify")]
    force: bool,
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
    if tools.require(Tool::Gpg).is_err() {
        return Ok(ExitCode::FAILURE);
    }
    let runner = Runner::new(RunMode::from_dry_run(args.dry_run), tools);

    let tar_files = match resolve_inputs(&args.directory) {
        Ok(tar_files) => tar_files,
        Err(err) => {
            error!("{err}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let report = if args.verify {
        gpg::verify_all(&runner, &tar_files, args.sig_file.as_deref())
    } else {
        let Some(key_id) = args.gpg_key_id else {
            error!("--gpg-key-id is required for signing");
            return Ok(ExitCode::FAILURE);
        };
        info!("Found {} tarball(s) to sign", tar_files.len());
        let opts = SignOptions {
            key_id,
            passphrase: args.passphrase,
            force: args.force,
        };
        gpg::sign_all(&runner, &tar_files, &opts)
    };

    report.log_summary("tarballs");
    Ok(report.exit_code())
}
