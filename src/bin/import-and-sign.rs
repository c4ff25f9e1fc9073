use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{error, info};

use imgsign::{
    gpg,
    import::{self, ImportOptions, SigningDecision, CI_ENV_VAR},
    init_logging, Outcome, RunMode, Runner, Tool, Toolbox, Transport,
};

/// Import an image tarball into a registry and sign it with GPG.
///
/// OCI and Docker archives are copied with skopeo; plain rootfs tarballs are imported with
/// docker.  Signing is skipped on GitHub Actions unless --sign-in-ci is given.
#[derive(Debug, Parser)]
#[clap(name = "import-and-sign", version)]
struct Args {
    /// Path to the image tarball (*.tar)
    #[clap(long)]
    tar_file: PathBuf,
    /// Destination image name (e.g. repo/name:tag)
    #[clap(long)]
    image_name: String,
    /// Source tar transport type
    #[clap(long, value_enum, default_value_t)]
    transport: Transport,
    /// GPG key ID for signing; signing is skipped without one
    #[clap(long)]
    gpg_key_id: Option<String>,
    /// GPG key passphrase
    #[clap(long)]
    passphrase: Option<String>,
    /// Don't pass --insecure-policy to skopeo
    #[clap(long)]
    secure_policy: bool,
    /// Sign even when running on GitHub Actions
    #[clap(long)]
    sign_in_ci: bool,
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

    let in_ci = import::in_ci(std::env::var(CI_ENV_VAR).ok().as_deref());
    let decision = import::signing_decision(args.gpg_key_id.is_some(), in_ci, args.sign_in_ci);

    let kind = args.transport.resolve(&args.tar_file);
    let mut needed = vec![import::import_tool(kind)];
    if decision == SigningDecision::Sign {
        needed.push(Tool::Gpg);
    }
    let mut tools = Toolbox::new();
    if tools.require_all(&needed).is_err() {
        return Ok(ExitCode::FAILURE);
    }

    let runner = Runner::new(RunMode::from_dry_run(args.dry_run), tools);

    let opts = ImportOptions {
        image_name: args.image_name,
        insecure_policy: !args.secure_policy,
    };
    if let Err(err) = import::import_image(&runner, &args.tar_file, kind, &opts) {
        error!("Failed to import {}: {err}", args.tar_file.display());
        return Ok(ExitCode::FAILURE);
    }

    let key_id = match (decision, args.gpg_key_id) {
        (SigningDecision::Sign, Some(key_id)) => key_id,
        (SigningDecision::SkipInCi, _) => {
            info!("Detected GitHub Actions; skipping GPG signing in CI.");
            return Ok(ExitCode::SUCCESS);
        }
        _ => {
            info!("No --gpg-key-id provided; skipping GPG signing.");
            return Ok(ExitCode::SUCCESS);
        }
    };

    let sign_opts = gpg::SignOptions {
        key_id,
        passphrase: args.passphrase,
        force: true,
    };
    let outcome = gpg::sign_tarball(&runner, &args.tar_file, &sign_opts)
        .with_context(|| format!("Signing {}", args.tar_file.display()))?;
    Ok(match outcome {
        Outcome::Failed => ExitCode::FAILURE,
        Outcome::Completed | Outcome::Skipped => ExitCode::SUCCESS,
    })
}
