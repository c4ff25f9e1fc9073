use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Result;
use clap::{CommandFactory, Parser};
use log::{error, info};

use imgsign::{
    cosign::{self, SignOptions, VerifyOptions},
    discover::resolve_inputs_allow_missing,
    init_logging, Report, RunMode, Runner, Tool, Toolbox, Transport,
};

/// Sign image tarballs with cosign, or verify their signatures.
///
/// With --registry, each tarball is loaded into docker, pushed, and its repo digest signed.
/// Without it, docker and OCI archives are signed in place through their transport reference.
#[derive(Debug, Parser)]
#[clap(name = "cosign-sign", version)]
struct Args {
    /// Directory to search for tarballs, or a single .tar file
    #[clap(long, default_value = "dist/")]
    directory: PathBuf,
    /// Private key for signing (public key when verifying); keyless if omitted
    #[clap(long)]
    key: Option<String>,
    /// Registry to push images to before signing
    #[clap(long)]
    registry: Option<String>,
    /// How to read the tarballs
    #[clap(long, value_enum, default_value_t)]
    transport: Transport,
    /// Verify existing signatures instead of signing
    #[clap(long)]
    verify: bool,
    /// Image reference to verify instead of the references derived from the tarballs
    #[clap(long, requires = "verify")]
    reference: Option<String>,
    /// Expected signer identity for keyless verification
    #[clap(long, requires = "verify")]
    certificate_identity: Option<String>,
    /// Expected OIDC issuer for keyless verification
    #[clap(long, requires = "verify")]
    certificate_oidc_issuer: Option<String>,
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
    let mut needed = vec![Tool::Cosign];
    if args.registry.is_some() && !args.verify {
        needed.push(Tool::Docker);
    }
    if tools.require_all(&needed).is_err() {
        return Ok(ExitCode::FAILURE);
    }

    let runner = Runner::new(RunMode::from_dry_run(args.dry_run), tools);

    let tar_files = || match resolve_inputs_allow_missing(&args.directory) {
        Ok(tar_files) => Some(tar_files),
        Err(err) => {
            error!("{err}");
            None
        }
    };

    let sign_opts = SignOptions {
        key: args.key.clone(),
        registry: args.registry.clone(),
        transport: args.transport,
    };

    let report = if args.verify {
        let verify_opts = VerifyOptions {
            key: args.key,
            certificate_identity: args.certificate_identity,
            certificate_oidc_issuer: args.certificate_oidc_issuer,
        };
        match &args.reference {
            Some(reference) => {
                let mut report = Report::default();
                report.record(
                    Path::new(reference),
                    cosign::verify_reference(&runner, reference, &verify_opts),
                );
                report
            }
            None => {
                let Some(tar_files) = tar_files() else {
                    return Ok(ExitCode::FAILURE);
                };
                cosign::verify_all(&runner, &tar_files, &sign_opts, &verify_opts)
            }
        }
    } else {
        let Some(tar_files) = tar_files() else {
            return Ok(ExitCode::FAILURE);
        };
        info!("Found {} tarball(s) to sign", tar_files.len());
        cosign::sign_all(&runner, &tar_files, &sign_opts)
    };

    report.log_summary(if args.verify { "signatures" } else { "tarballs" });
    Ok(report.exit_code())
}
