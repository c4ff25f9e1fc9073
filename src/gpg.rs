//! Detached GPG signatures for tarballs.
//!
//! Signatures are ASCII-armored and written next to the tarball as `<tarball>.asc`.  An
//! existing signature is never replaced unless the caller forces it.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use log::{error, info, warn};

use crate::{
    archive::is_valid_tar,
    batch::{Outcome, Report},
    command::Runner,
    error::Result,
    tools::Tool,
};

/// Suffix appended to a tarball's file name to get its signature file.
pub const SIGNATURE_SUFFIX: &str = "asc";

/// The conventional signature path for `tar_file`: `app.tar` → `app.tar.asc`.
pub fn signature_path(tar_file: &Path) -> PathBuf {
    let mut name = tar_file.as_os_str().to_owned();
    name.push(".");
    name.push(SIGNATURE_SUFFIX);
    PathBuf::from(name)
}

/// How to sign.
#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    /// Key to sign with (`--local-user`).
    pub key_id: String,
    /// Passphrase for the key; enables non-interactive loopback pinentry.
    pub passphrase: Option<String>,
    /// Replace existing signature files.
    pub force: bool,
}

fn sign_args(tar_file: &Path, signature: &Path, opts: &SignOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![];
    if let Some(passphrase) = &opts.passphrase {
        args.extend(
            ["--batch", "--pinentry-mode", "loopback", "--passphrase"]
                .into_iter()
                .map(OsString::from),
        );
        args.push(passphrase.into());
    }
    // whether to overwrite was decided before gpg runs
    args.push("--yes".into());
    args.extend(
        ["--detach-sign", "--armor", "--local-user"]
            .into_iter()
            .map(OsString::from),
    );
    args.push(opts.key_id.as_str().into());
    args.push("--output".into());
    args.push(signature.into());
    args.push(tar_file.into());
    args
}

/// Writes a detached signature for `tar_file`, or skips it if one already exists.
pub fn sign_tarball(runner: &Runner, tar_file: &Path, opts: &SignOptions) -> Result<Outcome> {
    let signature = signature_path(tar_file);
    info!(
        "Signing tarball: {} -> Signature: {}",
        tar_file.display(),
        signature.display()
    );

    if signature.exists() && !opts.force {
        warn!(
            "Signature file {} already exists; skipping {} (use --force to overwrite)",
            signature.display(),
            tar_file.display()
        );
        return Ok(Outcome::Skipped);
    }

    runner.run_checked(Tool::Gpg, sign_args(tar_file, &signature, opts))?;

    if !runner.is_dry_run() {
        info!("Successfully signed tarball: {}", tar_file.display());
        info!("Signature saved to: {}", signature.display());
    }
    Ok(Outcome::Completed)
}

/// Checks `signature` against `tar_file`.
///
/// A missing signature file is a skip, not a failure.
pub fn verify_tarball(runner: &Runner, tar_file: &Path, signature: &Path) -> Result<Outcome> {
    if !signature.exists() {
        warn!(
            "Signature file not found: {}. Skipping verification.",
            signature.display()
        );
        return Ok(Outcome::Skipped);
    }

    info!(
        "Verifying tarball: {} against signature: {}",
        tar_file.display(),
        signature.display()
    );

    let output = runner.run(
        Tool::Gpg,
        [
            OsString::from("--verify"),
            signature.into(),
            tar_file.into(),
        ],
    )?;

    if output.success() {
        if output.executed {
            info!("Verification successful: {}", tar_file.display());
        }
        Ok(Outcome::Completed)
    } else {
        error!("Verification failed: {}", tar_file.display());
        Ok(Outcome::Failed)
    }
}

/// Signs every valid tarball in `tar_files`.
pub fn sign_all(runner: &Runner, tar_files: &[PathBuf], opts: &SignOptions) -> Report {
    let mut report = Report::default();
    for tar_file in tar_files {
        if !is_valid_tar(tar_file) {
            warn!("Skipping invalid tar file: {}", tar_file.display());
            report.record(tar_file, Ok(Outcome::Skipped));
            continue;
        }
        report.record(tar_file, sign_tarball(runner, tar_file, opts));
    }
    report
}

/// Verifies every valid tarball in `tar_files` against `signature`, or against each tarball's
/// conventional signature file when `signature` is `None`.
pub fn verify_all(runner: &Runner, tar_files: &[PathBuf], signature: Option<&Path>) -> Report {
    let mut report = Report::default();
    for tar_file in tar_files {
        if !is_valid_tar(tar_file) {
            warn!("Skipping invalid tar file: {}", tar_file.display());
            report.record(tar_file, Ok(Outcome::Skipped));
            continue;
        }
        let signature = match signature {
            Some(path) => path.to_path_buf(),
            None => signature_path(tar_file),
        };
        report.record(tar_file, verify_tarball(runner, tar_file, &signature));
    }
    report
}
