//! Importing image tarballs into a registry, optionally followed by a GPG signature.
//!
//! OCI and Docker archives are copied with `skopeo copy <transport>:<tar> docker://<image>`;
//! plain rootfs tarballs, which skopeo can't read, go through `docker import`.

use std::{ffi::OsString, path::Path};

use log::info;

use crate::{
    archive::{is_valid_tar, ArchiveKind},
    command::Runner,
    error::{Error, Result},
    tools::Tool,
};

/// Environment variable set to `true` on GitHub Actions runners.
pub const CI_ENV_VAR: &str = "GITHUB_ACTIONS";

/// What to import and where.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Destination image name, e.g. `registry.example.com/app:1.0`.
    pub image_name: String,
    /// Pass `--insecure-policy` to skopeo.
    pub insecure_policy: bool,
}

/// The tool that imports an archive of the given kind.
pub fn import_tool(kind: ArchiveKind) -> Tool {
    if kind.is_image_archive() {
        Tool::Skopeo
    } else {
        Tool::Docker
    }
}

fn import_args(tar_file: &Path, kind: ArchiveKind, opts: &ImportOptions) -> Vec<OsString> {
    if kind.is_image_archive() {
        let mut src = OsString::from(format!("{kind}:"));
        src.push(tar_file);
        let mut args = vec![OsString::from("copy")];
        if opts.insecure_policy {
            args.push("--insecure-policy".into());
        }
        args.push(src);
        args.push(format!("docker://{}", opts.image_name).into());
        args
    } else {
        vec![
            "import".into(),
            tar_file.into(),
            opts.image_name.as_str().into(),
        ]
    }
}

/// Imports `tar_file` as `opts.image_name` using the tool appropriate for `kind`.
pub fn import_image(
    runner: &Runner,
    tar_file: &Path,
    kind: ArchiveKind,
    opts: &ImportOptions,
) -> Result<()> {
    if !tar_file.exists() {
        return Err(Error::InvalidInput(format!(
            "Tar file not found: {}",
            tar_file.display()
        )));
    }
    if !is_valid_tar(tar_file) {
        return Err(Error::InvalidInput(format!(
            "Invalid tar file: {}",
            tar_file.display()
        )));
    }

    let tool = import_tool(kind);
    runner.run_checked(tool, import_args(tar_file, kind, opts))?;

    if !runner.is_dry_run() {
        let via = match tool {
            Tool::Skopeo => format!("skopeo ({kind})"),
            _ => "docker import (rootfs)".to_string(),
        };
        info!(
            "Imported image {} from {} via {via}",
            opts.image_name,
            tar_file.display()
        );
    }
    Ok(())
}

/// Whether the import flow should go on to sign the tarball.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningDecision {
    Sign,
    /// Running in CI, where signing keys aren't available.
    SkipInCi,
    /// No key was given.
    SkipNoKey,
}

/// True when the CI indicator variable holds `true`.
pub fn in_ci(value: Option<&str>) -> bool {
    value == Some("true")
}

pub fn signing_decision(has_key: bool, in_ci: bool, sign_in_ci: bool) -> SigningDecision {
    if in_ci && !sign_in_ci {
        SigningDecision::SkipInCi
    } else if !has_key {
        SigningDecision::SkipNoKey
    } else {
        SigningDecision::Sign
    }
}
