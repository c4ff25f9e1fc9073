//! Signing image tarballs with cosign.
//!
//! With a registry, a tarball is loaded into the local docker image store, tagged as
//! `<registry>/<name>:latest`, pushed, and the resulting repo digest is what gets signed.  Without
//! one, the archive is signed in place through its transport reference (`oci-archive:<path>` or
//! `docker-archive:<path>`), so it never has to be loaded or run.  Rootfs tarballs carry no image
//! metadata and can only be signed after being pushed.

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

use log::{debug, error, info, warn};

use crate::{
    archive::{embedded_image_names, ArchiveKind, Transport},
    batch::{Outcome, Report},
    command::Runner,
    error::{Error, Result},
    reference::{select_repo_digest, Digest, ImageReference, DEFAULT_TAG},
    tools::Tool,
};

const LOADED_IMAGE: &str = "Loaded image:";
const LOADED_IMAGE_ID: &str = "Loaded image ID:";

/// Options for signing.
#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    /// Private key (path or KMS URI); keyless signing when absent.
    pub key: Option<String>,
    /// Registry to push to before signing.
    pub registry: Option<String>,
    pub transport: Transport,
}

/// Options for verification.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Public key; keyless verification when absent.
    pub key: Option<String>,
    /// Expected signer identity for keyless verification.
    pub certificate_identity: Option<String>,
    /// Expected OIDC issuer for keyless verification.
    pub certificate_oidc_issuer: Option<String>,
}

/// The image name derived from a tarball: its file stem.
pub fn image_name(tar_file: &Path) -> Result<String> {
    tar_file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "can't derive an image name from {}",
                tar_file.display()
            ))
        })
}

/// The tag a tarball is pushed under: `<registry>/<stem>:latest`.
pub fn registry_tag(registry: &str, tar_file: &Path) -> Result<String> {
    Ok(format!(
        "{}/{}:{DEFAULT_TAG}",
        registry.trim_end_matches('/'),
        image_name(tar_file)?
    ))
}

/// The transport reference cosign can sign an archive through, if it has one.
pub fn archive_reference(tar_file: &Path, kind: ArchiveKind) -> Option<String> {
    kind.is_image_archive()
        .then(|| format!("{kind}:{}", tar_file.display()))
}

/// Finds the image name in `docker load` output, preferring a name over a bare image ID.
fn parse_loaded_image(stdout: &str) -> Option<String> {
    let find = |prefix: &str| {
        stdout
            .lines()
            .find_map(|line| line.trim().strip_prefix(prefix))
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    };
    find(LOADED_IMAGE).or_else(|| find(LOADED_IMAGE_ID))
}

/// Loads or imports `tar_file` into the docker image store as `tag`.
fn load_image(runner: &Runner, tar_file: &Path, kind: ArchiveKind, tag: &str) -> Result<()> {
    if kind == ArchiveKind::Rootfs {
        info!("Importing filesystem tarball: {} as {tag}", tar_file.display());
        runner.run_checked(
            Tool::Docker,
            [OsStr::new("import"), tar_file.as_os_str(), OsStr::new(tag)],
        )?;
        return Ok(());
    }

    info!("Loading {kind}: {}", tar_file.display());
    let output = runner.run_checked(
        Tool::Docker,
        [OsStr::new("load"), OsStr::new("-i"), tar_file.as_os_str()],
    )?;

    let loaded = parse_loaded_image(&output.stdout).or_else(|| {
        embedded_image_names(tar_file, kind)
            .inspect_err(|err| {
                debug!("Failed to read image names from {}: {err}", tar_file.display())
            })
            .ok()
            .and_then(|names| names.into_iter().next())
    });
    let loaded = match loaded {
        Some(loaded) => loaded,
        None if !output.executed => "<loaded image>".to_string(),
        None => return Err(Error::UnknownLoadedImage(tar_file.to_path_buf())),
    };

    info!("Tagging image: {loaded} as: {tag}");
    runner.run_checked(Tool::Docker, ["tag", loaded.as_str(), tag])?;
    Ok(())
}

/// Looks up the repo digest of a pushed `image`, preferring one under `registry`.
pub fn resolve_repo_digest(runner: &Runner, image: &str, registry: &str) -> Result<String> {
    info!("Getting digest for image: {image}");
    let output = runner.run_checked(
        Tool::Docker,
        ["inspect", "--format", "{{json .RepoDigests}}", image],
    )?;

    if !output.executed {
        let name = ImageReference::parse(image)
            .map(|r| r.name())
            .unwrap_or_else(|_| image.to_string());
        return Ok(format!("{name}@<digest>"));
    }

    let digests: Option<Vec<String>> = serde_json::from_str(&output.stdout)?;
    let digests = digests.unwrap_or_default();
    let selected = select_repo_digest(digests.as_slice(), registry)
        .ok_or_else(|| Error::NoRepoDigest(image.into()))?;

    let Some((_, digest)) = selected.split_once('@') else {
        return Err(Error::InvalidDigest(selected.to_string()));
    };
    Digest::parse(digest)?;
    Ok(selected.to_string())
}

/// Loads, tags and pushes `tar_file` to `registry`, returning the pushed `repo@digest`.
pub fn publish(
    runner: &Runner,
    tar_file: &Path,
    kind: ArchiveKind,
    registry: &str,
) -> Result<String> {
    let tag = registry_tag(registry, tar_file)?;
    load_image(runner, tar_file, kind, &tag)?;

    info!("Pushing image: {tag}");
    runner.run_checked(Tool::Docker, ["push", tag.as_str()])?;

    resolve_repo_digest(runner, &tag, registry)
}

fn key_args(key: Option<&str>) -> Vec<&str> {
    match key {
        Some(key) => vec!["--key", key],
        None => vec![],
    }
}

/// Signs `reference` with cosign.
pub fn sign_reference(runner: &Runner, reference: &str, key: Option<&str>) -> Result<()> {
    info!("Signing image: {reference}");
    if key.is_none() {
        warn!("No --key given; using keyless signing, which needs an OIDC identity.");
    }

    let mut args = vec!["sign", "--yes"];
    args.extend(key_args(key));
    args.push(reference);
    runner.run_checked(Tool::Cosign, args)?;

    if !runner.is_dry_run() {
        info!("Successfully signed image: {reference}");
    }
    Ok(())
}

/// Signs one tarball, pushing it first if a registry was given.
pub fn sign_tarball(runner: &Runner, tar_file: &Path, opts: &SignOptions) -> Result<Outcome> {
    let kind = opts.transport.resolve(tar_file);
    debug!("{} is a {kind}", tar_file.display());

    let reference = match &opts.registry {
        Some(registry) => publish(runner, tar_file, kind, registry)?,
        None => match archive_reference(tar_file, kind) {
            Some(reference) => reference,
            None => {
                warn!(
                    "{} is a rootfs tarball; it can only be signed after pushing (use --registry)",
                    tar_file.display()
                );
                return Ok(Outcome::Skipped);
            }
        },
    };

    sign_reference(runner, &reference, opts.key.as_deref())?;
    Ok(Outcome::Completed)
}

/// Verifies the signature on `reference`.
pub fn verify_reference(
    runner: &Runner,
    reference: &str,
    opts: &VerifyOptions,
) -> Result<Outcome> {
    info!("Verifying signature of: {reference}");

    let mut args = vec!["verify"];
    args.extend(key_args(opts.key.as_deref()));
    if let Some(identity) = &opts.certificate_identity {
        args.extend(["--certificate-identity", identity.as_str()]);
    }
    if let Some(issuer) = &opts.certificate_oidc_issuer {
        args.extend(["--certificate-oidc-issuer", issuer.as_str()]);
    }
    args.push(reference);

    let output = runner.run(Tool::Cosign, args)?;
    if output.success() {
        if output.executed {
            debug!("cosign verify output: {}", output.stdout);
            info!("Verification successful: {reference}");
        }
        Ok(Outcome::Completed)
    } else {
        error!("Verification failed: {reference}: {}", output.diagnostic());
        Ok(Outcome::Failed)
    }
}

/// The reference a tarball would have been signed under.
fn signed_reference(tar_file: &Path, opts: &SignOptions) -> Result<Option<String>> {
    match &opts.registry {
        Some(registry) => registry_tag(registry, tar_file).map(Some),
        None => Ok(archive_reference(tar_file, opts.transport.resolve(tar_file))),
    }
}

/// Signs each tarball in turn.
pub fn sign_all(runner: &Runner, tar_files: &[PathBuf], opts: &SignOptions) -> Report {
    let mut report = Report::default();
    for tar_file in tar_files {
        report.record(tar_file, sign_tarball(runner, tar_file, opts));
    }
    report
}

/// Verifies each tarball's signature, looking it up the way [`sign_all`] would have created it.
pub fn verify_all(
    runner: &Runner,
    tar_files: &[PathBuf],
    sign_opts: &SignOptions,
    opts: &VerifyOptions,
) -> Report {
    let mut report = Report::default();
    for tar_file in tar_files {
        let result = match signed_reference(tar_file, sign_opts) {
            Ok(Some(reference)) => verify_reference(runner, &reference, opts),
            Ok(None) => {
                warn!(
                    "{} is a rootfs tarball with no registry reference; skipping",
                    tar_file.display()
                );
                Ok(Outcome::Skipped)
            }
            Err(err) => Err(err),
        };
        report.record(tar_file, result);
    }
    report
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_image_name() {
        assert_eq!(image_name(Path::new("dist/web-app.tar")).unwrap(), "web-app");
        assert_eq!(image_name(Path::new("dist/app.v2.tar")).unwrap(), "app.v2");
        assert!(image_name(Path::new("/")).is_err());
    }

    #[test]
    fn test_registry_tag() {
        assert_eq!(
            registry_tag("registry.example.com/", Path::new("dist/app.tar")).unwrap(),
            "registry.example.com/app:latest"
        );
        assert_eq!(
            registry_tag("localhost:5000/team", Path::new("app.tar")).unwrap(),
            "localhost:5000/team/app:latest"
        );
    }

    #[test]
    fn test_archive_reference() {
        let tar = Path::new("/srv/dist/app.tar");
        assert_eq!(
            archive_reference(tar, ArchiveKind::OciArchive).as_deref(),
            Some("oci-archive:/srv/dist/app.tar")
        );
        assert_eq!(
            archive_reference(tar, ArchiveKind::DockerArchive).as_deref(),
            Some("docker-archive:/srv/dist/app.tar")
        );
        assert_eq!(archive_reference(tar, ArchiveKind::Rootfs), None);
    }

    #[test]
    fn test_parse_loaded_image() {
        assert_eq!(
            parse_loaded_image("Loaded image: app:1.0\n").as_deref(),
            Some("app:1.0")
        );
        assert_eq!(
            parse_loaded_image("Loaded image ID: sha256:abcd\nLoaded image: app:1.0").as_deref(),
            Some("app:1.0")
        );
        assert_eq!(
            parse_loaded_image("Loaded image ID: sha256:abcd").as_deref(),
            Some("sha256:abcd")
        );
        assert_eq!(parse_loaded_image(""), None);
        assert_eq!(parse_loaded_image("Loaded image: "), None);
    }

    #[test]
    fn test_dry_run_publish_uses_placeholder_digest() {
        let runner = Runner::new(crate::RunMode::DryRun, crate::Toolbox::new());
        let reference = publish(
            &runner,
            Path::new("/nonexistent/app.tar"),
            ArchiveKind::Rootfs,
            "registry.example.com",
        )
        .unwrap();
        assert_eq!(reference, "registry.example.com/app@<digest>");
    }
}
