//! Release pipeline tooling for container image tarballs.
//!
//! This crate drives external tools (`docker`, `skopeo`, `cosign`, `gpg` and
//! `container-structure-test`) to sign, verify, import and test image tarballs.
//! The decisions it makes on its own are small: what kind of archive a tarball
//! is, whether an image reference needs a default tag, and which repo digest to
//! sign after a push.
//!
//! Key functionality includes:
//! - Classifying tarballs as OCI archives, Docker archives or plain rootfs tarballs
//! - Normalizing and parsing image references
//! - Running external commands with captured output and an optional dry-run mode
//! - The cosign, GPG, import and structure-test flows behind the binaries in `src/bin/`

pub mod archive;
pub mod batch;
pub mod command;
pub mod cosign;
pub mod discover;
pub mod error;
pub mod gpg;
pub mod import;
pub mod reference;
pub mod tools;

pub use archive::{ArchiveKind, Transport};
pub use batch::{Outcome, Report};
pub use command::{CommandOutput, RunMode, Runner};
pub use error::{Error, Result};
pub use reference::normalize_image_ref;
pub use tools::{Tool, Toolbox};

/// Sets up `env_logger` for the binaries, logging at `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
