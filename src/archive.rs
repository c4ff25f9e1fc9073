//! Classification of image tarballs.
//!
//! A tarball handed to the pipeline is one of three things, told apart purely by the names of its
//! members (nothing is extracted):
//!
//!  - an OCI archive, which carries both `index.json` and `oci-layout`
//!  - a Docker archive, as written by `docker save`, which carries `manifest.json`
//!  - a plain root filesystem tarball, which carries neither
//!
//! gzip, bzip2 and zstd compressed tarballs are decompressed on the fly while listing.

use std::{
    collections::HashMap,
    fmt,
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
    str::FromStr,
};

use log::{debug, warn};
use oci_spec::image::ImageIndex;
use serde::Deserialize;

use crate::error::{Error, Result};

pub const OCI_INDEX: &str = "index.json";
pub const OCI_LAYOUT: &str = "oci-layout";
pub const DOCKER_MANIFEST: &str = "manifest.json";

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";

// Annotations docker and the OCI image layout use to name the manifests in an index
const ANNOTATION_CONTAINERD_NAME: &str = "io.containerd.image.name";
const ANNOTATION_REF_NAME: &str = "org.opencontainers.image.ref.name";

/// What kind of image tarball a file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    OciArchive,
    DockerArchive,
    Rootfs,
}

impl ArchiveKind {
    /// The skopeo/containers-image transport name for this kind of archive.
    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveKind::OciArchive => "oci-archive",
            ArchiveKind::DockerArchive => "docker-archive",
            ArchiveKind::Rootfs => "rootfs",
        }
    }

    /// True for the kinds that carry image metadata and can be addressed as a transport.
    pub fn is_image_archive(self) -> bool {
        !matches!(self, ArchiveKind::Rootfs)
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "oci-archive" => Ok(ArchiveKind::OciArchive),
            "docker-archive" => Ok(ArchiveKind::DockerArchive),
            "rootfs" => Ok(ArchiveKind::Rootfs),
            other => Err(Error::InvalidInput(format!("unknown archive type {other:?}"))),
        }
    }
}

/// The source transport a user asked for on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Transport {
    /// Detect the archive type from the tarball's contents
    #[default]
    Auto,
    /// A `docker save` archive
    DockerArchive,
    /// An OCI image layout archive
    OciArchive,
    /// A plain root filesystem tarball
    Rootfs,
}

impl Transport {
    /// The declared archive kind, classifying `tar_path` when the transport is `auto`.
    pub fn resolve(self, tar_path: &Path) -> ArchiveKind {
        match self {
            Transport::Auto => classify(tar_path),
            Transport::DockerArchive => ArchiveKind::DockerArchive,
            Transport::OciArchive => ArchiveKind::OciArchive,
            Transport::Rootfs => ArchiveKind::Rootfs,
        }
    }
}

fn normalize_member_name(name: &str) -> &str {
    let name = name.strip_prefix("./").unwrap_or(name);
    name.strip_suffix('/').unwrap_or(name)
}

/// Classifies an archive from the names of its members.
pub fn classify_names<I, S>(names: I) -> ArchiveKind
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let (mut index, mut layout, mut manifest) = (false, false, false);
    for name in names {
        match normalize_member_name(name.as_ref()) {
            OCI_INDEX => index = true,
            OCI_LAYOUT => layout = true,
            DOCKER_MANIFEST => manifest = true,
            _ => {}
        }
    }

    if index && layout {
        ArchiveKind::OciArchive
    } else if manifest {
        ArchiveKind::DockerArchive
    } else {
        ArchiveKind::Rootfs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
    Bzip2,
    Zstd,
}

fn sniff_compression(head: &[u8]) -> Compression {
    if head.starts_with(&ZSTD_MAGIC) {
        Compression::Zstd
    } else if head.starts_with(&GZIP_MAGIC) {
        Compression::Gzip
    } else if head.starts_with(BZIP2_MAGIC) && head.get(3).is_some_and(u8::is_ascii_digit) {
        // "BZh" followed by the block size digit
        Compression::Bzip2
    } else {
        Compression::None
    }
}

/// Opens `path` as a tar stream, transparently decompressing gzip, bzip2 and zstd.
fn open_tar(path: &Path) -> Result<tar::Archive<Box<dyn Read>>> {
    let mut reader = BufReader::new(File::open(path)?);
    let compression = sniff_compression(reader.fill_buf()?);
    if compression != Compression::None {
        debug!("{} is {compression:?}-compressed", path.display());
    }
    let reader: Box<dyn Read> = match compression {
        Compression::Zstd => Box::new(zstd::stream::read::Decoder::with_buffer(reader)?),
        Compression::Gzip => Box::new(flate2::bufread::GzDecoder::new(reader)),
        Compression::Bzip2 => Box::new(bzip2::bufread::BzDecoder::new(reader)),
        Compression::None => Box::new(reader),
    };
    Ok(tar::Archive::new(reader))
}

/// Lists the member names of the tarball at `path`, reading headers only.
pub fn list_entries(path: &Path) -> Result<Vec<String>> {
    let mut archive = open_tar(path)?;
    let mut names = vec![];
    for entry in archive.entries()? {
        let entry = entry?;
        names.push(entry.path()?.to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Classifies the tarball at `path`.
///
/// This never fails: a file that can't be read as a tar stream is treated as a rootfs tarball,
/// and the reason is logged at debug level.
pub fn classify(path: &Path) -> ArchiveKind {
    match list_entries(path) {
        Ok(names) => classify_names(&names),
        Err(err) => {
            debug!("Failed to inspect {} for archive type: {err}", path.display());
            ArchiveKind::Rootfs
        }
    }
}

/// Checks that `path` is a readable, non-empty tar archive.
pub fn is_valid_tar(path: &Path) -> bool {
    match list_entries(path) {
        Ok(names) if !names.is_empty() => true,
        Ok(_) => {
            warn!("Tar archive has no entries: {}", path.display());
            false
        }
        Err(err) => {
            warn!("File is not a valid tar archive: {} ({err})", path.display());
            false
        }
    }
}

/// Reads the contents of the first member called `name`.
fn read_member(path: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let mut archive = open_tar(path)?;
    for entry in archive.entries()? {
        let mut entry = entry?;
        if normalize_member_name(&entry.path()?.to_string_lossy()) == name {
            let mut content = vec![];
            entry.read_to_end(&mut content)?;
            return Ok(Some(content));
        }
    }
    Ok(None)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DockerManifestEntry {
    #[serde(default)]
    repo_tags: Option<Vec<String>>,
}

fn ref_names(annotations: &Option<HashMap<String, String>>) -> Option<&String> {
    let annotations = annotations.as_ref()?;
    annotations
        .get(ANNOTATION_CONTAINERD_NAME)
        .or_else(|| annotations.get(ANNOTATION_REF_NAME))
}

/// Returns the image names recorded inside an image archive.
///
/// For a Docker archive these are the `RepoTags` of `manifest.json`; for an OCI archive, the
/// name annotations on the manifests listed in `index.json`.  Rootfs tarballs have none.
pub fn embedded_image_names(path: &Path, kind: ArchiveKind) -> Result<Vec<String>> {
    match kind {
        ArchiveKind::DockerArchive => {
            let Some(raw) = read_member(path, DOCKER_MANIFEST)? else {
                return Ok(vec![]);
            };
            let entries: Vec<DockerManifestEntry> = serde_json::from_slice(&raw)?;
            Ok(entries
                .into_iter()
                .flat_map(|e| e.repo_tags.unwrap_or_default())
                .collect())
        }
        ArchiveKind::OciArchive => {
            let Some(raw) = read_member(path, OCI_INDEX)? else {
                return Ok(vec![]);
            };
            let index = ImageIndex::from_reader(raw.as_slice())
                .map_err(|e| Error::InvalidInput(format!("{}: {e}", path.display())))?;
            Ok(index
                .manifests()
                .iter()
                .filter_map(|m| ref_names(m.annotations()).cloned())
                .collect())
        }
        ArchiveKind::Rootfs => Ok(vec![]),
    }
}
