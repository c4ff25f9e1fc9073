//! Container image references.
//!
//! References are handled as strings almost everywhere, since docker, skopeo and cosign all
//! want strings.  This module only answers the few questions the flows need: does a reference
//! carry a tag or digest (and if not, what is the `:latest` form), what are its parts, and which
//! of an image's repo digests belongs to a given registry.

use std::fmt;

use crate::error::{Error, Result};

pub const DEFAULT_TAG: &str = "latest";

/// Returns `image` with `:latest` appended unless it already has a tag or a digest.
///
/// A tag is present when the last `:` comes after the last `/`, so the port in
/// `localhost:5000/image` is not mistaken for one.  Anything with an `@` is digest-qualified
/// and returned unchanged, as is the empty string.
pub fn normalize_image_ref(image: &str) -> String {
    if image.is_empty() || image.contains('@') {
        return image.to_string();
    }
    let has_tag = match (image.rfind(':'), image.rfind('/')) {
        (Some(colon), Some(slash)) => colon > slash,
        (Some(_), None) => true,
        (None, _) => false,
    };
    if has_tag {
        image.to_string()
    } else {
        format!("{image}:{DEFAULT_TAG}")
    }
}

/// A content digest such as `sha256:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    algorithm: String,
    hex: String,
}

impl Digest {
    /// Parses `<algorithm>:<hex>`, checking the hex length for sha256 and sha512.
    ///
    /// Hex is accepted in either case and stored lower case.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidDigest(s.to_string());
        let (algorithm, hex_part) = s.split_once(':').ok_or_else(invalid)?;
        let len = match algorithm {
            "sha256" => 32,
            "sha512" => 64,
            _ => return Err(invalid()),
        };
        let mut value = vec![0u8; len];
        hex::decode_to_slice(hex_part, &mut value).map_err(|_| invalid())?;
        Ok(Digest {
            algorithm: algorithm.to_string(),
            hex: hex::encode(value),
        })
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// An image reference split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry host (and port), when the first path component looks like one.
    pub registry: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidInput(format!("invalid image reference {s:?}"));

        let (name, digest) = match s.split_once('@') {
            Some((name, digest)) => (name, Some(digest.to_string())),
            None => (s, None),
        };

        let (name, tag) = match (name.rfind(':'), name.rfind('/')) {
            (Some(colon), slash) if slash.is_none_or(|slash| colon > slash) => {
                (&name[..colon], Some(name[colon + 1..].to_string()))
            }
            _ => (name, None),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((host, rest))
                if host.contains('.') || host.contains(':') || host == "localhost" =>
            {
                (Some(host.to_string()), rest)
            }
            _ => (None, name),
        };

        let empty = |part: &Option<String>| part.as_deref().is_some_and(str::is_empty);
        if repository.is_empty()
            || repository.starts_with('/')
            || repository.ends_with('/')
            || empty(&tag)
            || empty(&digest)
        {
            return Err(invalid());
        }

        Ok(ImageReference {
            registry,
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// The reference without its tag or digest.
    pub fn name(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{registry}/{}", self.repository),
            None => self.repository.clone(),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

/// Picks the repo digest to sign from an image's `RepoDigests`.
///
/// The first entry whose repository lives under `registry` wins; otherwise the first entry.
/// docker makes no promises about the order of this list, so "first" is whatever it reported.
pub fn select_repo_digest<'a, S: AsRef<str>>(
    repo_digests: &'a [S],
    registry: &str,
) -> Option<&'a str> {
    let prefix = format!("{}/", registry.trim_end_matches('/'));
    repo_digests
        .iter()
        .map(|d| d.as_ref())
        .find(|d| d.starts_with(&prefix))
        .or_else(|| repo_digests.first().map(|d| d.as_ref()))
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_normalize_examples() {
        assert_eq!(normalize_image_ref("myrepo/image"), "myrepo/image:latest");
        assert_eq!(normalize_image_ref("myrepo/image:v1"), "myrepo/image:v1");
        assert_eq!(
            normalize_image_ref("myrepo/image@sha256:abcd"),
            "myrepo/image@sha256:abcd"
        );
        assert_eq!(
            normalize_image_ref("localhost:5000/image"),
            "localhost:5000/image:latest"
        );
        assert_eq!(
            normalize_image_ref("localhost:5000/image:1.2"),
            "localhost:5000/image:1.2"
        );
        assert_eq!(normalize_image_ref("busybox"), "busybox:latest");
        assert_eq!(normalize_image_ref("busybox:musl"), "busybox:musl");
        assert_eq!(normalize_image_ref(""), "");
    }

    #[test]
    fn test_normalize_idempotent() {
        for image in [
            "myrepo/image",
            "myrepo/image:v1",
            "myrepo/image@sha256:abcd",
            "localhost:5000/image",
            "ghcr.io/org/sub/app",
            "app",
            "",
            ":",
            "/",
            "a/b:",
        ] {
            let once = normalize_image_ref(image);
            assert_eq!(normalize_image_ref(&once), once, "input {image:?}");
        }
    }

    #[test]
    fn test_parse_reference() {
        let r = ImageReference::parse("localhost:5000/team/app:1.0").unwrap();
        assert_eq!(r.registry.as_deref(), Some("localhost:5000"));
        assert_eq!(r.repository, "team/app");
        assert_eq!(r.tag.as_deref(), Some("1.0"));
        assert_eq!(r.digest, None);

        let r = ImageReference::parse("library/busybox").unwrap();
        assert_eq!(r.registry, None);
        assert_eq!(r.repository, "library/busybox");
        assert_eq!(r.tag, None);

        let digest = "sha256:5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a";
        let r = ImageReference::parse(&format!("ghcr.io/org/app:v2@{digest}")).unwrap();
        assert_eq!(r.registry.as_deref(), Some("ghcr.io"));
        assert_eq!(r.repository, "org/app");
        assert_eq!(r.tag.as_deref(), Some("v2"));
        assert_eq!(r.digest.as_deref(), Some(digest));
        assert_eq!(r.to_string(), format!("ghcr.io/org/app:v2@{digest}"));
        assert_eq!(r.name(), "ghcr.io/org/app");

        let r = ImageReference::parse("localhost/app").unwrap();
        assert_eq!(r.registry.as_deref(), Some("localhost"));
    }

    #[test]
    fn test_parse_reference_invalid() {
        for bad in ["", "app:", "app@", "ghcr.io/", "/app", "a//"] {
            assert!(ImageReference::parse(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_digest() {
        let hex = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";
        let d = Digest::parse(&format!("sha256:{}", hex.to_uppercase())).unwrap();
        assert_eq!(d.algorithm(), "sha256");
        assert_eq!(d.hex(), hex);
        assert_eq!(d.to_string(), format!("sha256:{hex}"));

        fn assert_invalid(x: &str) {
            assert!(matches!(Digest::parse(x), Err(Error::InvalidDigest(_))), "{x:?}");
        }
        assert_invalid("");
        assert_invalid("sha256");
        assert_invalid("sha256:abcd");
        assert_invalid(&format!("md5:{hex}"));
        assert_invalid(&format!("sha256:{hex}f"));
        assert_invalid(&format!("sha512:{hex}"));
        assert_invalid(&format!("sha256:{}g", &hex[1..]));
    }

    #[test]
    fn test_select_repo_digest() {
        let digests = [
            "docker.io/library/app@sha256:aaaa",
            "registry.example.com/app@sha256:bbbb",
            "registry.example.com/app@sha256:cccc",
        ];
        assert_eq!(
            select_repo_digest(&digests, "registry.example.com"),
            Some("registry.example.com/app@sha256:bbbb")
        );
        assert_eq!(
            select_repo_digest(&digests, "registry.example.com/"),
            Some("registry.example.com/app@sha256:bbbb")
        );
        // no match: first one wins
        assert_eq!(
            select_repo_digest(&digests, "quay.io"),
            Some("docker.io/library/app@sha256:aaaa")
        );
        // a registry that is only a string prefix of another host doesn't match
        assert_eq!(
            select_repo_digest(&digests, "registry.example"),
            Some("docker.io/library/app@sha256:aaaa")
        );
        assert_eq!(select_repo_digest::<&str>(&[], "quay.io"), None);
    }
}
