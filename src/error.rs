//! Error types for the imgsign library.
//!
//! Every fallible library operation returns [`Result<T>`], an alias for
//! `Result<T, Error>`. The binaries wrap these in `anyhow` and turn them into a
//! nonzero exit status.
//!
//! # Error Categories
//!
//! - **Missing dependencies**: [`MissingTool`]
//! - **Invalid input**: [`InvalidInput`], [`InvalidDigest`]
//! - **External command failures**: [`Spawn`], [`CommandFailed`], [`TestsFailed`]
//! - **Unexpected tool output**: [`UnknownLoadedImage`], [`NoRepoDigest`]
//! - **System errors**: [`Io`], [`Json`]
//!
//! [`MissingTool`]: Error::MissingTool
//! [`InvalidInput`]: Error::InvalidInput
//! [`InvalidDigest`]: Error::InvalidDigest
//! [`Spawn`]: Error::Spawn
//! [`CommandFailed`]: Error::CommandFailed
//! [`TestsFailed`]: Error::TestsFailed
//! [`UnknownLoadedImage`]: Error::UnknownLoadedImage
//! [`NoRepoDigest`]: Error::NoRepoDigest
//! [`Io`]: Error::Io
//! [`Json`]: Error::Json

use std::path::PathBuf;

/// Result type alias for operations that may return an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for release pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required external program is not on `PATH`.
    #[error("{tool} is not installed. To install {tool}, visit {hint}")]
    MissingTool {
        /// Program name.
        tool: &'static str,
        /// Where to get it.
        hint: &'static str,
    },

    /// The program could not be started at all.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// The command line that was attempted.
        command: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited unsuccessfully.
    #[error("`{command}` exited with {}: {stderr}", describe_code(.code))]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Captured standard error (or standard output if stderr was empty).
        stderr: String,
    },

    /// container-structure-test reported failing tests.
    #[error("tests failed for image {image} ({})", describe_code(.code))]
    TestsFailed {
        /// The image under test.
        image: String,
        /// Exit code of container-structure-test.
        code: Option<i32>,
    },

    /// A path or argument that cannot be processed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A digest string that is not `<algorithm>:<hex>`.
    #[error("invalid digest {0:?}")]
    InvalidDigest(String),

    /// `docker load` did not say which image it loaded.
    #[error("could not determine the image loaded from {}", .0.display())]
    UnknownLoadedImage(PathBuf),

    /// The image store has no repo digest for a pushed image.
    #[error("image {0} has no repo digest; was it pushed to the registry?")]
    NoRepoDigest(String),

    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error occurred.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "no exit code".to_string(),
    }
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_missing_tool_message() {
        let err = Error::MissingTool {
            tool: "gpg",
            hint: "https://gnupg.org/download/",
        };
        assert_eq!(
            err.to_string(),
            "gpg is not installed. To install gpg, visit https://gnupg.org/download/"
        );
    }

    #[test]
    fn test_command_failed_message() {
        let err = Error::CommandFailed {
            command: "docker push x".into(),
            code: Some(125),
            stderr: "denied".into(),
        };
        assert_eq!(err.to_string(), "`docker push x` exited with code 125: denied");

        let err = Error::CommandFailed {
            command: "docker push x".into(),
            code: None,
            stderr: "".into(),
        };
        assert_eq!(err.to_string(), "`docker push x` exited with no exit code: ");
    }
}
