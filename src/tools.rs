//! Lookup of the external programs the flows shell out to.

use std::{
    collections::HashMap,
    ffi::OsStr,
    path::{Path, PathBuf},
};

use log::{debug, error};

use crate::error::{Error, Result};

/// An external program used by one of the flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Cosign,
    Gpg,
    Skopeo,
    Docker,
    ContainerStructureTest,
}

impl Tool {
    /// The program name looked up on `PATH`.
    pub fn name(self) -> &'static str {
        match self {
            Tool::Cosign => "cosign",
            Tool::Gpg => "gpg",
            Tool::Skopeo => "skopeo",
            Tool::Docker => "docker",
            Tool::ContainerStructureTest => "container-structure-test",
        }
    }

    /// Where to find installation instructions.
    pub fn install_hint(self) -> &'static str {
        match self {
            Tool::Cosign => "https://docs.sigstore.dev/cosign/installation/",
            Tool::Gpg => "https://gnupg.org/download/",
            Tool::Skopeo => "https://github.com/containers/skopeo",
            Tool::Docker => "https://docs.docker.com/get-docker/",
            Tool::ContainerStructureTest => {
                "https://github.com/GoogleContainerTools/container-structure-test"
            }
        }
    }

    /// Environment variable that overrides the program path, e.g. `IMGSIGN_CONTAINER_STRUCTURE_TEST`.
    pub fn override_var(self) -> String {
        format!("IMGSIGN_{}", self.name().to_uppercase().replace('-', "_"))
    }

    fn missing(self) -> Error {
        Error::MissingTool {
            tool: self.name(),
            hint: self.install_hint(),
        }
    }
}

/// Resolves a tool to an executable path, honouring its override variable first.
pub fn locate(tool: Tool) -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(tool.override_var()) {
        let path = PathBuf::from(path);
        debug!("Using {} from ${}: {}", tool.name(), tool.override_var(), path.display());
        return if path.is_file() {
            Ok(path)
        } else {
            Err(tool.missing())
        };
    }
    which::which(tool.name()).map_err(|_| tool.missing())
}

/// The set of resolved tool paths for one run.
///
/// Tools that were never resolved are invoked by bare name and left to the
/// operating system's own `PATH` search.
#[derive(Debug, Clone, Default)]
pub struct Toolbox {
    paths: HashMap<Tool, PathBuf>,
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure `tool` is installed, logging an installation hint if it isn't.
    pub fn require(&mut self, tool: Tool) -> Result<()> {
        if self.paths.contains_key(&tool) {
            return Ok(());
        }
        match locate(tool) {
            Ok(path) => {
                debug!("Found {} at {}", tool.name(), path.display());
                self.paths.insert(tool, path);
                Ok(())
            }
            Err(err) => {
                error!("{err}");
                Err(err)
            }
        }
    }

    pub fn require_all(&mut self, tools: &[Tool]) -> Result<()> {
        tools.iter().try_for_each(|tool| self.require(*tool))
    }

    /// Pins `tool` to an explicit program path.
    pub fn with_program(mut self, tool: Tool, path: impl AsRef<Path>) -> Self {
        self.paths.insert(tool, path.as_ref().to_path_buf());
        self
    }

    /// The program to execute for `tool`.
    pub fn program(&self, tool: Tool) -> &OsStr {
        match self.paths.get(&tool) {
            Some(path) => path.as_os_str(),
            None => OsStr::new(tool.name()),
        }
    }
}
