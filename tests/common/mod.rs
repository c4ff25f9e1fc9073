#![allow(dead_code)]

use std::{
    fs::{self, File},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use tempfile::TempDir;

use imgsign::{RunMode, Runner, Tool, Toolbox};

/// A scratch directory with shell scripts standing in for the external tools.
///
/// Every fake appends `<name> <args...>` to a shared call log before running its body.
pub struct FakeTools {
    pub dir: TempDir,
    toolbox: Toolbox,
}

impl FakeTools {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            toolbox: Toolbox::new(),
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.path().join("calls.log")
    }

    /// Where the fake for `tool` lives.
    pub fn program(&self, tool: Tool) -> PathBuf {
        self.dir.path().join("bin").join(tool.name())
    }

    /// Installs a fake for `tool` that runs `body` after logging its arguments.
    pub fn fake(mut self, tool: Tool, body: &str) -> Self {
        let path = self.program(tool);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let script = format!(
            "#!/bin/sh\necho \"{} $*\" >> '{}'\n{body}\n",
            tool.name(),
            self.log_path().display()
        );
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        self.toolbox = self.toolbox.with_program(tool, &path);
        self
    }

    pub fn runner(&self, mode: RunMode) -> Runner {
        Runner::new(mode, self.toolbox.clone())
    }

    /// The logged calls, one per line.
    pub fn calls(&self) -> Vec<String> {
        match fs::read_to_string(self.log_path()) {
            Ok(log) => log.lines().map(str::to_string).collect(),
            Err(_) => vec![],
        }
    }
}

pub fn write_tar(dir: &Path, name: &str, members: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(name);
    let mut builder = tar::Builder::new(File::create(&path).unwrap());
    for (member, content) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, member, *content).unwrap();
    }
    builder.finish().unwrap();
    path
}

pub fn rootfs_tar(dir: &Path, name: &str) -> PathBuf {
    write_tar(dir, name, &[("etc/hostname", b"box\n")])
}

pub fn docker_tar(dir: &Path, name: &str) -> PathBuf {
    write_tar(
        dir,
        name,
        &[(
            "manifest.json",
            br#"[{"Config":"config.json","RepoTags":["app:1.0"],"Layers":[]}]"#,
        )],
    )
}

pub fn oci_tar(dir: &Path, name: &str) -> PathBuf {
    write_tar(
        dir,
        name,
        &[
            ("oci-layout", br#"{"imageLayoutVersion":"1.0.0"}"#),
            ("index.json", br#"{"schemaVersion":2,"manifests":[]}"#),
        ],
    )
}
