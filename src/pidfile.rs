/// Process state: a PID file written at startup, removed on clean exit.
use std::fs;
use std::path::{Path, PathBuf};

pub const PID_FILE_NAME: &str = "gateway.pid";

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process id to `path`.
    pub fn write(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::write(&path, std::process::id().to_string())?;
        Ok(PidFile { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            log::warn!("failed to remove pid file {:?}: {}", self.path, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_removes_pid_file() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("tokengate-test-{}.pid", std::process::id()));

        {
            let pid_file = PidFile::write(&path).unwrap();
            let contents = fs::read_to_string(&path).unwrap();
            assert_eq!(contents, std::process::id().to_string());
            drop(pid_file);
        }

        assert!(!path.exists());
    }
}
