//! Filesystem transport.
//!
//! The source is a path to the first page. A resumption token names the next
//! page as a file in the same directory, which is how harvested dumps are laid
//! out on disk (`page-1.json`, `page-2.json`, ...).

use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::harvest::traits::{SourceError, Transport};

#[derive(Debug, Default, Clone, Copy)]
pub struct FileTransport;

impl FileTransport {
    /// Resolves the file holding the page for `token`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Malformed`] if the token is anything but a plain
    /// file name, so a token cannot point outside the source directory.
    pub fn page_path(source: &Path, token: Option<&str>) -> Result<PathBuf, SourceError> {
        let Some(token) = token else {
            return Ok(source.to_path_buf());
        };

        let relative = Path::new(token);
        let mut components = relative.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => {
                return Err(SourceError::Malformed(format!(
                    "resumption token '{token}' is not a plain file name"
                )));
            }
        }

        let dir = source.parent().unwrap_or_else(|| Path::new(""));
        Ok(dir.join(relative))
    }
}

fn classify_io(path: &Path, err: io::Error) -> SourceError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => {
            SourceError::Transient(format!("{}: {err}", path.display()))
        }
        _ => SourceError::Unreachable {
            location: path.display().to_string(),
            reason: err.to_string(),
        },
    }
}

#[async_trait]
impl Transport for FileTransport {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch(
        &self,
        source: &str,
        resumption_token: Option<&str>,
    ) -> Result<Vec<u8>, SourceError> {
        let path = Self::page_path(Path::new(source), resumption_token)?;
        debug!(path = %path.display(), "Reading page");
        tokio::fs::read(&path)
            .await
            .map_err(|err| classify_io(&path, err))
    }
}
