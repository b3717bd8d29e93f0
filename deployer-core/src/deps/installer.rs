//! Fetching portable tool copies.

use super::{ArchiveKind, ToolRequirement};
use crate::error::{DeployerError, Result};
use flate2::read::GzDecoder;
use log::debug;
use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

/// Places a runnable copy of a tool at a destination path.
///
/// The resolver marks the result executable and verifies it runs; installers
/// only need to put the bytes in place.
pub trait Installer {
    fn install(&self, req: &ToolRequirement, dest: &Path) -> Result<()>;
}

/// Downloads tools from the URL in their [`ToolSource`](super::ToolSource).
#[derive(Debug, Default)]
pub struct HttpInstaller;

impl Installer for HttpInstaller {
    fn install(&self, req: &ToolRequirement, dest: &Path) -> Result<()> {
        let source = req.source().ok_or_else(|| DeployerError::InstallFailed {
            tool: req.name().to_string(),
            reason: "no download source configured".to_string(),
        })?;

        let url = source.url();
        debug!("Downloading {} from {}", req.name(), url);
        let bytes = reqwest::blocking::Client::new()
            .get(&url)
            .send()?
            .error_for_status()?
            .bytes()?;

        match source.archive() {
            ArchiveKind::Raw => fs::write(dest, &bytes)?,
            ArchiveKind::TarGz => {
                let member = source.member().unwrap_or(req.binary());
                extract_member(&bytes, member, dest).map_err(|e| {
                    DeployerError::InstallFailed {
                        tool: req.name().to_string(),
                        reason: format!("cannot extract '{member}' from {url}: {e}"),
                    }
                })?;
            }
        }
        Ok(())
    }
}

/// Extracts one file of a `.tar.gz` archive to `dest`.
fn extract_member(data: &[u8], member: &str, dest: &Path) -> io::Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(Cursor::new(data)));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        if path == Path::new(member) || path.strip_prefix("./").ok() == Some(Path::new(member)) {
            entry.unpack(dest)?;
            return Ok(());
        }
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("'{member}' not present in archive"),
    ))
}
