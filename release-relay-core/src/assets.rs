//! Release assets: the package binary, downloaded from the signing service, and its SHA-512
//! checksum sidecar.

use sha2::{Digest, Sha512};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use crate::error::{HostError, RelayError, Result};

/// The package file and its checksum sidecar, named after the release version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSet {
    pub name: String,
    pub binary: PathBuf,
    pub checksum: Option<PathBuf>,
}

/// Substitute `{version}` in an asset name template.
pub fn asset_name(template: &str, version: &str) -> String {
    template.replace("{version}", version)
}

/// Content type used when uploading `name` as a release asset.
pub fn content_type_for(name: &str) -> &'static str {
    if name.ends_with(".msix") {
        "application/msix"
    } else {
        "application/octet-stream"
    }
}

/// Stream `url` into `dest`, creating the parent directory if needed.
///
/// The body is written chunk by chunk; the payload is never held in memory as a whole.
pub async fn download_asset(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    dest: &Path,
) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    info!(url, dest = %dest.display(), "[ASSETS] Downloading release asset");
    let mut request = client.get(url);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }
    let mut response = request.send().await.map_err(HostError::from)?;
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
        return Err(HostError::Rejected {
            status: status.as_u16(),
            body,
        }
        .into());
    }

    let mut file = File::create(dest).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await.map_err(HostError::from)? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    info!(bytes = written, dest = %dest.display(), "[ASSETS] Download complete");
    Ok(written)
}

/// Lowercase hex SHA-512 of the file at `path`.
pub async fn sha512_hex(path: &Path) -> Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha512::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Write `"<hex-digest> <file_name>"` for `binary` into `dest`. No trailing newline.
///
/// `file_name` is the name the binary is published under, which may differ from its name on disk.
pub async fn write_checksum_file(binary: &Path, file_name: &str, dest: &Path) -> Result<String> {
    if file_name.is_empty() || file_name.contains(['/', '\\']) {
        return Err(RelayError::config(format!(
            "asset name {file_name:?} is not a plain file name"
        )));
    }
    let digest = sha512_hex(binary).await?;
    let line = format!("{digest} {file_name}");
    fs::write(dest, line.as_bytes()).await?;
    debug!(dest = %dest.display(), digest = %digest, "[ASSETS] Wrote checksum file");
    Ok(line)
}
