//! Mirror a package file to every configured object store.

use std::path::Path;
use tracing::{error, info};

use crate::contract::ObjectStore;
use crate::error::{RelayError, Result};

/// Upload `file` under its own file name to each store in order. The first failure aborts.
/// Returns the names of the stores that received the file.
pub async fn upload_to_stores(stores: &[Box<dyn ObjectStore>], file: &Path) -> Result<Vec<String>> {
    let key = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RelayError::config(format!("{} has no file name", file.display())))?
        .to_string();
    let size = tokio::fs::metadata(file).await?.len();

    let mut done = Vec::new();
    for (i, store) in stores.iter().enumerate() {
        let name = store.name();
        info!(
            store = %name,
            key = %key,
            bytes = size,
            progress = %format!("{}/{}", i + 1, stores.len()),
            "[UPLOAD] Uploading to object store"
        );
        if let Err(e) = store.put_file(file, &key).await {
            error!(store = %name, key = %key, error = %e, "[UPLOAD][ERROR] Object store upload failed");
            return Err(e.into());
        }
        info!(store = %name, key = %key, "[UPLOAD] Upload complete");
        done.push(name);
    }
    Ok(done)
}
