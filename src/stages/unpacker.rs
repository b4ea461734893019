use std::io::{Cursor, Read};

use bytes::Bytes;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::{PipelineError, Result};
use crate::infra::storage::{ObjectStore, StorageLocation};

/// A single file pulled out of an archive.
#[derive(Debug, Clone)]
pub struct ArchiveMember {
    pub name: String,
    pub data: Vec<u8>,
}

/// Where an archive's members ended up.
#[derive(Debug, Clone)]
pub struct UnpackedArchive {
    /// `{endpoint}/{bucket}/{stem}/`, the folder holding every member.
    pub folder: String,
    pub keys: Vec<String>,
}

/// Archive key without its final extension.
pub fn archive_stem(key: &str) -> &str {
    key.rsplit_once('.').map_or(key, |(stem, _)| stem)
}

/// Reads every non-directory member of a zip archive into memory.
///
/// A member that cannot be decompressed or fails its checksum is a format
/// error, like an archive that cannot be opened at all.
pub fn extract_members(bytes: Bytes) -> Result<Vec<ArchiveMember>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut members = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(|e| {
            PipelineError::Format(format!("unreadable archive member '{name}': {e}"))
        })?;
        members.push(ArchiveMember { name, data });
    }

    Ok(members)
}

/// Reads the archive at `location` and re-uploads each member individually
/// under `{stem}/{member-name}` in the same bucket.
///
/// The location is validated before anything is read, so a malformed location
/// fails with a format error and leaves storage untouched.
pub async fn unpack_archive(
    store: &dyn ObjectStore,
    bucket: &str,
    location: &str,
) -> Result<UnpackedArchive> {
    let location = StorageLocation::parse(location, bucket)?;

    let archive = store.get(bucket, &location.key).await?;
    let stem = archive_stem(&location.key).to_string();
    let members = extract_members(archive)?;

    let mut keys = Vec::with_capacity(members.len());
    for member in members {
        let key = format!("{stem}/{}", member.name);
        debug!(key, bytes = member.data.len(), "Uploading archive member");
        store.put(bucket, &key, Bytes::from(member.data), true).await?;
        keys.push(key);
    }

    let folder = StorageLocation::new(location.endpoint, bucket, format!("{stem}/"));
    info!(members = keys.len(), folder = %folder, "Archive unpacked");

    Ok(UnpackedArchive {
        folder: folder.to_string(),
        keys,
    })
}
