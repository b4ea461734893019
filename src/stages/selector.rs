use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{PipelineError, Result};
use crate::infra::storage::{ObjectStore, StorageLocation};

pub const DATASET_EXTENSION: &str = ".csv";

/// First name, in iteration order, ending with `extension`.
pub fn first_with_extension<'a, I>(names: I, extension: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    names.into_iter().find(|name| name.ends_with(extension))
}

/// Finds the dataset among the members stored under `folder` and downloads it
/// into `work_dir`, returning the local path.
///
/// # Errors
///
/// [`PipelineError::NotFound`] when no key under the folder ends in `.csv`.
pub async fn select_dataset(
    store: &dyn ObjectStore,
    bucket: &str,
    folder: &str,
    work_dir: &Path,
) -> Result<PathBuf> {
    let location = StorageLocation::parse(folder, bucket)?;
    let keys = store.list(bucket, &location.key).await?;

    let key = first_with_extension(keys.iter().map(String::as_str), DATASET_EXTENSION)
        .ok_or_else(|| PipelineError::NotFound(format!("No CSV found in {folder}")))?;

    let file_name = key.rsplit('/').next().unwrap_or(key);
    let data = store.get(bucket, key).await?;

    fs::create_dir_all(work_dir)?;
    let path = work_dir.join(file_name);
    fs::write(&path, &data)?;

    info!(key, path = %path.display(), bytes = data.len(), "Dataset selected");
    Ok(path)
}

/// Same selection rule applied to a local directory, names sorted ascending.
pub fn select_local(dir: &Path) -> Result<PathBuf> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();

    first_with_extension(names.iter().map(String::as_str), DATASET_EXTENSION)
        .map(|name| dir.join(name))
        .ok_or_else(|| PipelineError::NotFound(format!("No CSV found in {}", dir.display())))
}
