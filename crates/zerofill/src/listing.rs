//! Directory listing of generated files.

use crate::{Error, Result, naming::is_generated_name};
use serde::Serialize;
use std::path::Path;

/// A generated file and where to fetch it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub file_name: String,
    pub url: String,
}

/// Lists every generated file in `dir`, sorted by name.
///
/// Only regular files with the generated-file extension are returned; hidden
/// files, directories and anything else in the directory are skipped.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directory cannot be read.
pub async fn list_files(dir: &Path, url_prefix: &str) -> Result<Vec<FileEntry>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(Error::io("reading output directory"))?;
    let url_prefix = url_prefix.trim_end_matches('/');

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(Error::io("reading output directory"))?
    {
        let Ok(file_name) = entry.file_name().into_string() else {
            continue;
        };
        if !is_generated_name(&file_name) {
            continue;
        }
        match entry.file_type().await {
            Ok(kind) if kind.is_file() => {}
            _ => continue,
        }
        files.push(FileEntry {
            url: format!("{url_prefix}/{file_name}"),
            file_name,
        });
    }

    files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_only_generated_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("zerofill_2GiB_2.bin"), b"").unwrap();
        std::fs::write(dir.path().join("zerofill_1GiB_1.bin"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::write(dir.path().join(".partial.bin"), b"").unwrap();
        std::fs::create_dir(dir.path().join("nested.bin")).unwrap();

        let files = list_files(dir.path(), "/all-files/").await.unwrap();
        assert_eq!(
            files,
            vec![
                FileEntry {
                    file_name: "zerofill_1GiB_1.bin".into(),
                    url: "/all-files/zerofill_1GiB_1.bin".into(),
                },
                FileEntry {
                    file_name: "zerofill_2GiB_2.bin".into(),
                    url: "/all-files/zerofill_2GiB_2.bin".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = list_files(&dir.path().join("absent"), "/").await.unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
