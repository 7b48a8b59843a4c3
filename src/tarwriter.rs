//! In-memory tar assembly for the engine's "put archive to path" endpoint.

use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

/// One file to stage into the sandbox's working directory.
#[derive(Debug, Clone)]
pub struct SandboxFile {
    pub name: String,
    pub content: Vec<u8>,
}

/// Parse the loosely-typed `files` JSON array. Entries whose `name` is
/// missing or not a string are silently skipped, matching the
/// permissive policy for malformed file records.
pub fn files_from_json(value: &Value) -> Vec<SandboxFile> {
    let Some(array) = value.as_array() else {
        return Vec::new();
    };
    array
        .iter()
        .filter_map(|entry| {
            let name = entry.get("name")?.as_str()?.to_string();
            if name.is_empty() {
                return None;
            }
            let content = entry
                .get("content")
                .and_then(|c| c.as_str())
                .map(|s| s.as_bytes().to_vec())
                .unwrap_or_default();
            Some(SandboxFile { name, content })
        })
        .collect()
}

/// Build an uncompressed in-memory tar archive from `files`. Every
/// entry gets an mtime equal to the current Unix time.
pub fn build_tar(files: &[SandboxFile]) -> io::Result<Vec<u8>> {
    let mtime = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let mut builder = tar::Builder::new(Vec::new());
    for file in files {
        let mut header = tar::Header::new_gnu();
        header.set_path(&file.name)?;
        header.set_size(file.content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        header.set_cksum();
        builder.append(&header, file.content.as_slice())?;
    }
    builder.into_inner()
}
