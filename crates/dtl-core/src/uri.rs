//! URI grammar for `Stream::open`.
//!
//! A File engine URI is `"<zone>:<fs-name>:<absolute-path>"`; a Staging
//! engine URI is an opaque rendezvous name that simply has to match across
//! every publisher and subscriber that opens the Stream.

use crate::errors::DtlError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUri {
    pub zone: String,
    pub fs_name: String,
    pub path: String,
}

impl FileUri {
    /// Parses `"zone:fs:/absolute/path"`. The path may itself contain `:`
    /// (not on common filesystems, but we don't assume), so only the first
    /// two separators are significant.
    pub fn parse(uri: &str) -> Result<Self, DtlError> {
        let mut parts = uri.splitn(3, ':');
        let zone = parts.next().unwrap_or("");
        let fs_name = parts.next().unwrap_or("");
        let path = parts.next().unwrap_or("");
        if zone.is_empty() || fs_name.is_empty() || path.is_empty() {
            return Err(DtlError::UsageError(format!(
                "'{uri}' is not a valid File engine URI; expected 'zone:fs-name:/absolute/path'"
            )));
        }
        Ok(FileUri { zone: zone.to_string(), fs_name: fs_name.to_string(), path: path.to_string() })
    }

    pub fn data_file(&self, publisher_index: u64) -> String {
        format!("{}/data.{}", self.path.trim_end_matches('/'), publisher_index)
    }

    pub fn manifest_file(&self) -> String {
        format!("{}/md.idx", self.path.trim_end_matches('/'))
    }
}
