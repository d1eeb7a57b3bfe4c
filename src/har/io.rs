//! HAR archive reading and writing
//!
//! Pretty-printed JSON on the way out, tolerant parsing on the way in.

use crate::error::{ArchiveError, Result};
use crate::har::types::Har;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

/// Serialize an archive as pretty-printed JSON to the given writer.
pub fn write<W: Write>(archive: &Har, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, archive)
        .map_err(|e| ArchiveError::WriteFailed(e.to_string()))?;
    // Trailing newline so shell pipelines compose cleanly
    writer
        .write_all(b"\n")
        .map_err(|e| ArchiveError::WriteFailed(e.to_string()))?;
    debug!(entries = archive.log.entries.len(), "archive written");
    Ok(())
}

/// Parse an archive from any reader.
pub fn from_reader<R: Read>(reader: R) -> Result<Har> {
    let archive =
        serde_json::from_reader(reader).map_err(|e| ArchiveError::ParseFailed(e.to_string()))?;
    Ok(archive)
}

/// Read and parse an archive file.
pub fn read<P: AsRef<Path>>(path: P) -> Result<Har> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| ArchiveError::ReadFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let archive = serde_json::from_slice(&data)
        .map_err(|e| ArchiveError::ParseFailed(e.to_string()))?;
    Ok(archive)
}

/// Collect the request URLs of an archive, in entry order.
///
/// Entries without a URL are skipped.
pub fn request_urls(archive: &Har) -> Vec<&str> {
    archive
        .log
        .entries
        .iter()
        .filter(|e| !e.request.url.is_empty())
        .map(|e| e.request.url.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::har::types::{Creator, Entry, Har, Request, Response};
    use pretty_assertions::assert_eq;

    fn sample_archive() -> Har {
        let entries = vec![
            Entry {
                request: Request {
                    method: "GET".to_string(),
                    url: "https://example.com/a".to_string(),
                    ..Request::default()
                },
                response: Response {
                    status: 200,
                    ..Response::unresolved()
                },
                ..Entry::default()
            },
            Entry {
                request: Request {
                    method: "POST".to_string(),
                    url: "https://example.com/b".to_string(),
                    ..Request::default()
                },
                response: Response::unresolved(),
                ..Entry::default()
            },
        ];
        Har::from_capture(
            Creator {
                name: "harchiver".to_string(),
                version: "test".to_string(),
            },
            Vec::new(),
            entries,
        )
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let archive = sample_archive();
        let mut buf = Vec::new();
        write(&archive, &mut buf).unwrap();

        let parsed = from_reader(buf.as_slice()).unwrap();
        assert_eq!(parsed, archive);
    }

    #[test]
    fn test_write_ends_with_newline() {
        let mut buf = Vec::new();
        write(&sample_archive(), &mut buf).unwrap();
        assert_eq!(buf.last(), Some(&b'\n'));
    }

    #[test]
    fn test_from_reader_rejects_garbage() {
        let err = from_reader(&b"not json"[..]).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn test_request_urls() {
        let archive = sample_archive();
        assert_eq!(
            request_urls(&archive),
            vec!["https://example.com/a", "https://example.com/b"]
        );
    }

    #[test]
    fn test_read_missing_file() {
        let err = read("/nonexistent/capture.har").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/capture.har"));
    }
}
