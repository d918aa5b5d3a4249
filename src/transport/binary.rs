//! Binary response summaries
//!
//! Byte streams that cannot be validated structurally are spilled to disk
//! and reduced to an identifying map: `{saved, size, sha256sum}` plus
//! `NOTICE` lines when the binary path was a fallback rather than the
//! declared response type.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use base64::prelude::{Engine as _, BASE64_STANDARD};
use flate2::read::GzDecoder;
use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::common::{Error, Result};
use crate::value::Value;

const SPILL_PREFIX: &str = "binary-response-";

/// Stream `reader` to `save_path` (or a kept temp file), hashing and
/// counting along the way, and produce the summary map. `expected` marks
/// whether the caller asked for a binary response or fell back to one.
pub fn summarize<R: Read>(
    mut reader: R,
    save_path: Option<&Path>,
    expected: bool,
) -> Result<Value> {
    let (mut file, path) = open_target(save_path)?;

    let mut hasher = Sha256::new();
    let mut size: u64 = 0;
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
        file.write_all(&buf[..n])?;
    }

    let mut summary = IndexMap::new();
    summary.insert(
        "saved".to_string(),
        Value::Str(path.to_string_lossy().into_owned()),
    );
    if !expected {
        summary.insert(
            "NOTICE".to_string(),
            Value::Seq(vec![
                Value::Str(
                    "Unexpected non-JSON response was returned from this call triggering a \
                     fallback to its binary representation."
                        .to_string(),
                ),
                Value::Str(
                    "Response data has been written to the path in the 'saved' field of this \
                     object."
                        .to_string(),
                ),
            ]),
        );
    }
    summary.insert("size".to_string(), Value::Int(size as i64));
    summary.insert(
        "sha256sum".to_string(),
        Value::Str(hex::encode(hasher.finalize())),
    );
    Ok(Value::Map(summary))
}

fn open_target(save_path: Option<&Path>) -> Result<(File, PathBuf)> {
    match save_path {
        Some(path) => {
            let file = File::create(path).map_err(|e| {
                Error::Transport(format!(
                    "failed to open '{}' while writing response: {}",
                    path.display(),
                    e
                ))
            })?;
            Ok((file, path.to_path_buf()))
        }
        None => {
            let (file, path) = tempfile::Builder::new()
                .prefix(SPILL_PREFIX)
                .tempfile()
                .map_err(|e| Error::Transport(format!("failed to create temporary file: {}", e)))?
                .keep()
                .map_err(|e| Error::Transport(format!("failed to keep temporary file: {}", e)))?;
            Ok((file, path))
        }
    }
}

/// Decode a base64 string holding gzip-compressed bytes.
pub fn base64_gzip_decode(input: &str) -> Result<Vec<u8>> {
    let compressed = BASE64_STANDARD
        .decode(input)
        .map_err(|_| Error::Transport("invalid base64 encoded string".to_string()))?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|_| Error::Transport("base64 encoded string was not gzip compressed".to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_summary_shape() {
        let data = b"hello world";
        let summary = summarize(Cursor::new(data.to_vec()), None, true).unwrap();
        assert_eq!(summary.get_field("size"), Some(&Value::Int(11)));
        assert_eq!(
            summary.get_field("sha256sum").unwrap().as_str().unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert!(summary.get_field("NOTICE").is_none());

        let saved = summary.get_field("saved").unwrap().as_str().unwrap();
        assert!(std::fs::metadata(saved).is_ok());
        let _ = std::fs::remove_file(saved);
    }

    #[test]
    fn test_fallback_attaches_notice() {
        let summary = summarize(Cursor::new(vec![1u8, 2, 3]), None, false).unwrap();
        let notice = summary.get_field("NOTICE").unwrap().as_seq().unwrap();
        assert_eq!(notice.len(), 2);
        let saved = summary.get_field("saved").unwrap().as_str().unwrap();
        let _ = std::fs::remove_file(saved);
    }

    #[test]
    fn test_base64_gzip_round_trip() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write as _;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"payload").unwrap();
        let compressed = encoder.finish().unwrap();
        let encoded = BASE64_STANDARD.encode(&compressed);

        assert_eq!(base64_gzip_decode(&encoded).unwrap(), b"payload");
    }

    #[test]
    fn test_base64_gzip_rejects_plain_base64() {
        let encoded = BASE64_STANDARD.encode(b"not gzip");
        assert!(base64_gzip_decode(&encoded).is_err());
    }
}
