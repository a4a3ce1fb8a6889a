//! Content-addressed store paths for artifacts.

use mlforge_abstraction::ArtifactResult;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Hex-encoded SHA-256 of everything `reader` yields.
///
/// # Errors
/// Returns `ArtifactError::Io` if reading fails.
pub fn calc_sha256<R: Read>(mut reader: R) -> ArtifactResult<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// File name an artifact is stored under.
///
/// Keys such as `model.pkl` may already carry the extension, in which case it
/// is not appended again.
#[must_use]
pub fn artifact_basename(key: &str, ext: Option<&str>) -> String {
    match ext {
        Some(ext) if !key.ends_with(&format!(".{ext}")) => format!("{key}.{ext}"),
        _ => key.to_string(),
    }
}

/// Builds `<sha256 of the file>/<basename>` for the artifact at `path`.
///
/// # Errors
/// Returns `ArtifactError::Io` if the file cannot be read.
pub fn build_artifact_store_path(path: &Path, key: &str, ext: Option<&str>) -> ArtifactResult<String> {
    let hash = calc_sha256(File::open(path)?)?;
    Ok(format!("{}/{}", hash, artifact_basename(key, ext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlforge_abstraction::ArtifactError;
    use std::io::Write;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_calc_sha256() {
        assert_eq!(calc_sha256(&b"hello"[..]).unwrap(), HELLO_SHA256);
        assert_eq!(
            calc_sha256(&b""[..]).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_calc_sha256_spans_buffer_boundary() {
        let data = vec![7u8; HASH_BUFFER_SIZE * 2 + 13];
        let expected = hex::encode(Sha256::digest(&data));
        assert_eq!(calc_sha256(data.as_slice()).unwrap(), expected);
    }

    #[test]
    fn test_artifact_basename() {
        assert_eq!(artifact_basename("model", None), "model");
        assert_eq!(artifact_basename("model", Some("pkl")), "model.pkl");
        assert_eq!(artifact_basename("model.pkl", Some("pkl")), "model.pkl");
        assert_eq!(artifact_basename("model_api.json", Some("pkl")), "model_api.json.pkl");
        // only a dotted suffix counts
        assert_eq!(artifact_basename("modelpkl", Some("pkl")), "modelpkl.pkl");
    }

    #[test]
    fn test_build_artifact_store_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        file.flush().unwrap();

        let path = build_artifact_store_path(file.path(), "greeting", Some("txt")).unwrap();
        assert_eq!(path, format!("{HELLO_SHA256}/greeting.txt"));
    }

    #[test]
    fn test_build_artifact_store_path_missing_file() {
        let err = build_artifact_store_path(Path::new("/nonexistent/artifact.bin"), "k", None).unwrap_err();
        assert!(matches!(err, ArtifactError::Io(_)));
    }
}
