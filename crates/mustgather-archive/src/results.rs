//! Lookup of the must-gather inside a conformance results tarball.

use std::io::Read;

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::debug;

use crate::error::Result;

/// Location of the must-gather collected by the artifacts plugin
pub const MUST_GATHER_RESULTS_PATH: &str =
    "plugins/99-openshift-artifacts-collector/results/global/artifacts_must-gather.tar.xz";

/// Read the must-gather archive out of a gzip-compressed results tarball.
///
/// Returns `None` when the results do not carry a must-gather.
pub fn extract_must_gather<R: Read>(reader: R) -> Result<Option<Vec<u8>>> {
    find_entry(GzDecoder::new(reader), MUST_GATHER_RESULTS_PATH)
}

/// Read the regular file at `wanted` from an uncompressed tar stream
pub fn find_entry<R: Read>(reader: R, wanted: &str) -> Result<Option<Vec<u8>>> {
    let mut archive = Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path()?;
        let name = path.to_string_lossy();
        if name.trim_start_matches("./") != wanted {
            continue;
        }

        debug!("Found {} in results archive ({} bytes)", wanted, entry.size());
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        return Ok(Some(data));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    fn results_tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_extract_must_gather() {
        let tarball = results_tarball(&[
            ("meta/run.log", b"run"),
            (MUST_GATHER_RESULTS_PATH, b"xz-bytes"),
        ]);
        let found = extract_must_gather(tarball.as_slice()).unwrap();
        assert_eq!(found.as_deref(), Some(&b"xz-bytes"[..]));
    }

    #[test]
    fn test_extract_with_dot_prefix() {
        let path = format!("./{MUST_GATHER_RESULTS_PATH}");
        let tarball = results_tarball(&[(&path, b"xz-bytes")]);
        assert!(extract_must_gather(tarball.as_slice()).unwrap().is_some());
    }

    #[test]
    fn test_missing_must_gather() {
        let tarball = results_tarball(&[("meta/run.log", b"run")]);
        assert_eq!(extract_must_gather(tarball.as_slice()).unwrap(), None);
    }

    #[test]
    fn test_not_gzip() {
        assert!(extract_must_gather(&b"plain bytes"[..]).is_err());
    }
}
