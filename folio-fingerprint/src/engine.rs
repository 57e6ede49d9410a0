use md5::{Digest, Md5};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::{Fingerprint, FingerprintError};

/// Bytes read from each sampled offset (fewer when the window hits EOF).
pub const SAMPLE_SIZE: usize = 1024;

/// Offsets sampled by the default algorithm, ascending.
pub const SAMPLE_OFFSETS: [u64; 11] = [
    0,
    4_096,
    16_384,
    65_536,
    262_144,
    1_048_576,
    4_194_304,
    16_777_216,
    67_108_864,
    268_435_456,
    1_073_741_824,
];

/// Offsets that are sampled for a file of `len` bytes.
pub fn sample_offsets(len: u64) -> impl Iterator<Item = u64> {
    SAMPLE_OFFSETS
        .into_iter()
        .filter(move |offset| *offset < len)
}

/// Fingerprint the file at `path`.
///
/// The file is opened read-only and never locked. Any I/O fault at any offset
/// fails the whole operation.
pub fn fingerprint(path: impl AsRef<Path>) -> Result<Fingerprint, FingerprintError> {
    let path = path.as_ref();

    let file = File::open(path).map_err(|source| FingerprintError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let len = file
        .metadata()
        .map_err(|source| FingerprintError::Open {
            path: path.to_path_buf(),
            source,
        })?
        .len();

    let fingerprint = fingerprint_reader(file, len)?;
    tracing::trace!(path = %path.display(), len, %fingerprint, "Computed fingerprint");

    Ok(fingerprint)
}

/// Fingerprint any seekable source whose total length is `len`.
pub fn fingerprint_reader<R>(mut reader: R, len: u64) -> Result<Fingerprint, FingerprintError>
where
    R: Read + Seek,
{
    if len == 0 {
        return Err(FingerprintError::Empty);
    }

    let mut hasher = Md5::new();
    let mut window = Vec::with_capacity(SAMPLE_SIZE);

    for offset in sample_offsets(len) {
        let expected = (len - offset).min(SAMPLE_SIZE as u64) as usize;

        reader
            .seek(SeekFrom::Start(offset))
            .map_err(|source| FingerprintError::Read { offset, source })?;

        window.clear();
        (&mut reader)
            .take(SAMPLE_SIZE as u64)
            .read_to_end(&mut window)
            .map_err(|source| FingerprintError::Read { offset, source })?;

        if window.len() < expected {
            return Err(FingerprintError::Truncated {
                offset,
                expected,
                actual: window.len(),
            });
        }

        hasher.update(&window);
    }

    Ok(Fingerprint::from_digest(hasher.finalize().as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::{tempdir, NamedTempFile};

    fn md5_hex(bytes: &[u8]) -> String {
        hex::encode(Md5::digest(bytes).as_slice())
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn write_temp(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn sampled_offsets_are_those_below_length() {
        assert_eq!(sample_offsets(0).count(), 0);
        assert_eq!(sample_offsets(1).collect::<Vec<_>>(), vec![0]);
        assert_eq!(sample_offsets(4_096).collect::<Vec<_>>(), vec![0]);
        assert_eq!(sample_offsets(4_097).collect::<Vec<_>>(), vec![0, 4_096]);
        assert_eq!(
            sample_offsets(70_000).collect::<Vec<_>>(),
            vec![0, 4_096, 16_384, 65_536]
        );
        assert_eq!(sample_offsets(u64::MAX).count(), SAMPLE_OFFSETS.len());
    }

    #[test]
    fn small_file_hashes_its_whole_content() {
        let content = b"Call me Ishmael.";
        let file = write_temp(content);

        let fp = fingerprint(file.path()).unwrap();

        assert_eq!(fp.as_str(), md5_hex(content));
        assert_eq!(fp.len(), 32);
    }

    #[test]
    fn samples_windows_in_ascending_order() {
        let content = patterned(70_000);
        let file = write_temp(&content);

        let mut expected = Vec::new();
        for offset in [0usize, 4_096, 16_384, 65_536] {
            expected.extend_from_slice(&content[offset..(offset + SAMPLE_SIZE)]);
        }

        let fp = fingerprint(file.path()).unwrap();

        assert_eq!(fp.as_str(), md5_hex(&expected));
    }

    #[test]
    fn last_window_is_cut_at_end_of_file() {
        let content = patterned(4_096 + 100);
        let file = write_temp(&content);

        let mut expected = content[..SAMPLE_SIZE].to_vec();
        expected.extend_from_slice(&content[4_096..]);

        let fp = fingerprint(file.path()).unwrap();

        assert_eq!(fp.as_str(), md5_hex(&expected));
    }

    #[test]
    fn bytes_between_windows_do_not_matter() {
        let original = patterned(20_000);
        let mut edited = original.clone();
        edited[2_000] ^= 0xff;
        edited[10_000] ^= 0xff;

        let a = fingerprint(write_temp(&original).path()).unwrap();
        let b = fingerprint(write_temp(&edited).path()).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn identical_content_at_different_paths_matches() {
        let dir = tempdir().unwrap();
        let content = patterned(300_000);
        let first = dir.path().join("first.epub");
        let second = dir.path().join("nested-copy.epub");
        std::fs::write(&first, &content).unwrap();
        std::fs::write(&second, &content).unwrap();

        assert_eq!(fingerprint(&first).unwrap(), fingerprint(&second).unwrap());
        assert_eq!(fingerprint(&first).unwrap(), fingerprint(&first).unwrap());
    }

    #[test]
    fn empty_file_is_a_distinct_failure() {
        let file = write_temp(&[]);

        let err = fingerprint(file.path()).unwrap_err();

        assert!(matches!(err, FingerprintError::Empty));
    }

    #[test]
    fn missing_file_fails_to_open() {
        let dir = tempdir().unwrap();

        let err = fingerprint(dir.path().join("missing.pdf")).unwrap_err();

        assert!(matches!(err, FingerprintError::Open { .. }));
    }

    #[test]
    fn short_read_is_reported_as_truncation() {
        let reader = Cursor::new(vec![7u8; 10]);

        let err = fingerprint_reader(reader, 20).unwrap_err();

        match err {
            FingerprintError::Truncated {
                offset,
                expected,
                actual,
            } => {
                assert_eq!(offset, 0);
                assert_eq!(expected, 20);
                assert_eq!(actual, 10);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
