//! Reader for the `.fvecs` format used by the TEXMEX corpora (SIFT, GIST).
//!
//! Each record is a little-endian `i32` dimension followed by that many
//! little-endian `f32` components.

use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

/// Largest dimension accepted from a record header.
pub const MAX_DIMENSION: usize = 65_536;

/// Read up to `limit` vectors (all of them when `None`) from an fvecs file.
pub fn read_fvecs(path: &Path, limit: Option<usize>) -> Result<Vec<Vec<f32>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open fvecs file: {}", path.display()))?;
    let byte_size = file.metadata()?.len();
    tracing::debug!(path = %path.display(), bytes = byte_size, "reading fvecs");

    let vectors = read_records(BufReader::new(file), limit, Some(byte_size))
        .with_context(|| format!("Failed to parse fvecs file: {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        rows = vectors.len(),
        dim = vectors.first().map(Vec::len).unwrap_or(0),
        "loaded fvecs vectors"
    );
    Ok(vectors)
}

/// Decode records from `reader`. When `byte_len` is known, a record whose
/// header claims more bytes than remain is rejected before allocating.
pub(crate) fn read_records<R: Read>(
    mut reader: R,
    limit: Option<usize>,
    byte_len: Option<u64>,
) -> Result<Vec<Vec<f32>>> {
    let limit = limit.unwrap_or(usize::MAX);
    let mut vectors = Vec::new();
    let mut consumed = 0u64;

    while vectors.len() < limit {
        let dim = match reader.read_i32::<LittleEndian>() {
            Ok(dim) => dim,
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        };
        if dim <= 0 || dim as usize > MAX_DIMENSION {
            bail!("record {} has invalid dimension {}", vectors.len(), dim);
        }
        let record_bytes = 4 + 4 * dim as u64;
        if let Some(total) = byte_len {
            if consumed + record_bytes > total {
                bail!(
                    "record {} claims dimension {} but only {} bytes remain",
                    vectors.len(),
                    dim,
                    total.saturating_sub(consumed + 4)
                );
            }
        }

        let mut vector = vec![0.0f32; dim as usize];
        reader
            .read_f32_into::<LittleEndian>(&mut vector)
            .with_context(|| format!("truncated record {}", vectors.len()))?;
        consumed += record_bytes;
        vectors.push(vector);
    }

    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::{Cursor, Write};

    fn encode(records: &[Vec<f32>]) -> Vec<u8> {
        let mut buf = Vec::new();
        for record in records {
            buf.write_i32::<LittleEndian>(record.len() as i32).unwrap();
            for x in record {
                buf.write_f32::<LittleEndian>(*x).unwrap();
            }
        }
        buf
    }

    #[test]
    fn reads_all_records() {
        let bytes = encode(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        let vectors = read_records(Cursor::new(bytes), None, None).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
    }

    #[test]
    fn limit_stops_early() {
        let bytes = encode(&[vec![1.0], vec![2.0], vec![3.0]]);
        let vectors = read_records(Cursor::new(bytes), Some(2), None).unwrap();
        assert_eq!(vectors.len(), 2);
    }

    #[test]
    fn truncated_record_is_an_error() {
        let mut bytes = encode(&[vec![1.0, 2.0]]);
        bytes.truncate(bytes.len() - 2);
        assert!(read_records(Cursor::new(bytes), None, None).is_err());
    }

    #[test]
    fn oversized_dimension_header_is_rejected() {
        let mut bytes = Vec::new();
        bytes.write_i32::<LittleEndian>(i32::MAX).unwrap();
        bytes.write_f32::<LittleEndian>(1.0).unwrap();
        let err = read_records(Cursor::new(bytes), None, None).unwrap_err();
        assert!(err.to_string().contains("invalid dimension"));
    }

    #[test]
    fn dimension_past_end_of_file_is_rejected() {
        let mut bytes = encode(&[vec![1.0, 2.0]]);
        bytes.write_i32::<LittleEndian>(1000).unwrap();
        bytes.write_f32::<LittleEndian>(3.0).unwrap();
        let len = bytes.len() as u64;
        let err = read_records(Cursor::new(bytes), None, Some(len)).unwrap_err();
        assert!(err.to_string().contains("bytes remain"));
    }

    #[test]
    fn reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&encode(&vec![vec![0.5; 4]; 3])).unwrap();
        let vectors = read_fvecs(file.path(), None).unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[2], vec![0.5; 4]);
    }
}
