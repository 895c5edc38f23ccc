use std::ops::Range;

use crate::error::{Error, Result};

/// Split `0..len` into `parts` contiguous ranges of equal size.
///
/// The ranges are disjoint and cover every index exactly once, so each
/// worker can own its range outright.
///
/// # Errors
///
/// Fails if `parts` is zero or does not divide `len`.
pub fn partition(len: usize, parts: usize) -> Result<Vec<Range<usize>>> {
    if parts == 0 {
        return Err(Error::InvalidThreadCount);
    }
    if len % parts != 0 {
        return Err(Error::IndivisibleBatch {
            batch: len,
            threads: parts,
        });
    }

    let per_part = len / parts;
    Ok((0..parts)
        .map(|i| i * per_part..(i + 1) * per_part)
        .collect())
}

/// Split `0..len` into ranges of at most `chunk` indices, in order.
///
/// The last range is shorter when `chunk` does not divide `len`, and a
/// `chunk` larger than `len` gives a single range.
///
/// # Panics
///
/// Panics if `chunk` is zero.
pub fn chunk_ranges(len: usize, chunk: usize) -> Vec<Range<usize>> {
    assert!(chunk > 0, "chunk size must be at least 1");
    (0..len)
        .step_by(chunk)
        .map(|start| start..start + chunk.min(len - start))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        assert_eq!(partition(2048, 4).unwrap(), vec![0..512, 512..1024, 1024..1536, 1536..2048]);
        assert_eq!(partition(7, 1).unwrap(), vec![0..7]);
    }

    #[test]
    fn test_rejects_uneven_split() {
        assert!(matches!(
            partition(10, 3),
            Err(Error::IndivisibleBatch { batch: 10, threads: 3 })
        ));
        assert!(matches!(partition(10, 0), Err(Error::InvalidThreadCount)));
    }

    #[test]
    fn test_chunk_ranges_cover_tail() {
        assert_eq!(chunk_ranges(10, 4), vec![0..4, 4..8, 8..10]);
        assert_eq!(chunk_ranges(8, 4), vec![0..4, 4..8]);
        assert!(chunk_ranges(0, 4).is_empty());
        assert_eq!(chunk_ranges(10, usize::MAX), vec![0..10]);
    }
}
