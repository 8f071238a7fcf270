use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
};

use crate::{
    error::{Error, Result},
    persist,
};

const MAGIC: &[u8; 8] = b"DOCRAGIX";
const FORMAT_VERSION: u32 = 1;

/// A search hit: position in the index and its L2 distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// Flat vector index searched by exhaustive Euclidean distance.
///
/// Vectors are stored contiguously in insertion order; a vector's position
/// is its insertion index. There is no removal: the index is always rebuilt
/// from scratch.
///
/// # Examples
///
/// ```
/// use docrag::vector_index::FlatIndex;
///
/// let mut index = FlatIndex::new(2, "toy");
/// index.add(&[0.0, 0.0]).unwrap();
/// index.add(&[3.0, 4.0]).unwrap();
///
/// let hits = index.search(&[3.0, 4.0], 1);
/// assert_eq!(hits[0].position, 1);
/// assert_eq!(hits[0].distance, 0.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    model_id: String,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize, model_id: &str) -> Self {
        Self {
            dimension,
            model_id: model_id.to_string(),
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embedding model that produced the stored vectors.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a vector; it receives position `self.len()`.
    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::Config(format!(
                "vector has dimension {}, index expects {}",
                vector.len(),
                self.dimension
            )));
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// The vector stored at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// The `k` nearest vectors to `query`, closest first.
    ///
    /// Ties are broken by position. A query of the wrong dimension matches
    /// nothing.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        if k == 0 || query.len() != self.dimension || self.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, v)| Neighbor {
                position,
                distance: l2_distance(query, v),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k);
        hits
    }

    /// Serialize the index.
    ///
    /// Binary format:
    /// - 8 bytes: magic `DOCRAGIX`
    /// - 4 bytes: format version (u32 LE)
    /// - 4 bytes: dimension D (u32 LE)
    /// - 8 bytes: vector count N (u64 LE)
    /// - 4 bytes: model id length L (u32 LE), then L bytes of UTF-8
    /// - N * D * 4 bytes: f32 LE values in row-major order
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            28 + self.model_id.len() + std::mem::size_of_val(self.data.as_slice()),
        );
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        out.extend_from_slice(&(self.len() as u64).to_le_bytes());
        out.extend_from_slice(&(self.model_id.len() as u32).to_le_bytes());
        out.extend_from_slice(self.model_id.as_bytes());
        out.extend_from_slice(bytemuck::cast_slice(self.data.as_slice()));
        out
    }

    /// Parse bytes produced by [`FlatIndex::to_bytes`]. `path` is only used
    /// in error messages.
    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self> {
        let malformed = |reason: &str| Error::IndexFormat {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let mut reader = ByteReader { bytes, pos: 0 };
        if reader.take(MAGIC.len()) != Some(MAGIC.as_slice()) {
            return Err(malformed("bad magic"));
        }
        let version = reader.u32().ok_or_else(|| malformed("truncated header"))?;
        if version != FORMAT_VERSION {
            return Err(malformed(&format!("unsupported version {version}")));
        }
        let dimension =
            reader.u32().ok_or_else(|| malformed("truncated header"))? as usize;
        let count =
            reader.u64().ok_or_else(|| malformed("truncated header"))? as usize;
        let model_len =
            reader.u32().ok_or_else(|| malformed("truncated header"))? as usize;
        let model_id = reader
            .take(model_len)
            .and_then(|b| std::str::from_utf8(b).ok())
            .ok_or_else(|| malformed("bad model id"))?
            .to_string();

        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| malformed("size overflow"))?;
        let rest = &bytes[reader.pos..];
        if rest.len() != expected {
            return Err(malformed(&format!(
                "expected {expected} bytes of vector data, found {}",
                rest.len()
            )));
        }

        Ok(Self {
            dimension,
            model_id,
            data: bytemuck::pod_collect_to_vec(rest),
        })
    }

    /// Write the index to `path`, replacing any previous file atomically.
    pub fn write(&self, path: &Path) -> Result<()> {
        persist::write_atomic(path, &self.to_bytes())
    }

    /// Read an index from `path`.
    ///
    /// Returns [`Error::IndexMissing`] if the file does not exist.
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::IndexMissing(PathBuf::from(path)));
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_bytes(&bytes, path)
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let slice = self.bytes.get(self.pos..self.pos.checked_add(n)?)?;
        self.pos += n;
        Some(slice)
    }

    fn u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.take(4)?.try_into().ok()?))
    }

    fn u64(&mut self) -> Option<u64> {
        Some(u64::from_le_bytes(self.take(8)?.try_into().ok()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FlatIndex {
        let mut index = FlatIndex::new(3, "test-model");
        index.add(&[0.0, 0.0, 0.0]).unwrap();
        index.add(&[1.0, 0.0, 0.0]).unwrap();
        index.add(&[0.0, 5.0, 0.0]).unwrap();
        index
    }

    #[test]
    fn positions_follow_insertion_order() {
        let index = sample();
        assert_eq!(index.len(), 3);
        assert_eq!(index.vector(1), Some([1.0, 0.0, 0.0].as_slice()));
        assert_eq!(index.vector(3), None);
    }

    #[test]
    fn search_orders_by_distance() {
        let index = sample();
        let hits = index.search(&[0.9, 0.0, 0.0], 3);
        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![1, 0, 2]);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn exact_match_has_zero_distance() {
        let index = sample();
        let hits = index.search(&[0.0, 5.0, 0.0], 1);
        assert_eq!(hits, vec![Neighbor { position: 2, distance: 0.0 }]);
    }

    #[test]
    fn k_larger_than_index_returns_all() {
        assert_eq!(sample().search(&[0.0, 0.0, 0.0], 10).len(), 3);
    }

    #[test]
    fn ties_broken_by_position() {
        let mut index = FlatIndex::new(1, "m");
        index.add(&[1.0]).unwrap();
        index.add(&[-1.0]).unwrap();
        let hits = index.search(&[0.0], 2);
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[1].position, 1);
    }

    #[test]
    fn empty_index_and_bad_queries_return_nothing() {
        let empty = FlatIndex::new(3, "m");
        assert!(empty.is_empty());
        assert!(empty.search(&[0.0, 0.0, 0.0], 5).is_empty());

        let index = sample();
        assert!(index.search(&[0.0, 0.0], 5).is_empty());
        assert!(index.search(&[0.0, 0.0, 0.0], 0).is_empty());
    }

    #[test]
    fn add_rejects_wrong_dimension() {
        let mut index = FlatIndex::new(3, "m");
        assert!(index.add(&[1.0, 2.0]).is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn write_and_read() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vectors.idx");

        let index = sample();
        index.write(&path).unwrap();
        let restored = FlatIndex::read(&path).unwrap();

        assert_eq!(restored, index);
        assert_eq!(restored.model_id(), "test-model");
    }

    #[test]
    fn empty_index_survives_persistence() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vectors.idx");

        FlatIndex::new(384, "m").write(&path).unwrap();
        let restored = FlatIndex::read(&path).unwrap();
        assert!(restored.is_empty());
        assert_eq!(restored.dimension(), 384);
    }

    #[test]
    fn missing_file_is_index_missing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            FlatIndex::read(&tmp.path().join("absent.idx")),
            Err(Error::IndexMissing(_))
        ));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let bytes = sample().to_bytes();
        let path = Path::new("vectors.idx");
        assert!(matches!(
            FlatIndex::from_bytes(&bytes[..bytes.len() - 2], path),
            Err(Error::IndexFormat { .. })
        ));
        assert!(FlatIndex::from_bytes(b"garbage", path).is_err());
    }
}
