//! Topology-only persistence of a [`KdIndex`].
//!
//! The file stores the node arena in pre-order together with the point
//! permutation, split values and boxes. Coordinates are never written: loading
//! pairs the topology with caller-supplied points, which must be the rows the
//! index was built from, in the same order.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crc32fast::Hasher;

use crate::error::{LpqError, Result};
use crate::kdtree::{KdIndex, KdNode};
use crate::metric::MetricKind;
use crate::points::PointSet;

const PERSIST_MAGIC: [u8; 4] = *b"LPQT";
const PERSIST_VERSION: u32 = 1;

const TAG_LEAF: u8 = 0;
const TAG_INTERNAL: u8 = 1;

/// Counts the bytes that reach the inner writer.
struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn write_bytes<W: Write>(writer: &mut W, bytes: &[u8], hasher: &mut Hasher) -> io::Result<()> {
    hasher.update(bytes);
    writer.write_all(bytes)
}

fn write_u8<W: Write>(writer: &mut W, value: u8, hasher: &mut Hasher) -> io::Result<()> {
    write_bytes(writer, &[value], hasher)
}

fn write_u32<W: Write>(writer: &mut W, value: u32, hasher: &mut Hasher) -> io::Result<()> {
    write_bytes(writer, &value.to_le_bytes(), hasher)
}

fn write_u64<W: Write>(writer: &mut W, value: u64, hasher: &mut Hasher) -> io::Result<()> {
    write_bytes(writer, &value.to_le_bytes(), hasher)
}

fn write_f64<W: Write>(writer: &mut W, value: f64, hasher: &mut Hasher) -> io::Result<()> {
    write_bytes(writer, &value.to_le_bytes(), hasher)
}

fn read_array<const N: usize, R: Read>(reader: &mut R, hasher: Option<&mut Hasher>) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    if let Some(h) = hasher {
        h.update(&buf);
    }
    Ok(buf)
}

fn read_u8<R: Read>(reader: &mut R, hasher: &mut Hasher) -> io::Result<u8> {
    Ok(read_array::<1, _>(reader, Some(hasher))?[0])
}

fn read_u32<R: Read>(reader: &mut R, hasher: &mut Hasher) -> io::Result<u32> {
    Ok(u32::from_le_bytes(read_array(reader, Some(hasher))?))
}

fn read_u64<R: Read>(reader: &mut R, hasher: &mut Hasher) -> io::Result<u64> {
    Ok(u64::from_le_bytes(read_array(reader, Some(hasher))?))
}

fn read_f64<R: Read>(reader: &mut R, hasher: &mut Hasher) -> io::Result<f64> {
    Ok(f64::from_le_bytes(read_array(reader, Some(hasher))?))
}

fn to_u32(value: usize, what: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| LpqError::InvalidPersistence(what))
}

fn usize_from_u64(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| LpqError::InvalidPersistence("value exceeds platform limits"))
}

impl KdIndex {
    /// Persist the tree topology to the provided filesystem path.
    ///
    /// Returns the number of bytes written.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        let file = File::create(path)?;
        self.save_to_writer(file)
    }

    /// Persist the tree topology using the supplied writer.
    pub fn save_to_writer<W: Write>(&self, writer: W) -> Result<u64> {
        let mut writer = CountingWriter {
            inner: BufWriter::new(writer),
            written: 0,
        };
        let mut hasher = Hasher::new();
        writer.write_all(&PERSIST_MAGIC)?;
        writer.write_all(&PERSIST_VERSION.to_le_bytes())?;

        write_u8(&mut writer, self.metric.tag(), &mut hasher)?;
        write_u32(&mut writer, to_u32(self.dim(), "dimension exceeds persistence limits")?, &mut hasher)?;
        write_u32(
            &mut writer,
            to_u32(self.group_width(), "group width exceeds persistence limits")?,
            &mut hasher,
        )?;
        write_u32(&mut writer, to_u32(self.leaf_size, "leaf size exceeds persistence limits")?, &mut hasher)?;
        write_u64(&mut writer, self.len() as u64, &mut hasher)?;
        write_u64(&mut writer, self.nodes.len() as u64, &mut hasher)?;

        for &idx in &self.indices {
            write_u32(&mut writer, idx, &mut hasher)?;
        }

        for (i, node) in self.nodes.iter().enumerate() {
            match *node {
                KdNode::Leaf { start, end } => {
                    write_u8(&mut writer, TAG_LEAF, &mut hasher)?;
                    write_u32(&mut writer, start, &mut hasher)?;
                    write_u32(&mut writer, end, &mut hasher)?;
                }
                KdNode::Internal { axis, split, left, right } => {
                    write_u8(&mut writer, TAG_INTERNAL, &mut hasher)?;
                    write_u32(&mut writer, axis, &mut hasher)?;
                    write_f64(&mut writer, split, &mut hasher)?;
                    write_u32(&mut writer, left, &mut hasher)?;
                    write_u32(&mut writer, right, &mut hasher)?;
                }
            }
            let (min, max) = self.node_bounds(i as u32);
            for &v in min.iter().chain(max) {
                write_f64(&mut writer, v, &mut hasher)?;
            }
        }

        let checksum = hasher.finalize();
        writer.write_all(&checksum.to_le_bytes())?;
        writer.flush()?;

        log::debug!("saved {} kd-tree topology: {} nodes, {} bytes", self.metric, self.nodes.len(), writer.written);
        Ok(writer.written)
    }

    /// Load a tree topology from the provided filesystem path and bind it to
    /// `coords`, the row-major points the index was built from.
    pub fn load_from_path<P: AsRef<Path>>(path: P, coords: Vec<f64>) -> Result<Self> {
        let file = File::open(path)?;
        Self::load_from_reader(file, coords)
    }

    /// Load a tree topology from a persisted byte stream.
    ///
    /// Only structural consistency is checked: the header, the checksum, that
    /// `coords` holds as many rows as were indexed, and that every offset lies
    /// in bounds. Supplying different points of the same shape is not
    /// detected and yields meaningless search results.
    pub fn load_from_reader<R: Read>(reader: R, coords: Vec<f64>) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        let magic: [u8; 4] = read_array(&mut reader, None)?;
        if magic != PERSIST_MAGIC {
            return Err(LpqError::InvalidPersistence("unrecognized file header"));
        }
        let version = u32::from_le_bytes(read_array(&mut reader, None)?);
        if version != PERSIST_VERSION {
            return Err(LpqError::InvalidPersistence("unsupported index format version"));
        }

        let mut hasher = Hasher::new();
        let metric = MetricKind::from_tag(read_u8(&mut reader, &mut hasher)?)
            .ok_or(LpqError::InvalidPersistence("unknown metric tag"))?;
        let dim = read_u32(&mut reader, &mut hasher)? as usize;
        let group_width = read_u32(&mut reader, &mut hasher)? as usize;
        let leaf_size = read_u32(&mut reader, &mut hasher)? as usize;
        if leaf_size == 0 {
            return Err(LpqError::InvalidPersistence("leaf size must be positive"));
        }
        let count = usize_from_u64(read_u64(&mut reader, &mut hasher)?)?;
        let node_count = usize_from_u64(read_u64(&mut reader, &mut hasher)?)?;

        let points = PointSet::new(coords, dim, group_width)?;
        if points.rows() != count {
            return Err(LpqError::InvalidDimension(format!(
                "index was built over {count} points, {} supplied",
                points.rows()
            )));
        }
        // n points give at most n leaves, hence at most 2n - 1 nodes
        if (count == 0) != (node_count == 0) || node_count > 2 * count {
            return Err(LpqError::InvalidPersistence("node count does not match point count"));
        }

        let mut seen = vec![false; count];
        let mut indices = Vec::with_capacity(count);
        for _ in 0..count {
            let idx = read_u32(&mut reader, &mut hasher)?;
            match seen.get_mut(idx as usize) {
                Some(flag) if !*flag => *flag = true,
                _ => return Err(LpqError::InvalidPersistence("point permutation is corrupt")),
            }
            indices.push(idx);
        }

        let mut nodes = Vec::with_capacity(node_count);
        let mut bounds = Vec::with_capacity(node_count * 2 * dim);
        for i in 0..node_count {
            let node = match read_u8(&mut reader, &mut hasher)? {
                TAG_LEAF => {
                    let start = read_u32(&mut reader, &mut hasher)?;
                    let end = read_u32(&mut reader, &mut hasher)?;
                    if start > end || end as usize > count {
                        return Err(LpqError::InvalidPersistence("leaf range out of bounds"));
                    }
                    KdNode::Leaf { start, end }
                }
                TAG_INTERNAL => {
                    let axis = read_u32(&mut reader, &mut hasher)?;
                    let split = read_f64(&mut reader, &mut hasher)?;
                    let left = read_u32(&mut reader, &mut hasher)?;
                    let right = read_u32(&mut reader, &mut hasher)?;
                    // Pre-order: children always follow their parent
                    let in_bounds = |child: u32| (child as usize) > i && (child as usize) < node_count;
                    if axis as usize >= dim || !in_bounds(left) || !in_bounds(right) {
                        return Err(LpqError::InvalidPersistence("internal node out of bounds"));
                    }
                    KdNode::Internal { axis, split, left, right }
                }
                _ => return Err(LpqError::InvalidPersistence("unknown node tag")),
            };
            nodes.push(node);
            for _ in 0..2 * dim {
                bounds.push(read_f64(&mut reader, &mut hasher)?);
            }
        }

        let expected = hasher.finalize();
        let stored = u32::from_le_bytes(read_array(&mut reader, None)?);
        if stored != expected {
            return Err(LpqError::InvalidPersistence("checksum mismatch"));
        }

        log::debug!("loaded {} kd-tree topology: {} points, {} nodes", metric, count, node_count);
        Ok(KdIndex {
            points,
            metric,
            leaf_size,
            nodes,
            bounds,
            indices,
        })
    }
}
