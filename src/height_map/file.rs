//! HMP1 binary height-map files.
//!
//! Layout, native byte order:
//!
//! ```text
//! u32 type_id            'HMP1'
//! f32 x0, y0, z0
//! f32 dx, dy
//! i32 x_samples, y_samples
//! f32 x_len, y_len
//! f32 heights[n]         row-major, n = x_samples * y_samples
//! f32 normals[n][3]
//! i8  initialized[n]
//! ```

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{error, info, warn};

use super::{HeightMap, DEFAULT_GAUSS_EPS, DEFAULT_GAUSS_SIGMA};
use crate::error::{TesseraError, TesseraResult};

/// The four magic bytes read as a big-endian integer.
pub const HMP1_TYPE_ID: u32 = u32::from_be_bytes(*b"HMP1");

/// File header, exactly as stored on disk.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Hmp1Header {
    pub type_id: u32,
    pub x0: f32,
    pub y0: f32,
    pub z0: f32,
    pub dx: f32,
    pub dy: f32,
    pub x_samples: i32,
    pub y_samples: i32,
    pub x_len: f32,
    pub y_len: f32,
}

impl Hmp1Header {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    fn check_type_id(&self) -> TesseraResult<()> {
        if self.type_id == HMP1_TYPE_ID {
            Ok(())
        } else if self.type_id == HMP1_TYPE_ID.swap_bytes() {
            Err(TesseraError::Endianness)
        } else {
            Err(TesseraError::CorruptHeader(self.type_id))
        }
    }
}

fn read_block(reader: &mut impl Read, dst: &mut [u8]) -> TesseraResult<()> {
    let mut filled = 0;
    while filled < dst.len() {
        match reader.read(&mut dst[filled..]) {
            Ok(0) => {
                return Err(TesseraError::Truncated {
                    expected: dst.len(),
                    actual: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Elements decoded per read, so a lying header cannot force a large
/// allocation before the body has actually arrived.
const READ_CHUNK: usize = 64 * 1024;

fn read_pod_vec<T: Pod>(reader: &mut impl Read, count: usize) -> TesseraResult<Vec<T>> {
    let size = std::mem::size_of::<T>();
    let mut out: Vec<T> = Vec::with_capacity(count.min(READ_CHUNK));
    let mut chunk = vec![T::zeroed(); count.min(READ_CHUNK)];
    while out.len() < count {
        let len = (count - out.len()).min(READ_CHUNK);
        let buf = &mut chunk[..len];
        read_block(reader, bytemuck::cast_slice_mut(buf)).map_err(|e| match e {
            TesseraError::Truncated { actual, .. } => TesseraError::Truncated {
                expected: count.saturating_mul(size),
                actual: out.len() * size + actual,
            },
            e => e,
        })?;
        out.extend_from_slice(buf);
    }
    Ok(out)
}

impl HeightMap {
    /// Header describing this map.
    pub fn header(&self) -> Hmp1Header {
        Hmp1Header {
            type_id: HMP1_TYPE_ID,
            x0: self.x0,
            y0: self.y0,
            z0: self.z0,
            dx: self.dx,
            dy: self.dy,
            x_samples: self.x_samples as i32,
            y_samples: self.y_samples as i32,
            x_len: self.x_len,
            y_len: self.y_len,
        }
    }

    /// Decode an HMP1 stream.
    ///
    /// The grid values are taken from the header as stored; the blur filter
    /// is off for loaded maps.
    pub fn read_from(mut reader: impl Read) -> TesseraResult<Self> {
        let mut header = Hmp1Header::zeroed();
        read_block(&mut reader, bytemuck::bytes_of_mut(&mut header))?;
        header.check_type_id()?;

        if header.x_samples < 2 || header.y_samples < 2 {
            return Err(TesseraError::InvalidGrid(format!(
                "header declares {}x{} samples",
                header.x_samples, header.y_samples
            )));
        }
        // The normal block is the largest: n * 3 floats.
        let n = (header.x_samples as usize)
            .checked_mul(header.y_samples as usize)
            .filter(|n| n.checked_mul(3 * std::mem::size_of::<f32>()).is_some())
            .ok_or_else(|| {
                TesseraError::InvalidGrid(format!(
                    "header declares {}x{} samples, too many to address",
                    header.x_samples, header.y_samples
                ))
            })?;

        let heights: Vec<f32> = read_pod_vec(&mut reader, n)?;
        let raw_normals: Vec<f32> = read_pod_vec(&mut reader, n * 3)?;
        let initialized: Vec<i8> = read_pod_vec(&mut reader, n)?;

        let normals = raw_normals
            .chunks_exact(3)
            .map(|c| Vec3::new(c[0], c[1], c[2]))
            .collect();

        Ok(Self {
            x0: header.x0,
            y0: header.y0,
            z0: header.z0,
            dx: header.dx,
            dy: header.dy,
            x_samples: header.x_samples as usize,
            y_samples: header.y_samples as usize,
            x_len: header.x_len,
            y_len: header.y_len,
            heights,
            normals,
            initialized,
            filter: false,
            gauss_sigma: DEFAULT_GAUSS_SIGMA,
            gauss_eps: DEFAULT_GAUSS_EPS,
        })
    }

    /// Encode as HMP1.
    pub fn write_to(&self, mut writer: impl Write) -> TesseraResult<()> {
        let raw_normals: Vec<f32> = self.normals.iter().flat_map(|n| n.to_array()).collect();
        writer.write_all(bytemuck::bytes_of(&self.header()))?;
        writer.write_all(bytemuck::cast_slice(&self.heights))?;
        writer.write_all(bytemuck::cast_slice(&raw_normals))?;
        writer.write_all(bytemuck::cast_slice(&self.initialized))?;
        writer.flush()?;
        Ok(())
    }

    /// Load an HMP1 file.
    pub fn load(path: impl AsRef<Path>) -> TesseraResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        match Self::read_from(std::io::BufReader::new(file)) {
            Ok(map) => {
                info!(
                    "Loaded {}x{} height map from {:?}",
                    map.x_samples, map.y_samples, path
                );
                Ok(map)
            }
            Err(e) => {
                error!("Could not read height map {:?}: {}", path, e);
                Err(e)
            }
        }
    }

    /// Write an HMP1 file. A failed write may leave a truncated file behind.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> TesseraResult<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)?;
        if let Err(e) = self.write_to(std::io::BufWriter::new(file)) {
            warn!("Height map file {:?} incomplete: {}", path, e);
            return Err(e);
        }
        Ok(())
    }
}
