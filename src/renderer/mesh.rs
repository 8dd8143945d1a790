use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use wgpu::util::DeviceExt;

use crate::error::MeshDecodeError;
use crate::renderer::internal::buffers::MemoryAccounting;
use crate::renderer::renderable::Aabb;
use crate::renderer::Vertex;

pub const MODEL_MAGIC: [u8; 4] = *b"DPMB";
pub const MODEL_VERSION: u32 = 1;
const HEADER_LEN: usize = 20;

/// Range of the index buffer drawn with one material of the renderable's
/// material set.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct MeshSubset {
    pub start: u32,
    pub count: u32,
    pub material: u32,
}

/// CPU-side mesh, as decoded from a model buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub subsets: Vec<MeshSubset>,
}

impl MeshData {
    pub fn single_subset(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        let subsets = vec![MeshSubset {
            start: 0,
            count: indices.len() as u32,
            material: 0,
        }];
        Self {
            vertices,
            indices,
            subsets,
        }
    }

    /// Little-endian `DPMB` model buffer: header (magic, version, vertex,
    /// index and subset counts) followed by the three arrays.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            HEADER_LEN
                + std::mem::size_of_val(self.vertices.as_slice())
                + std::mem::size_of_val(self.indices.as_slice())
                + std::mem::size_of_val(self.subsets.as_slice()),
        );
        bytes.extend_from_slice(&MODEL_MAGIC);
        for word in [
            MODEL_VERSION,
            self.vertices.len() as u32,
            self.indices.len() as u32,
            self.subsets.len() as u32,
        ] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        bytes.extend_from_slice(bytemuck::cast_slice(&self.vertices));
        bytes.extend_from_slice(bytemuck::cast_slice(&self.indices));
        bytes.extend_from_slice(bytemuck::cast_slice(&self.subsets));
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MeshDecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(MeshDecodeError::Truncated(bytes.len()));
        }
        if bytes[0..4] != MODEL_MAGIC {
            return Err(MeshDecodeError::BadMagic);
        }
        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let version = word(4);
        if version != MODEL_VERSION {
            return Err(MeshDecodeError::UnsupportedVersion(version));
        }
        let vertex_count = word(8) as usize;
        let index_count = word(12) as usize;
        let subset_count = word(16) as usize;

        let vertex_bytes = vertex_count * std::mem::size_of::<Vertex>();
        let index_bytes = index_count * std::mem::size_of::<u32>();
        let subset_bytes = subset_count * std::mem::size_of::<MeshSubset>();
        let expected = HEADER_LEN + vertex_bytes + index_bytes + subset_bytes;
        if bytes.len() != expected {
            return Err(MeshDecodeError::LengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }

        let body = &bytes[HEADER_LEN..];
        let (vertex_region, rest) = body.split_at(vertex_bytes);
        let (index_region, subset_region) = rest.split_at(index_bytes);

        let mesh = Self {
            vertices: read_records(vertex_region),
            indices: read_records(index_region),
            subsets: read_records(subset_region),
        };
        mesh.check()?;
        Ok(mesh)
    }

    fn check(&self) -> Result<(), MeshDecodeError> {
        let vertex_count = self.vertices.len() as u32;
        if let Some(&index) = self.indices.iter().find(|&&index| index >= vertex_count) {
            return Err(MeshDecodeError::IndexOutOfRange {
                index,
                vertex_count,
            });
        }

        let index_count = self.indices.len() as u32;
        for (subset_index, subset) in self.subsets.iter().enumerate() {
            let end = subset.start.saturating_add(subset.count);
            if end > index_count {
                return Err(MeshDecodeError::SubsetOutOfRange {
                    subset: subset_index,
                    start: subset.start,
                    end,
                    index_count,
                });
            }
        }
        Ok(())
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter().map(|vertex| Vec3::from(vertex.pos)))
    }
}

// The byte regions are not guaranteed to be aligned for `T`.
fn read_records<T: Pod>(region: &[u8]) -> Vec<T> {
    region
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

/// Mesh resident on the GPU.
pub struct Mesh {
    pub vbuf: wgpu::Buffer,
    pub ibuf: wgpu::Buffer,
    pub index_count: u32,
    pub subsets: Vec<MeshSubset>,
    pub bounds: Aabb,
    bytes: u64,
}

impl Mesh {
    pub(crate) fn upload(
        device: &wgpu::Device,
        label: &str,
        data: &MeshData,
        accounting: &mut MemoryAccounting,
    ) -> Self {
        let vbuf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let ibuf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let bytes = (std::mem::size_of_val(data.vertices.as_slice())
            + std::mem::size_of_val(data.indices.as_slice())) as u64;
        accounting.acquire(label, bytes);

        let subsets = if data.subsets.is_empty() {
            vec![MeshSubset {
                start: 0,
                count: data.indices.len() as u32,
                material: 0,
            }]
        } else {
            data.subsets.clone()
        };

        Self {
            vbuf,
            ibuf,
            index_count: data.indices.len() as u32,
            subsets,
            bounds: data.bounds(),
            bytes,
        }
    }

    pub(crate) fn release(&self, accounting: &mut MemoryAccounting) {
        self.vbuf.destroy();
        self.ibuf.destroy();
        accounting.release("Mesh", self.bytes);
    }
}
