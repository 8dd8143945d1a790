// renderer/material.rs

use crate::renderer::internal::buffers::MemoryAccounting;

/// Raw RGBA8 image supplied by the resource layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureImage {
    pub fn solid(color: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: color.to_vec(),
        }
    }

    /// Procedural checkerboard, `size` texels square.
    pub fn checkerboard(size: u32, checker_size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let checker_size = checker_size.max(1);
        let mut rgba = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let even = ((x / checker_size) + (y / checker_size)) % 2 == 0;
                rgba.extend_from_slice(if even { &color1 } else { &color2 });
            }
        }
        Self {
            width: size,
            height: size,
            rgba,
        }
    }

    /// Decodes any format the `image` crate understands (PNG, JPEG, ...).
    pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            width,
            height,
            rgba: rgba.into_raw(),
        })
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.rgba.len() == self.width as usize * self.height as usize * 4
    }
}

/// Textures of one material sub-range. Missing maps fall back to 1x1
/// defaults: white diffuse, flat normal, no specular.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialTextures {
    pub diffuse: Option<TextureImage>,
    pub normal: Option<TextureImage>,
    pub specular: Option<TextureImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextureSlot {
    Diffuse,
    Normal,
    Specular,
}

impl TextureSlot {
    fn format(self) -> wgpu::TextureFormat {
        match self {
            TextureSlot::Diffuse => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureSlot::Normal | TextureSlot::Specular => wgpu::TextureFormat::Rgba8Unorm,
        }
    }

    fn default_color(self) -> [u8; 4] {
        match self {
            TextureSlot::Diffuse => [255, 255, 255, 255],
            // (0, 0, 1) in tangent space
            TextureSlot::Normal => [128, 128, 255, 255],
            TextureSlot::Specular => [0, 0, 0, 255],
        }
    }

    fn label(self) -> &'static str {
        match self {
            TextureSlot::Diffuse => "DiffuseMap",
            TextureSlot::Normal => "NormalMap",
            TextureSlot::Specular => "SpecularMap",
        }
    }
}

/// Bind groups for every material of a renderable, indexed by the mesh
/// subset's material slot.
pub struct MaterialSet {
    bind_groups: Vec<wgpu::BindGroup>,
    textures: Vec<wgpu::Texture>,
    bytes: u64,
}

impl MaterialSet {
    /// Out-of-range slots reuse the last material.
    pub fn bind_group(&self, material: u32) -> &wgpu::BindGroup {
        let index = (material as usize).min(self.bind_groups.len() - 1);
        &self.bind_groups[index]
    }

    pub fn len(&self) -> usize {
        self.bind_groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bind_groups.is_empty()
    }

    pub(crate) fn release(&self, accounting: &mut MemoryAccounting) {
        for texture in &self.textures {
            texture.destroy();
        }
        accounting.release("MaterialSet", self.bytes);
    }
}

/// Layout and sampler shared by all material sets (geometry group 2).
pub(crate) struct MaterialBinder {
    pub(crate) layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

impl MaterialBinder {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("MaterialBindLayout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                texture_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("MaterialSampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self { layout, sampler }
    }

    pub(crate) fn create_set(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        materials: &[MaterialTextures],
        accounting: &mut MemoryAccounting,
    ) -> MaterialSet {
        let defaults = [MaterialTextures::default()];
        let materials = if materials.is_empty() {
            &defaults[..]
        } else {
            materials
        };

        let mut textures = Vec::with_capacity(materials.len() * 3);
        let mut bytes = 0;
        let mut bind_groups = Vec::with_capacity(materials.len());
        for material in materials {
            let slots = [
                (TextureSlot::Diffuse, material.diffuse.as_ref()),
                (TextureSlot::Normal, material.normal.as_ref()),
                (TextureSlot::Specular, material.specular.as_ref()),
            ];
            let views: Vec<wgpu::TextureView> = slots
                .into_iter()
                .map(|(slot, image)| {
                    let (texture, size) = upload_texture(device, queue, slot, image, accounting);
                    bytes += size;
                    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                    textures.push(texture);
                    view
                })
                .collect();

            bind_groups.push(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("MaterialBindGroup"),
                layout: &self.layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&views[0]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&views[1]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&views[2]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            }));
        }

        MaterialSet {
            bind_groups,
            textures,
            bytes,
        }
    }
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    slot: TextureSlot,
    image: Option<&TextureImage>,
    accounting: &mut MemoryAccounting,
) -> (wgpu::Texture, u64) {
    let fallback;
    let image = match image {
        Some(image) if image.is_well_formed() => image,
        Some(image) => {
            log::warn!(
                "{} image {}x{} with {} bytes is malformed. Using default.",
                slot.label(),
                image.width,
                image.height,
                image.rgba.len()
            );
            fallback = TextureImage::solid(slot.default_color());
            &fallback
        }
        None => {
            fallback = TextureImage::solid(slot.default_color());
            &fallback
        }
    };

    let size = wgpu::Extent3d {
        width: image.width,
        height: image.height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(slot.label()),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: slot.format(),
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &image.rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * image.width),
            rows_per_image: Some(image.height),
        },
        size,
    );
    let bytes = image.rgba.len() as u64;
    accounting.acquire(slot.label(), bytes);

    (texture, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkerboard_alternates_cells() {
        let image = TextureImage::checkerboard(4, 2, [255; 4], [0, 0, 0, 255]);
        assert!(image.is_well_formed());
        assert_eq!(&image.rgba[0..4], &[255; 4]);
        // texel (2, 0) is in the second cell
        assert_eq!(&image.rgba[8..12], &[0, 0, 0, 255]);
        // texel (2, 2) is back to the first color
        assert_eq!(&image.rgba[(2 * 4 + 2) * 4..(2 * 4 + 2) * 4 + 4], &[255; 4]);
    }

    #[test]
    fn decode_reads_png_bytes() {
        let source = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let mut png = std::io::Cursor::new(Vec::new());
        source.write_to(&mut png, image::ImageFormat::Png).unwrap();

        let decoded = TextureImage::decode(png.get_ref()).unwrap();
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert!(decoded.is_well_formed());
        assert_eq!(&decoded.rgba[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(TextureImage::decode(b"definitely not an image").is_err());
    }

    #[test]
    fn malformed_images_are_detected() {
        let image = TextureImage {
            width: 2,
            height: 2,
            rgba: vec![0; 12],
        };
        assert!(!image.is_well_formed());
        assert!(TextureImage::solid([1, 2, 3, 4]).is_well_formed());
    }

    #[test]
    fn default_normal_points_out_of_the_surface() {
        assert_eq!(TextureSlot::Normal.default_color(), [128, 128, 255, 255]);
    }
}
