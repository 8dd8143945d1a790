use std::marker::PhantomData;
use std::mem;

use bytemuck::Pod;
use wgpu::util::DeviceExt;

use crate::renderer::camera::ViewUniform;

/// Extra elements allocated beyond the requested count whenever a dynamic
/// buffer has to be reallocated.
pub(crate) const GROWTH_SLACK: usize = 5;

/// Running total of GPU memory owned by the pipeline.
#[derive(Debug, Default)]
pub(crate) struct MemoryAccounting {
    current: u64,
    peak: u64,
}

impl MemoryAccounting {
    pub(crate) fn acquire(&mut self, label: &str, bytes: u64) {
        self.current += bytes;
        self.peak = self.peak.max(self.current);
        log::debug!("{label}: +{bytes} bytes ({} total)", self.current);
    }

    pub(crate) fn release(&mut self, label: &str, bytes: u64) {
        if bytes > self.current {
            log::error!(
                "{label}: releasing {bytes} bytes but only {} are accounted",
                self.current
            );
        }
        self.current = self.current.saturating_sub(bytes);
        log::debug!("{label}: -{bytes} bytes ({} total)", self.current);
    }

    /// Accounts a destroy-and-recreate: the old allocation is released
    /// before the new one is acquired.
    pub(crate) fn reallocate(&mut self, label: &str, old_bytes: u64, new_bytes: u64) {
        self.release(label, old_bytes);
        self.acquire(label, new_bytes);
    }

    pub(crate) fn current(&self) -> u64 {
        self.current
    }

    pub(crate) fn peak(&self) -> u64 {
        self.peak
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reallocation {
    pub(crate) old_capacity: usize,
    pub(crate) new_capacity: usize,
}

/// CPU staging side of a dynamic GPU array. Tracks the capacity of the
/// backing buffer and decides when it must be reallocated.
#[derive(Debug)]
pub(crate) struct StagedArray<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T: Pod> StagedArray<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn extend_from_slice(&mut self, items: &[T]) {
        self.items.extend_from_slice(items);
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn items(&self) -> &[T] {
        &self.items
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn byte_capacity(&self) -> u64 {
        (self.capacity * mem::size_of::<T>()) as u64
    }

    /// Ensures the backing buffer can hold `required` elements. Returns the
    /// reallocation to perform, if any.
    pub(crate) fn reserve(&mut self, required: usize) -> Option<Reallocation> {
        if required <= self.capacity {
            return None;
        }
        let realloc = Reallocation {
            old_capacity: self.capacity,
            new_capacity: required + GROWTH_SLACK,
        };
        self.capacity = realloc.new_capacity;
        Some(realloc)
    }
}

/// Growable GPU array (instances, joints, lights). Bind groups that
/// reference it must be rebuilt whenever [`DynamicBuffer::upload`] reports
/// a reallocation.
pub(crate) struct DynamicBuffer<T> {
    label: &'static str,
    usage: wgpu::BufferUsages,
    staged: StagedArray<T>,
    buffer: wgpu::Buffer,
}

impl<T: Pod> DynamicBuffer<T> {
    pub(crate) fn new(
        device: &wgpu::Device,
        label: &'static str,
        usage: wgpu::BufferUsages,
        capacity: usize,
        accounting: &mut MemoryAccounting,
    ) -> Self {
        let usage = usage | wgpu::BufferUsages::COPY_DST;
        let staged = StagedArray::with_capacity(capacity);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: staged.byte_capacity(),
            usage,
            mapped_at_creation: false,
        });
        accounting.acquire(label, staged.byte_capacity());

        Self {
            label,
            usage,
            staged,
            buffer,
        }
    }

    pub(crate) fn staged_mut(&mut self) -> &mut StagedArray<T> {
        &mut self.staged
    }

    pub(crate) fn capacity(&self) -> usize {
        self.staged.capacity()
    }

    pub(crate) fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Grows the buffer if the staged items no longer fit, then uploads
    /// them. Returns true when the buffer was reallocated.
    pub(crate) fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        accounting: &mut MemoryAccounting,
    ) -> bool {
        let grown = match self.staged.reserve(self.staged.len()) {
            Some(realloc) => {
                log::info!(
                    "Growing {} buffer: {} -> {}",
                    self.label,
                    realloc.old_capacity,
                    realloc.new_capacity
                );
                let element = mem::size_of::<T>() as u64;
                self.buffer.destroy();
                accounting.reallocate(
                    self.label,
                    realloc.old_capacity as u64 * element,
                    realloc.new_capacity as u64 * element,
                );
                self.buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(self.label),
                    size: self.staged.byte_capacity(),
                    usage: self.usage,
                    mapped_at_creation: false,
                });
                true
            }
            None => false,
        };

        if self.staged.len() > 0 {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(self.staged.items()));
        }
        grown
    }

    pub(crate) fn release(&mut self, accounting: &mut MemoryAccounting) {
        self.buffer.destroy();
        accounting.release(self.label, self.staged.byte_capacity());
    }
}

/// Single uniform block written once per change.
pub(crate) struct UniformBuffer<T> {
    label: &'static str,
    buffer: wgpu::Buffer,
    _marker: PhantomData<T>,
}

impl<T: Pod> UniformBuffer<T> {
    pub(crate) fn new(
        device: &wgpu::Device,
        label: &'static str,
        value: &T,
        accounting: &mut MemoryAccounting,
    ) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(value),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        accounting.acquire(label, mem::size_of::<T>() as u64);
        Self {
            label,
            buffer,
            _marker: PhantomData,
        }
    }

    pub(crate) fn write(&self, queue: &wgpu::Queue, value: &T) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(value));
    }

    pub(crate) fn binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }

    pub(crate) fn release(&self, accounting: &mut MemoryAccounting) {
        self.buffer.destroy();
        accounting.release(self.label, mem::size_of::<T>() as u64);
    }
}

pub(crate) fn uniform_layout_entry<T>(
    binding: u32,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(mem::size_of::<T>() as u64),
        },
        count: None,
    }
}

pub(crate) fn storage_layout_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Camera block shared by every pass (group 0).
pub(crate) struct ViewBuffer {
    pub(crate) uniform: UniformBuffer<ViewUniform>,
    pub(crate) bind_group: wgpu::BindGroup,
    pub(crate) bind_layout: wgpu::BindGroupLayout,
}

impl ViewBuffer {
    pub(crate) fn new(
        device: &wgpu::Device,
        initial: &ViewUniform,
        accounting: &mut MemoryAccounting,
    ) -> Self {
        let uniform = UniformBuffer::new(device, "ViewBuffer", initial, accounting);

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ViewBindLayout"),
            entries: &[uniform_layout_entry::<ViewUniform>(
                0,
                wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            )],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ViewBindGroup"),
            layout: &bind_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.binding(),
            }],
        });

        Self {
            uniform,
            bind_group,
            bind_layout,
        }
    }

    /// Binds another view block (a shadow cascade's) with the camera layout.
    pub(crate) fn bind(
        &self,
        device: &wgpu::Device,
        label: &str,
        uniform: &UniformBuffer<ViewUniform>,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.bind_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.binding(),
            }],
        })
    }
}
