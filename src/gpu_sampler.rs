//! Raw slice sampling with a wgpu compute shader.
//!
//! The volume is uploaded once as an `R32Float` 3D texture; each request
//! reads back one display-oriented slice of raw values. Intensity windowing
//! stays on the CPU so both paths produce identical images.

use std::borrow::Cow;

use thiserror::Error;
use wgpu::{PollType, util::DeviceExt};

use crate::enums::Plane;
use crate::geometry::{Axis, Extent, PlaneGeometry};
use crate::slice_extractor::SliceError;
use crate::volume::{Volume, VolumeId};

const WORKGROUP_SIZE: u32 = 8;

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("GPU device request failed: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("GPU poll failed: {0}")]
    Poll(#[from] wgpu::PollError),

    #[error("readback mapping failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    #[error("readback was cancelled")]
    Cancelled(#[from] futures::channel::oneshot::Canceled),

    #[error("sampler was built for a different volume")]
    VolumeMismatch,

    #[error(transparent)]
    Slice(#[from] SliceError),
}

/// Device and queue shared by every GPU consumer of a viewer.
#[derive(Clone, Debug)]
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    pub async fn request() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await?;
        log::info!("using GPU adapter {}", adapter.get_info().name);
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await?;
        Ok(Self { device, queue })
    }
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Uniforms {
    slice_index: u32,
    fixed_axis: u32,
    column_axis: u32,
    row_axis: u32,
    flip_rows: u32,
    output_width: u32,
    output_height: u32,
    _padding: u32,
}

fn axis_code(axis: Axis) -> u32 {
    match axis {
        Axis::X => 0,
        Axis::Y => 1,
        Axis::Z => 2,
    }
}

pub struct GpuSliceSampler {
    context: GpuContext,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    volume_view: wgpu::TextureView,
    volume_id: VolumeId,
    extent: Extent,
}

impl GpuSliceSampler {
    pub fn new(context: GpuContext, volume: &Volume) -> Self {
        let GpuContext { device, queue } = &context;
        let extent = volume.extent();
        let texture_size = wgpu::Extent3d {
            width: extent.x as u32,
            height: extent.y as u32,
            depth_or_array_layers: extent.z as u32,
        };

        let volume_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Volume 3D Texture"),
            size: texture_size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        // (z, y, x) standard layout is exactly x-fastest texel order.
        let contiguous = volume.data().as_standard_layout();
        let voxels: Cow<'_, [f32]> = match contiguous.as_slice() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(contiguous.iter().copied().collect()),
        };
        queue.write_texture(
            wgpu::TexelCopyTextureInfoBase {
                texture: &volume_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&voxels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(extent.x as u32 * std::mem::size_of::<f32>() as u32),
                rows_per_image: Some(extent.y as u32),
            },
            texture_size,
        );
        let volume_view = volume_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Slice Sample Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!(
                "shaders/slice_sample.wgsl"
            ))),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Slice Sample Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        // R32Float is not filterable; texels are fetched directly.
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Slice Sample Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Slice Sample Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        log::debug!(
            "uploaded {}x{}x{} volume to GPU",
            extent.x,
            extent.y,
            extent.z
        );
        Self {
            context,
            pipeline,
            bind_group_layout,
            volume_view,
            volume_id: volume.id(),
            extent,
        }
    }

    pub fn volume_id(&self) -> VolumeId {
        self.volume_id
    }

    /// Raw, display-oriented values of one slice, row-major.
    pub async fn sample_slice(&self, index: usize, plane: Plane) -> Result<Vec<f32>, GpuError> {
        let geometry = PlaneGeometry::of(plane);
        let count = geometry.slice_count(&self.extent);
        if index >= count {
            return Err(SliceError::OutOfRange { plane, index, count }.into());
        }
        let (width, height) = geometry.output_dimensions(&self.extent);
        let (width, height) = (width as u32, height as u32);
        let GpuContext { device, queue } = &self.context;

        let uniforms = Uniforms {
            slice_index: index as u32,
            fixed_axis: axis_code(geometry.fixed),
            column_axis: axis_code(geometry.column),
            row_axis: axis_code(geometry.row),
            flip_rows: geometry.flip_rows as u32,
            output_width: width,
            output_height: height,
            _padding: 0,
        };
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Slice Uniform Buffer"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let output_bytes = (width * height) as u64 * std::mem::size_of::<f32>() as u64;
        let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Slice Output Buffer"),
            size: output_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Slice Staging Buffer"),
            size: output_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Slice Sample Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&self.volume_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: output_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Slice Sample Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Slice Sample Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(
                width.div_ceil(WORKGROUP_SIZE),
                height.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }
        encoder.copy_buffer_to_buffer(&output_buffer, 0, &staging_buffer, 0, output_bytes);
        queue.submit(Some(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device.poll(PollType::Wait {
            submission_index: None,
            timeout: None,
        })?;
        receiver.await??;

        let values = {
            let mapped = buffer_slice.get_mapped_range();
            bytemuck::cast_slice::<u8, f32>(&mapped).to_vec()
        };
        staging_buffer.unmap();
        Ok(values)
    }
}
