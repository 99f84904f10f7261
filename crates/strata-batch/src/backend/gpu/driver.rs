use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::backend::{
    BackendDriver, BackendError, BackendResult, BufferHandle, BufferRegion, BufferUsage,
    Capabilities, FrameUniforms, IndexedDraw, InstancedDraw, TextureId, VertexLayout,
};
use crate::batch::{InstanceRecord, Vertex, UNIFORM_BATCH_INSTANCES};
use crate::coords::{Rect, Viewport};

use super::pipelines::{Pipelines, INSTANCE_ARRAY_BYTES};
use super::scissor::logical_clip_to_scissor;
use super::TEXTURE_BINDINGS;

/// Construction parameters for [`WgpuDriver`].
#[derive(Debug, Clone)]
pub struct WgpuDriverConfig {
    /// Units exposed to the batching core. Clamped to `TEXTURE_BINDINGS`.
    pub max_texture_units: u32,

    /// Prefix for wgpu object labels.
    pub label: &'static str,
}

impl Default for WgpuDriverConfig {
    fn default() -> Self {
        Self {
            max_texture_units: TEXTURE_BINDINGS,
            label: "strata",
        }
    }
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    /// Bytes requested by the caller (the allocation may be padded).
    capacity: u64,
    /// Submissions reading this buffer that the device has not finished.
    pending: Arc<AtomicUsize>,
}

struct RegisteredTexture {
    view: wgpu::TextureView,
    /// Set when the driver created the texture itself.
    owned: Option<wgpu::Texture>,
}

struct Target {
    view: wgpu::TextureView,
    viewport: Viewport,
}

/// Shared handle to the view a [`WgpuDriver`] draws into.
///
/// The driver usually ends up owned by a renderer; keep a clone of this
/// handle to retarget it every frame.
#[derive(Clone, Default)]
pub struct RenderTarget(Rc<RefCell<Option<Target>>>);

impl RenderTarget {
    /// Render target for subsequent submissions.
    pub fn set(&self, view: wgpu::TextureView, viewport: Viewport) {
        *self.0.borrow_mut() = Some(Target { view, viewport });
    }

    /// Drops the current view (before presenting the surface texture).
    pub fn clear(&self) {
        self.0.borrow_mut().take();
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.0.borrow().as_ref().map(|t| t.viewport)
    }
}

/// Batching driver on top of a wgpu device.
///
/// The caller owns the surface: each frame it hands the driver a target view
/// with [`set_target`](Self::set_target), and submissions draw into it with
/// `LoadOp::Load`.
pub struct WgpuDriver {
    device: wgpu::Device,
    queue: wgpu::Queue,
    label: &'static str,
    caps: Capabilities,
    pipelines: Pipelines,

    frame_ubo: wgpu::Buffer,
    instance_ubo: wgpu::Buffer,
    sampler: wgpu::Sampler,
    white: wgpu::TextureView,

    textures: HashMap<TextureId, RegisteredTexture>,
    next_texture: u64,
    buffers: HashMap<BufferHandle, GpuBuffer>,
    next_buffer: u32,

    units: Vec<Option<TextureId>>,
    bind_group: Option<wgpu::BindGroup>,
    scissor: Option<Rect>,
    target: RenderTarget,
}

impl WgpuDriver {
    /// Builds pipelines for `format` and the fixed per-driver resources.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        format: wgpu::TextureFormat,
        config: WgpuDriverConfig,
    ) -> Self {
        let label = config.label;
        let max_texture_units = config.max_texture_units.clamp(1, TEXTURE_BINDINGS);
        if max_texture_units != config.max_texture_units {
            log::warn!(
                "WgpuDriver: {} texture units requested, shader exposes {TEXTURE_BINDINGS}; using {max_texture_units}",
                config.max_texture_units
            );
        }

        let limits = device.limits();
        let max_vertices = (limits.max_buffer_size / std::mem::size_of::<Vertex>() as u64)
            .min(u32::MAX as u64) as u32;
        let max_indices = (limits.max_buffer_size / 4).min(u32::MAX as u64) as u32;
        let caps = Capabilities {
            instancing: true,
            uniform_arrays: true,
            max_texture_units,
            max_vertices,
            max_indices,
        };

        let pipelines = Pipelines::new(&device, format, label);

        let frame_ubo = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label} frame ubo")),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&frame_ubo, 0, bytemuck::bytes_of(&FrameUniforms::IDENTITY));

        let instance_ubo = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label} instance array ubo")),
            size: INSTANCE_ARRAY_BYTES,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{label} sampler")),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let white = upload_rgba8(&device, &queue, &format!("{label} white"), 1, 1, &[255; 4])
            .create_view(&wgpu::TextureViewDescriptor::default());

        log::debug!("WgpuDriver: created for {format:?} with {max_texture_units} texture units");

        Self {
            device,
            queue,
            label,
            caps,
            pipelines,
            frame_ubo,
            instance_ubo,
            sampler,
            white,
            textures: HashMap::new(),
            next_texture: 1,
            buffers: HashMap::new(),
            next_buffer: 0,
            units: vec![None; TEXTURE_BINDINGS as usize],
            bind_group: None,
            scissor: None,
            target: RenderTarget::default(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Registers an externally owned texture view for use with `bind_texture`.
    pub fn register_texture(&mut self, view: wgpu::TextureView) -> TextureId {
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(id, RegisteredTexture { view, owned: None });
        id
    }

    /// Creates and registers an sRGB RGBA8 texture from premultiplied pixels.
    pub fn create_texture_rgba8(&mut self, width: u32, height: u32, rgba: &[u8]) -> BackendResult<TextureId> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(BackendError::Device(format!(
                "texture data is {} bytes, {width}x{height} RGBA8 needs {expected}",
                rgba.len()
            )));
        }
        let id = TextureId(self.next_texture);
        let texture = upload_rgba8(
            &self.device,
            &self.queue,
            &format!("{} texture {}", self.label, id.0),
            width,
            height,
            rgba,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.next_texture += 1;
        self.textures.insert(id, RegisteredTexture { view, owned: Some(texture) });
        Ok(id)
    }

    /// Handle sharing this driver's render target.
    pub fn target(&self) -> RenderTarget {
        self.target.clone()
    }

    pub fn set_target(&mut self, view: wgpu::TextureView, viewport: Viewport) {
        self.target.set(view, viewport);
    }

    pub fn clear_target(&mut self) {
        self.target.clear();
    }

    /// Runs pending `on_submitted_work_done` callbacks.
    pub fn poll(&self) {
        if let Err(err) = self.device.poll(wgpu::PollType::Poll) {
            log::warn!("WgpuDriver: device poll failed: {err}");
        }
    }

    fn buffer(&self, handle: BufferHandle) -> BackendResult<&GpuBuffer> {
        self.buffers.get(&handle).ok_or(BackendError::UnknownBuffer(handle))
    }

    fn ensure_bind_group(&mut self) {
        if self.bind_group.is_some() {
            return;
        }

        let views: Vec<&wgpu::TextureView> = self
            .units
            .iter()
            .map(|unit| {
                unit.and_then(|id| self.textures.get(&id))
                    .map_or(&self.white, |t| &t.view)
            })
            .collect();

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: self.frame_ubo.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: self.instance_ubo.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        entries.extend(views.iter().enumerate().map(|(unit, view)| wgpu::BindGroupEntry {
            binding: 3 + unit as u32,
            resource: wgpu::BindingResource::TextureView(view),
        }));

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} batch bind group", self.label)),
            layout: &self.pipelines.bind_group_layout,
            entries: &entries,
        });
        self.bind_group = Some(bind_group);
    }

    /// Encodes one pass into the current target and submits it.
    ///
    /// Skips the draw (successfully) when the scissor clips everything.
    fn submit_pass(
        &mut self,
        name: &str,
        reads: &[BufferHandle],
        record: impl FnOnce(&mut wgpu::RenderPass<'_>, &HashMap<BufferHandle, GpuBuffer>),
    ) -> BackendResult<()> {
        for &handle in reads {
            self.buffer(handle)?;
        }
        let viewport = self.target.viewport().ok_or(BackendError::NoTarget)?;
        let Some((sx, sy, sw, sh)) = logical_clip_to_scissor(self.scissor, viewport) else {
            return Ok(());
        };

        self.ensure_bind_group();
        let target = self.target.0.borrow();
        let target = target.as_ref().ok_or(BackendError::NoTarget)?;
        let bind_group = self
            .bind_group
            .as_ref()
            .ok_or_else(|| BackendError::Device("bind group unavailable".into()))?;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(&format!("{} {name} encoder", self.label)),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&format!("{} {name} pass", self.label)),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_bind_group(0, bind_group, &[]);
            pass.set_scissor_rect(sx, sy, sw, sh);
            record(&mut pass, &self.buffers);
        }

        let pending: Vec<Arc<AtomicUsize>> = reads
            .iter()
            .filter_map(|h| self.buffers.get(h))
            .map(|b| Arc::clone(&b.pending))
            .collect();
        for p in &pending {
            p.fetch_add(1, Ordering::AcqRel);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.queue.on_submitted_work_done(move || {
            for p in pending {
                p.fetch_sub(1, Ordering::AcqRel);
            }
        });
        Ok(())
    }
}

fn range(region: &BufferRegion) -> Range<u64> {
    region.offset..region.offset + region.len
}

fn upload_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> wgpu::Texture {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
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
        rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(height),
        },
        size,
    );
    texture
}

impl BackendDriver for WgpuDriver {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn set_per_frame_uniforms(&mut self, uniforms: &FrameUniforms) -> BackendResult<()> {
        self.poll();
        self.queue.write_buffer(&self.frame_ubo, 0, bytemuck::bytes_of(uniforms));
        Ok(())
    }

    fn bind_texture(&mut self, texture: TextureId, slot: u32) -> BackendResult<()> {
        if slot >= self.caps.max_texture_units {
            return Err(BackendError::SlotOutOfRange {
                slot,
                max: self.caps.max_texture_units,
            });
        }
        if !self.textures.contains_key(&texture) {
            return Err(BackendError::UnknownTexture(texture));
        }
        let unit = &mut self.units[slot as usize];
        if *unit != Some(texture) {
            *unit = Some(texture);
            self.bind_group = None;
        }
        Ok(())
    }

    fn set_scissor(&mut self, clip: Option<Rect>) -> BackendResult<()> {
        self.scissor = clip;
        Ok(())
    }

    fn allocate_buffer(&mut self, usage: BufferUsage, capacity_bytes: u64) -> BackendResult<BufferHandle> {
        let size = capacity_bytes
            .max(wgpu::COPY_BUFFER_ALIGNMENT)
            .next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        if size > self.device.limits().max_buffer_size {
            return Err(BackendError::Device(format!(
                "buffer of {size} bytes exceeds the device limit"
            )));
        }

        let (usages, kind) = match usage {
            BufferUsage::Vertex => (wgpu::BufferUsages::VERTEX, "vertex"),
            BufferUsage::Index => (wgpu::BufferUsages::INDEX, "index"),
            BufferUsage::Instance => (wgpu::BufferUsages::VERTEX, "instance"),
        };
        let handle = BufferHandle(self.next_buffer);
        self.next_buffer += 1;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{} {kind} buffer {}", self.label, handle.0)),
            size,
            usage: usages | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.buffers.insert(
            handle,
            GpuBuffer {
                buffer,
                capacity: capacity_bytes,
                pending: Arc::new(AtomicUsize::new(0)),
            },
        );
        Ok(handle)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        match self.buffers.remove(&buffer) {
            Some(b) => b.buffer.destroy(),
            None => log::warn!("WgpuDriver: destroy of unknown buffer {buffer:?}"),
        }
    }

    fn release_texture(&mut self, texture: TextureId) {
        let Some(registered) = self.textures.remove(&texture) else {
            log::warn!("WgpuDriver: release of unknown texture {texture:?}");
            return;
        };
        for unit in self.units.iter_mut().filter(|u| **u == Some(texture)) {
            *unit = None;
            self.bind_group = None;
        }
        if let Some(owned) = registered.owned {
            owned.destroy();
        }
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, bytes: &[u8]) -> BackendResult<()> {
        let target = self.buffer(buffer)?;
        let len = bytes.len() as u64;
        if offset + len > target.capacity {
            return Err(BackendError::BufferOverflow {
                buffer,
                offset,
                len,
                capacity: target.capacity,
            });
        }
        if len == 0 {
            return Ok(());
        }
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 || len % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(BackendError::Device(format!(
                "unaligned write of {len} bytes at offset {offset}"
            )));
        }
        self.queue.write_buffer(&target.buffer, offset, bytes);
        Ok(())
    }

    fn buffer_retired(&self, buffer: BufferHandle) -> bool {
        let Some(b) = self.buffers.get(&buffer) else {
            return true;
        };
        if b.pending.load(Ordering::Acquire) == 0 {
            return true;
        }
        self.poll();
        b.pending.load(Ordering::Acquire) == 0
    }

    fn upload_instance_uniforms(&mut self, instances: &[InstanceRecord]) -> BackendResult<()> {
        if instances.len() > UNIFORM_BATCH_INSTANCES {
            return Err(BackendError::Unsupported("more than 128 uniform instances per draw"));
        }
        self.queue.write_buffer(&self.instance_ubo, 0, bytemuck::cast_slice(instances));
        Ok(())
    }

    fn submit_indexed(&mut self, draw: &IndexedDraw) -> BackendResult<()> {
        if draw.index_count == 0 || draw.vertices.len == 0 {
            return Ok(());
        }
        let (name, pipeline) = match draw.layout {
            VertexLayout::Geometry => ("geometry", self.pipelines.geometry.clone()),
            VertexLayout::UniformTemplate => ("uniform-array", self.pipelines.uniform_template.clone()),
        };
        let draw = *draw;
        self.submit_pass(name, &[draw.vertices.buffer, draw.indices.buffer], |pass, buffers| {
            let (Some(vb), Some(ib)) = (buffers.get(&draw.vertices.buffer), buffers.get(&draw.indices.buffer)) else {
                return;
            };
            pass.set_pipeline(&pipeline);
            pass.set_vertex_buffer(0, vb.buffer.slice(range(&draw.vertices)));
            pass.set_index_buffer(ib.buffer.slice(range(&draw.indices)), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..draw.index_count, 0, 0..1);
        })
    }

    fn submit_instanced(&mut self, draw: &InstancedDraw) -> BackendResult<()> {
        if draw.instance_count == 0 {
            return Ok(());
        }
        let pipeline = self.pipelines.instanced.clone();
        let draw = *draw;
        let template_index_count = (draw.template_indices.len / 4) as u32;
        let reads = [
            draw.template_vertices.buffer,
            draw.template_indices.buffer,
            draw.instances.buffer,
        ];
        self.submit_pass("instanced", &reads, |pass, buffers| {
            let (Some(tv), Some(ti), Some(inst)) = (
                buffers.get(&draw.template_vertices.buffer),
                buffers.get(&draw.template_indices.buffer),
                buffers.get(&draw.instances.buffer),
            ) else {
                return;
            };
            pass.set_pipeline(&pipeline);
            pass.set_vertex_buffer(0, tv.buffer.slice(range(&draw.template_vertices)));
            pass.set_vertex_buffer(1, inst.buffer.slice(range(&draw.instances)));
            pass.set_index_buffer(ti.buffer.slice(range(&draw.template_indices)), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..template_index_count, 0, 0..draw.instance_count);
        })
    }
}
