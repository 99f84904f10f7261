//! Headless driver that keeps buffer contents in memory and journals calls.
//!
//! Useful as the driver for backends with no batching hardware (capture,
//! software rasterization fed from the journal) and for verifying exactly
//! what the batching core submits.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::batch::{InstanceRecord, Vertex, UNIFORM_BATCH_INSTANCES};
use crate::coords::Rect;

use super::{
    BackendDriver, BackendError, BackendResult, BufferHandle, BufferRegion, BufferUsage,
    Capabilities, FrameUniforms, IndexedDraw, InstancedDraw, TextureId, VertexLayout,
};

/// One driver call, in the order it was made.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    SetFrameUniforms(FrameUniforms),
    BindTexture { texture: TextureId, slot: u32 },
    SetScissor(Option<Rect>),
    AllocateBuffer { buffer: BufferHandle, usage: BufferUsage, capacity: u64 },
    DestroyBuffer(BufferHandle),
    ReleaseTexture(TextureId),
    WriteBuffer { buffer: BufferHandle, offset: u64, len: u64 },
    UploadInstanceUniforms { count: u32 },
    Submit(Submission),
}

/// Decoded contents of one submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionKind {
    Geometry { vertices: Vec<Vertex>, indices: Vec<u32> },
    UniformArray { instances: Vec<InstanceRecord>, index_count: u32 },
    Instanced { instances: Vec<InstanceRecord> },
}

/// A submission plus the binding state it was issued under.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub kind: SubmissionKind,
    /// Texture held by each unit at submit time.
    pub textures: Vec<Option<TextureId>>,
    pub scissor: Option<Rect>,
}

impl Submission {
    /// Indices of a geometry submission; empty for instance submissions.
    pub fn indices(&self) -> &[u32] {
        match &self.kind {
            SubmissionKind::Geometry { indices, .. } => indices,
            _ => &[],
        }
    }

    /// Vertices of a geometry submission; empty for instance submissions.
    pub fn vertices(&self) -> &[Vertex] {
        match &self.kind {
            SubmissionKind::Geometry { vertices, .. } => vertices,
            _ => &[],
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices().len()
    }

    /// Instance records of an instanced or uniform-array submission.
    pub fn instances(&self) -> &[InstanceRecord] {
        match &self.kind {
            SubmissionKind::UniformArray { instances, .. } | SubmissionKind::Instanced { instances } => {
                instances
            }
            SubmissionKind::Geometry { .. } => &[],
        }
    }

    /// Quads drawn, assuming geometry submissions contain only quads.
    pub fn quad_count(&self) -> usize {
        match &self.kind {
            SubmissionKind::Geometry { indices, .. } => indices.len() / 6,
            SubmissionKind::UniformArray { index_count, .. } => *index_count as usize / 6,
            SubmissionKind::Instanced { instances } => instances.len(),
        }
    }

    #[inline]
    pub fn texture_in_slot(&self, slot: u32) -> Option<TextureId> {
        self.textures.get(slot as usize).copied().flatten()
    }
}

/// Shared view of a [`RecordingDriver`]'s call log.
///
/// Cloning is cheap; every clone sees the same log, so a test can keep one
/// after handing the driver to a renderer.
#[derive(Debug, Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<DriverCall>>>);

impl Journal {
    fn push(&self, call: DriverCall) {
        self.0.borrow_mut().push(call);
    }

    /// Snapshot of every call so far.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.0.borrow().clone()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.0
            .borrow()
            .iter()
            .filter_map(|c| match c {
                DriverCall::Submit(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&DriverCall) -> bool) -> usize {
        self.0.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

#[derive(Debug)]
struct RecordedBuffer {
    data: Vec<u8>,
    retired: bool,
}

/// In-memory [`BackendDriver`].
#[derive(Debug)]
pub struct RecordingDriver {
    caps: Capabilities,
    journal: Journal,
    buffers: HashMap<BufferHandle, RecordedBuffer>,
    next_buffer: u32,
    units: Vec<Option<TextureId>>,
    scissor: Option<Rect>,
    uniforms: Vec<InstanceRecord>,
    auto_retire: bool,
    fail_next_submit: Option<BackendError>,
}

impl RecordingDriver {
    pub fn new(caps: Capabilities) -> Self {
        Self {
            caps,
            journal: Journal::default(),
            buffers: HashMap::new(),
            next_buffer: 0,
            units: vec![None; caps.max_texture_units as usize],
            scissor: None,
            uniforms: Vec::new(),
            auto_retire: true,
            fail_next_submit: None,
        }
    }

    /// With `false`, submitted buffers stay busy until [`retire_all`](Self::retire_all).
    #[must_use]
    pub fn with_auto_retire(mut self, auto_retire: bool) -> Self {
        self.auto_retire = auto_retire;
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// Simulates the device finishing all outstanding work.
    pub fn retire_all(&mut self) {
        for buffer in self.buffers.values_mut() {
            buffer.retired = true;
        }
    }

    /// Marks buffers as read by a submission, as if the device were still busy with them.
    pub fn mark_submitted(&mut self, buffers: &[BufferHandle]) {
        for handle in buffers {
            if let Some(buffer) = self.buffers.get_mut(handle) {
                buffer.retired = self.auto_retire;
            }
        }
    }

    /// Makes the next submission fail with `err`.
    pub fn fail_next_submit(&mut self, err: BackendError) {
        self.fail_next_submit = Some(err);
    }

    /// Buffers allocated and not yet destroyed.
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.data.as_slice())
    }

    fn region(&self, region: &BufferRegion) -> BackendResult<&[u8]> {
        let buffer = self
            .buffers
            .get(&region.buffer)
            .ok_or(BackendError::UnknownBuffer(region.buffer))?;
        let end = region.offset + region.len;
        if end > buffer.data.len() as u64 {
            return Err(BackendError::BufferOverflow {
                buffer: region.buffer,
                offset: region.offset,
                len: region.len,
                capacity: buffer.data.len() as u64,
            });
        }
        Ok(&buffer.data[region.offset as usize..end as usize])
    }

    fn record_submit(&mut self, kind: SubmissionKind, read: &[BufferHandle]) -> BackendResult<()> {
        if let Some(err) = self.fail_next_submit.take() {
            return Err(err);
        }
        self.mark_submitted(read);
        self.journal.push(DriverCall::Submit(Submission {
            kind,
            textures: self.units.clone(),
            scissor: self.scissor,
        }));
        Ok(())
    }
}

fn decode<T: bytemuck::Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

impl BackendDriver for RecordingDriver {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn set_per_frame_uniforms(&mut self, uniforms: &FrameUniforms) -> BackendResult<()> {
        self.journal.push(DriverCall::SetFrameUniforms(*uniforms));
        Ok(())
    }

    fn bind_texture(&mut self, texture: TextureId, slot: u32) -> BackendResult<()> {
        let unit = self
            .units
            .get_mut(slot as usize)
            .ok_or(BackendError::SlotOutOfRange { slot, max: self.caps.max_texture_units })?;
        *unit = Some(texture);
        self.journal.push(DriverCall::BindTexture { texture, slot });
        Ok(())
    }

    fn set_scissor(&mut self, clip: Option<Rect>) -> BackendResult<()> {
        self.scissor = clip;
        self.journal.push(DriverCall::SetScissor(clip));
        Ok(())
    }

    fn allocate_buffer(&mut self, usage: BufferUsage, capacity_bytes: u64) -> BackendResult<BufferHandle> {
        let buffer = BufferHandle(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(
            buffer,
            RecordedBuffer {
                data: vec![0; capacity_bytes as usize],
                retired: true,
            },
        );
        self.journal.push(DriverCall::AllocateBuffer { buffer, usage, capacity: capacity_bytes });
        Ok(buffer)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer).is_none() {
            log::warn!("destroy of unknown buffer {buffer:?}");
        }
        self.journal.push(DriverCall::DestroyBuffer(buffer));
    }

    fn release_texture(&mut self, texture: TextureId) {
        for unit in self.units.iter_mut().filter(|u| **u == Some(texture)) {
            *unit = None;
        }
        self.journal.push(DriverCall::ReleaseTexture(texture));
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, bytes: &[u8]) -> BackendResult<()> {
        let target = self
            .buffers
            .get_mut(&buffer)
            .ok_or(BackendError::UnknownBuffer(buffer))?;
        let end = offset + bytes.len() as u64;
        if end > target.data.len() as u64 {
            return Err(BackendError::BufferOverflow {
                buffer,
                offset,
                len: bytes.len() as u64,
                capacity: target.data.len() as u64,
            });
        }
        target.data[offset as usize..end as usize].copy_from_slice(bytes);
        self.journal.push(DriverCall::WriteBuffer { buffer, offset, len: bytes.len() as u64 });
        Ok(())
    }

    fn buffer_retired(&self, buffer: BufferHandle) -> bool {
        self.buffers.get(&buffer).is_none_or(|b| b.retired)
    }

    fn upload_instance_uniforms(&mut self, instances: &[InstanceRecord]) -> BackendResult<()> {
        if !self.caps.uniform_arrays {
            return Err(BackendError::Unsupported("uniform instance arrays"));
        }
        if instances.len() > UNIFORM_BATCH_INSTANCES {
            return Err(BackendError::Unsupported("more than 128 uniform instances per draw"));
        }
        self.uniforms.clear();
        self.uniforms.extend_from_slice(instances);
        self.journal.push(DriverCall::UploadInstanceUniforms { count: instances.len() as u32 });
        Ok(())
    }

    fn submit_indexed(&mut self, draw: &IndexedDraw) -> BackendResult<()> {
        let vertex_bytes = self.region(&draw.vertices)?;
        let index_bytes = self.region(&draw.indices)?;
        let indices: Vec<u32> = decode(index_bytes);
        if indices.len() < draw.index_count as usize {
            return Err(BackendError::BufferOverflow {
                buffer: draw.indices.buffer,
                offset: draw.indices.offset,
                len: draw.index_count as u64 * 4,
                capacity: draw.indices.len,
            });
        }

        let kind = match draw.layout {
            VertexLayout::Geometry => SubmissionKind::Geometry {
                vertices: decode(vertex_bytes),
                indices: indices[..draw.index_count as usize].to_vec(),
            },
            VertexLayout::UniformTemplate => {
                let quads = (draw.index_count as usize / 6).min(self.uniforms.len());
                SubmissionKind::UniformArray {
                    instances: self.uniforms[..quads].to_vec(),
                    index_count: draw.index_count,
                }
            }
        };
        self.record_submit(kind, &[draw.vertices.buffer, draw.indices.buffer])
    }

    fn submit_instanced(&mut self, draw: &InstancedDraw) -> BackendResult<()> {
        if !self.caps.instancing {
            return Err(BackendError::Unsupported("hardware instancing"));
        }
        self.region(&draw.template_vertices)?;
        self.region(&draw.template_indices)?;
        let mut instances: Vec<InstanceRecord> = decode(self.region(&draw.instances)?);
        instances.truncate(draw.instance_count as usize);

        self.record_submit(
            SubmissionKind::Instanced { instances },
            &[draw.template_vertices.buffer, draw.template_indices.buffer, draw.instances.buffer],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_past_capacity_is_rejected() {
        let mut driver = RecordingDriver::new(Capabilities::software(1));
        let b = driver.allocate_buffer(BufferUsage::Vertex, 8).unwrap();
        let err = driver.write_buffer(b, 4, &[0; 8]).unwrap_err();
        assert!(matches!(err, BackendError::BufferOverflow { capacity: 8, .. }));
    }

    #[test]
    fn bind_outside_units_is_rejected() {
        let mut driver = RecordingDriver::new(Capabilities::software(2));
        assert_eq!(
            driver.bind_texture(TextureId(1), 2),
            Err(BackendError::SlotOutOfRange { slot: 2, max: 2 })
        );
    }

    #[test]
    fn software_driver_refuses_instancing() {
        let mut driver = RecordingDriver::new(Capabilities::software(1));
        let b = driver.allocate_buffer(BufferUsage::Instance, 64).unwrap();
        let region = BufferRegion::new(b, 0, 64);
        let draw = InstancedDraw {
            template_vertices: region,
            template_indices: region,
            instances: region,
            instance_count: 1,
        };
        assert_eq!(
            driver.submit_instanced(&draw),
            Err(BackendError::Unsupported("hardware instancing"))
        );
    }

    #[test]
    fn submissions_snapshot_bound_textures() {
        let mut driver = RecordingDriver::new(Capabilities::software(2));
        let journal = driver.journal();
        let vb = driver.allocate_buffer(BufferUsage::Vertex, 40).unwrap();
        let ib = driver.allocate_buffer(BufferUsage::Index, 12).unwrap();
        driver.write_buffer(ib, 0, bytemuck::cast_slice(&[0u32, 0, 0])).unwrap();
        driver.bind_texture(TextureId(7), 1).unwrap();
        driver
            .submit_indexed(&IndexedDraw {
                vertices: BufferRegion::new(vb, 0, 40),
                indices: BufferRegion::new(ib, 0, 12),
                index_count: 3,
                layout: VertexLayout::Geometry,
            })
            .unwrap();

        let subs = journal.submissions();
        assert_eq!(subs[0].texture_in_slot(1), Some(TextureId(7)));
        assert_eq!(subs[0].texture_in_slot(0), None);
        assert_eq!(subs[0].vertex_count(), 1);
    }

    #[test]
    fn busy_buffers_report_not_retired() {
        let mut driver = RecordingDriver::new(Capabilities::software(1)).with_auto_retire(false);
        let b = driver.allocate_buffer(BufferUsage::Vertex, 8).unwrap();
        assert!(driver.buffer_retired(b));
        driver.mark_submitted(&[b]);
        assert!(!driver.buffer_retired(b));
        driver.retire_all();
        assert!(driver.buffer_retired(b));
    }
}
