use crate::backend::{
    BackendDriver, BackendResult, BufferRegion, BufferUsage, IndexedDraw, VertexLayout,
};

use super::arena::Arena;
use super::limits::BatchLimits;
use super::mapped::MappedData;
use super::ring::BufferRing;
use super::vertex::Vertex;

/// Counts of one geometry submission.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct GeometrySubmit {
    pub vertices: u32,
    pub indices: u32,
    pub primitives: u32,
}

/// Raw vertex/index geometry accumulated through the reservation protocol.
///
/// Owns the vertex and index arenas and the ring of backing buffers their
/// contents are uploaded into at flush time.
#[derive(Debug)]
pub struct GeometryBatch {
    vertices: Arena<Vertex>,
    indices: Arena<u32>,
    primitives: u32,
    ring: BufferRing,
}

impl GeometryBatch {
    pub fn new(limits: &BatchLimits) -> Self {
        let (vertex_bytes, index_bytes) = limits.arena_bytes();
        Self {
            vertices: Arena::with_capacity(limits.max_vertices as usize),
            indices: Arena::with_capacity(limits.max_indices() as usize),
            primitives: 0,
            ring: BufferRing::new(&[
                (BufferUsage::Vertex, vertex_bytes),
                (BufferUsage::Index, index_bytes),
            ]),
        }
    }

    /// Session start: recycles buffers the device has finished with.
    pub fn begin(&mut self, driver: &dyn BackendDriver) {
        self.reset();
        self.ring.reclaim(driver);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.primitives == 0
    }

    /// Whether both arenas can take the request right now.
    #[inline]
    pub fn fits(&self, vertex_count: u32, index_count: u32) -> bool {
        self.vertices.remaining() >= vertex_count as usize
            && self.indices.remaining() >= index_count as usize
    }

    /// Reserves room in both arenas, or neither.
    ///
    /// `index_offset` of the returned view is the vertex cursor before this
    /// reservation.
    pub fn reserve(
        &mut self,
        vertex_count: u32,
        index_count: u32,
        texture_slot: Option<u32>,
    ) -> Option<MappedData<'_>> {
        if !self.fits(vertex_count, index_count) {
            return None;
        }
        let v = self.vertices.reserve(vertex_count as usize)?;
        let i = self.indices.reserve(index_count as usize)?;
        self.primitives += 1;

        let index_offset = v.start as u32;
        Some(MappedData {
            vertices: self.vertices.slice_mut(v),
            indices: self.indices.slice_mut(i),
            index_offset,
            texture_slot,
        })
    }

    /// Uploads the written prefix into a free buffer set and submits it.
    ///
    /// Returns `None` for an empty batch. The batch is reset whether or not
    /// the driver accepts the submission.
    pub fn submit(&mut self, driver: &mut dyn BackendDriver) -> BackendResult<Option<GeometrySubmit>> {
        if self.is_empty() {
            return Ok(None);
        }

        let summary = GeometrySubmit {
            vertices: self.vertices.len() as u32,
            indices: self.indices.len() as u32,
            primitives: self.primitives,
        };

        let set = match self.ring.acquire(driver) {
            Ok(set) => set,
            Err(err) => {
                self.reset();
                return Err(err);
            }
        };
        let (vb, ib) = (set[0], set[1]);

        let vertex_bytes = self.vertices.as_bytes();
        let index_bytes = self.indices.as_bytes();
        let draw = IndexedDraw {
            vertices: BufferRegion::new(vb, 0, vertex_bytes.len() as u64),
            indices: BufferRegion::new(ib, 0, index_bytes.len() as u64),
            index_count: summary.indices,
            layout: VertexLayout::Geometry,
        };

        let result = driver
            .write_buffer(vb, 0, vertex_bytes)
            .and_then(|()| driver.write_buffer(ib, 0, index_bytes))
            .and_then(|()| driver.submit_indexed(&draw));

        // Even a failed submit may have been partially consumed; let the
        // retirement check decide when the set is reusable.
        self.ring.submitted(set);
        self.reset();
        result.map(|()| Some(summary))
    }

    /// Drops accumulated geometry without submitting it.
    pub fn reset(&mut self) {
        self.vertices.reset();
        self.indices.reset();
        self.primitives = 0;
    }

    /// Destroys the backing buffers.
    pub fn destroy(&mut self, driver: &mut dyn BackendDriver) {
        self.ring.destroy_all(driver);
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    #[inline]
    pub fn primitives(&self) -> u32 {
        self.primitives
    }

    #[inline]
    pub fn ring(&self) -> &BufferRing {
        &self.ring
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingDriver;
    use crate::backend::Capabilities;

    fn batch(max_vertices: u32, max_primitives: u32) -> GeometryBatch {
        GeometryBatch::new(&BatchLimits::new(max_vertices, max_primitives, 1))
    }

    #[test]
    fn index_offset_tracks_vertex_cursor() {
        let mut g = batch(16, 8);
        assert_eq!(g.reserve(4, 6, None).unwrap().index_offset, 0);
        assert_eq!(g.reserve(3, 3, None).unwrap().index_offset, 4);
        assert_eq!(g.reserve(4, 6, None).unwrap().index_offset, 7);
        assert_eq!(g.primitives(), 3);
    }

    #[test]
    fn reserve_is_all_or_nothing() {
        // Room for 8 vertices but only 6 indices.
        let mut g = batch(8, 2);
        g.reserve(4, 6, None).unwrap();
        assert!(g.reserve(4, 6, None).is_none());
        assert_eq!(g.vertex_count(), 4);
        assert_eq!(g.index_count(), 6);
    }

    #[test]
    fn submit_uploads_written_prefix_and_resets() {
        let mut driver = RecordingDriver::new(Capabilities::software(1));
        let journal = driver.journal();
        let mut g = batch(16, 8);
        g.reserve(4, 6, None).unwrap().write_indices(&[0, 1, 2, 0, 2, 3]);

        let summary = g.submit(&mut driver).unwrap().unwrap();
        assert_eq!(summary, GeometrySubmit { vertices: 4, indices: 6, primitives: 1 });
        assert!(g.is_empty());

        let subs = journal.submissions();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].indices(), &[0, 1, 2, 0, 2, 3]);
        assert_eq!(subs[0].vertex_count(), 4);
    }

    #[test]
    fn empty_submit_is_a_no_op() {
        let mut driver = RecordingDriver::new(Capabilities::software(1));
        let mut g = batch(16, 8);
        assert_eq!(g.submit(&mut driver).unwrap(), None);
        assert_eq!(driver.live_buffers(), 0);
    }
}
