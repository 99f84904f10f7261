use super::quad::QuadInstance;
use super::vertex::{Vertex, NO_TEXTURE};

/// Write access to one reservation in the current batch.
///
/// `vertices` and `indices` are exactly as long as requested. Indices are
/// absolute within the submitted buffer: a producer's local index `k`
/// belongs at `index_offset + k`, which [`write_indices`](Self::write_indices)
/// applies for you.
///
/// The view mutably borrows the renderer, so it cannot outlive the next
/// `reserve`, flush or `end`.
#[derive(Debug)]
pub struct MappedData<'a> {
    pub vertices: &'a mut [Vertex],
    pub indices: &'a mut [u32],
    /// Vertices already committed to this batch before this reservation.
    pub index_offset: u32,
    /// Slot of the texture passed to `reserve`, if any.
    pub texture_slot: Option<u32>,
}

impl<'a> MappedData<'a> {
    /// `texture_slot` in vertex encoding (`NO_TEXTURE` when untextured).
    #[inline]
    pub fn vertex_slot(&self) -> u32 {
        self.texture_slot.unwrap_or(NO_TEXTURE)
    }

    /// Writes local indices, rebased onto this reservation's vertices.
    ///
    /// # Panics
    /// Panics if `local` does not match the reserved index count, or (debug
    /// builds) if a local index points past the reserved vertices.
    pub fn write_indices(&mut self, local: &[u32]) {
        assert_eq!(
            local.len(),
            self.indices.len(),
            "index count does not match the reservation"
        );
        let vertex_count = self.vertices.len() as u32;
        for (dst, &k) in self.indices.iter_mut().zip(local) {
            debug_assert!(k < vertex_count, "local index {k} outside {vertex_count} reserved vertices");
            *dst = self.index_offset + k;
        }
    }

    /// Fills the whole reservation with one quad. Requires a `(4, 6)` reservation.
    pub fn write_quad(&mut self, quad: &QuadInstance) {
        assert!(
            self.vertices.len() == 4 && self.indices.len() == 6,
            "write_quad needs a (4, 6) reservation, got ({}, {})",
            self.vertices.len(),
            self.indices.len()
        );
        self.vertices.copy_from_slice(&quad.to_vertices(self.texture_slot));
        self.write_indices(&QuadInstance::local_indices());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Rect;
    use crate::paint::Color;

    #[test]
    fn indices_are_rebased_on_offset() {
        let mut verts = [Vertex::new([0.0; 2], [0.0; 2], [0.0; 4], NO_TEXTURE); 3];
        let mut idx = [0u32; 3];
        let mut mapped = MappedData {
            vertices: &mut verts,
            indices: &mut idx,
            index_offset: 12,
            texture_slot: None,
        };
        mapped.write_indices(&[0, 2, 1]);
        assert_eq!(idx, [12, 14, 13]);
    }

    #[test]
    fn write_quad_bakes_slot_into_vertices() {
        let mut verts = [Vertex::new([0.0; 2], [0.0; 2], [0.0; 4], NO_TEXTURE); 4];
        let mut idx = [0u32; 6];
        let mut mapped = MappedData {
            vertices: &mut verts,
            indices: &mut idx,
            index_offset: 4,
            texture_slot: Some(3),
        };
        mapped.write_quad(&QuadInstance::solid(Rect::new(0.0, 0.0, 1.0, 1.0), Color::WHITE));
        assert!(verts.iter().all(|v| v.texture_slot == 3));
        assert_eq!(idx, [4, 5, 6, 4, 6, 7]);
    }

    #[test]
    #[should_panic(expected = "index count does not match")]
    fn short_index_write_is_a_contract_violation() {
        let mut verts = [Vertex::new([0.0; 2], [0.0; 2], [0.0; 4], NO_TEXTURE); 2];
        let mut idx = [0u32; 3];
        let mut mapped = MappedData {
            vertices: &mut verts,
            indices: &mut idx,
            index_offset: 0,
            texture_slot: None,
        };
        mapped.write_indices(&[0, 1]);
    }
}
