use crate::coords::{Rect, Viewport};

/// Converts a logical-pixel clip rect to physical scissor rect arguments for wgpu.
///
/// Returns `None` if the clip rect is zero-area (the draw should be skipped).
/// `clip = None` means "no scissor" and yields the full viewport rect.
pub fn logical_clip_to_scissor(clip: Option<Rect>, viewport: Viewport) -> Option<(u32, u32, u32, u32)> {
    let (phys_vw, phys_vh) = viewport.physical_size();
    let scale = viewport.scale;

    let (x, y, w, h) = match clip {
        None => (0, 0, phys_vw, phys_vh),
        Some(r) => {
            let r = r.normalized();
            let x = ((r.origin.x * scale).max(0.0) as u32).min(phys_vw);
            let y = ((r.origin.y * scale).max(0.0) as u32).min(phys_vh);
            let x2 = (((r.origin.x + r.size.x) * scale).max(0.0) as u32).min(phys_vw);
            let y2 = (((r.origin.y + r.size.y) * scale).max(0.0) as u32).min(phys_vh);
            (x, y, x2.saturating_sub(x), y2.saturating_sub(y))
        }
    };

    if w == 0 || h == 0 { None } else { Some((x, y, w, h)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_clip_covers_physical_viewport() {
        let vp = Viewport::new(100.0, 50.0).with_scale(2.0);
        assert_eq!(logical_clip_to_scissor(None, vp), Some((0, 0, 200, 100)));
    }

    #[test]
    fn clip_is_scaled_and_clamped() {
        let vp = Viewport::new(100.0, 50.0).with_scale(2.0);
        let clip = Rect::new(-10.0, 10.0, 200.0, 20.0);
        assert_eq!(logical_clip_to_scissor(Some(clip), vp), Some((0, 20, 200, 40)));
    }

    #[test]
    fn clip_outside_viewport_skips_draw() {
        let vp = Viewport::new(100.0, 50.0);
        let clip = Rect::new(120.0, 0.0, 10.0, 10.0);
        assert_eq!(logical_clip_to_scissor(Some(clip), vp), None);
    }
}
