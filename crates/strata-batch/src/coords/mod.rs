//! Geometry types shared by producers, renderers and drivers.
//!
//! Canonical CPU space is logical pixels, origin top-left, +Y down. The
//! per-frame transform maps this space to clip space.

mod rect;
mod vec2;
mod viewport;

pub use rect::Rect;
pub use vec2::Vec2;
pub use viewport::Viewport;
