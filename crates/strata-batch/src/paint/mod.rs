//! Color model shared between producers and renderers.

mod color;

pub use color::Color;
