//! Real-time background replacement for a live camera feed.
//!
//! Each tick captures a frame, asks a segmentation model for a foreground
//! mask, resolves a background (static image, looping video or a blurred
//! copy of the frame) and blends the two with a feathered alpha.

pub mod background;
pub mod capture;
pub mod commands;
pub mod compositor;
pub mod output;
pub mod pipeline;
pub mod segmentation;

pub use background::{BackgroundMode, BackgroundProvider, SelectionError};
pub use commands::Command;
pub use compositor::{AlphaMap, CompositeError, Compositor, CompositorConfig};
pub use pipeline::{Pipeline, PipelineConfig, TickOutcome};
pub use segmentation::{Mask, SegmentationModel};
