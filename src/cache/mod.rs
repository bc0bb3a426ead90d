//! Bounded, pin-aware caches shared between a channel's pipeline stages
//! (spec §2 item 1, §3, §9).

mod frame_cache;
mod render_cache;

pub use frame_cache::{FrameCache, PinGuard};
pub use render_cache::{RenderCache, RenderPinGuard};
