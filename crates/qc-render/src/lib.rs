//! qc-render: Markdown rendering for quantchat
//!
//! Turns the final-answer text of a parsed message into safe HTML and
//! decides how often a streaming message should be re-rendered.

pub mod highlight;
pub mod markdown;
pub mod throttle;

pub use highlight::{Highlight, DEFAULT_THEME};
pub use markdown::{RenderOptions, Renderer};
pub use throttle::{RenderThrottle, DEFAULT_RENDER_INTERVAL};

/// Render `text` with the default options.
pub fn render(text: &str) -> String {
    Renderer::default().render(text)
}
