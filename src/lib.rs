//! # printsheet – print-styled HTML → PDF conversion
//!
//! [`Converter`] applies a fixed print stylesheet to an HTML document and
//! renders it with the in-crate [`PrintEngine`]. The engine stages are:
//!
//! 1. **Parse** – HTML string → DOM tree ([`dom`])
//! 2. **Style** – cascade user-agent, document and supplied CSS ([`css`], [`style`])
//! 3. **Layout** – compute flexbox/grid/table layout with Taffy ([`layout`])
//! 4. **Paginate** – split into pages of the configured geometry ([`pagination`])
//! 5. **Render** – emit PDF bytes via printpdf ([`render`])

pub mod converter;
pub mod css;
pub mod dom;
pub mod error;
pub mod fonts;
pub mod layout;
pub mod layout_config;
pub mod pagination;
pub mod pipeline;
pub mod render;
pub mod style;
pub mod templates;

// Re-exports for convenience
pub use converter::{Converter, RenderEngine};
pub use error::{Error, Result};
pub use pipeline::{generate_pdf, PageOrientation, PipelineConfig, PrintEngine};
