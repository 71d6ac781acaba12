//! Second phase of translation: turning decoded nodes and resolved dispatch
//! into C source text.

pub mod naming;
pub mod node;
pub mod render;
mod writer;

pub use render::{render, render_expr, ExtractContext, VirtualTarget};
pub use writer::{write_source, CodeTextWriter, SourceWriter};
