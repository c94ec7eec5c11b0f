//! Core data types shared by the extractor, generator, runner and report.

pub mod message;
pub mod source;
pub mod story;

pub use message::*;
pub use source::*;
pub use story::*;
