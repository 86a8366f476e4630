//! File-backed sources the CLI feeds to the engine.

pub mod content;
pub mod custom_urls;

pub use content::{Category, ContentFile, ContentItem};
pub use custom_urls::BatchFile;
