//! Reader-facing chapter lifecycle

pub mod chapter;

pub use chapter::{ChapterPages, ChapterState, ReaderChapter};
