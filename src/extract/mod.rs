//! Document text and identifier extraction.

pub mod pattern;
pub mod text;

pub use pattern::{DEFAULT_STOPLIST, MatchRule, PatternExtractor};
pub use text::{PdfTextExtractor, TextExtractor};
