pub mod logging;
pub mod sanitizer;

pub use logging::truncate_text;
