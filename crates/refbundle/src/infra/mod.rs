//! Infrastructure adapters for content access, codecs, config, and logging.

pub mod config;
pub mod logging;
pub mod parser;
pub mod serializer;
pub mod workspace;
