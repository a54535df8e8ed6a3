//! Application layer: document graph, resolution, crawl, and bundling.

pub mod bundler;
pub mod components;
pub mod crawler;
pub mod document;
pub mod inventory;
pub mod mapping;
pub mod resolver;
