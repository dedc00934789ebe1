/// file: src/lib.rs
/// description: Crate root; module layout for the resolution pipeline.
/// shop_scout resolves a free-text product query into a ranked set of
/// structured product records by escalating through multiple unreliable web
/// data sources under a wall-clock budget, with TTL caching and a static
/// local catalog as the floor.
pub mod api;
pub mod cache;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod pipeline;
pub mod sitemap_index;
