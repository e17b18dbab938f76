//! This crate re-exports the `tracing` crate so that every component in the
//! workspace pulls the exact same version without repeating the dependency
//! (and its feature flags) in every `Cargo.toml`.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]

pub use tracing;
