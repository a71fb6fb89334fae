//! HeroineGraph: a `wgpu`-backed interactive force-directed graph layout
//! and visualization engine.
//!
//! The crate is organized the way the Simulation Driver actually runs: a
//! [`graph`] store feeds indexed positions into pluggable [`algorithm`]
//! repulsion kernels and the [`spatial`] index they share, [`simulation`]
//! schedules the per-tick pass order, and the [`compositor`] turns the
//! resulting positions into a composed frame. [`engine`] is the single
//! public façade gluing all of it together; nothing outside `engine`
//! needs to be reachable by a host that only wants `createEngine`.

pub mod algorithm;
pub mod buffers;
pub mod compositor;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod gpu;
pub mod graph;
pub mod ids;
pub mod radix_sort;
pub mod simulation;
pub mod spatial;
pub mod value_stream;
pub mod viewport;

pub use engine::Engine;
pub use error::{Error, Result};
