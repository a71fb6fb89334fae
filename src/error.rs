//! Exhaustive engine error enum.
//!
//! Every fallible engine call returns [`Result<T>`]. Internal invariant
//! violations that indicate a programmer bug (e.g. a bind group failing to
//! build after a capacity check already passed) panic instead of flowing
//! through here.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required GPU capability was absent at init.
    #[error("required GPU capability unsupported: {0}")]
    Unsupported(String),

    /// Device/adapter/surface could not be acquired.
    #[error("GPU init failed: {0}")]
    InitFailure(String),

    /// Pipeline creation failed.
    #[error("shader compilation failed for `{label}`: {message}")]
    ShaderCompile { label: String, message: String },

    /// A bulk array's length didn't match the expected stride.
    #[error("shape mismatch: expected length {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// A request exceeded a buffer's recorded capacity.
    #[error("capacity exceeded for `{buffer}`: requested {requested}, capacity {capacity}")]
    CapacityExceeded {
        buffer: String,
        requested: usize,
        capacity: usize,
    },

    /// The radix sort's workgroup count exceeded what the scan supports.
    #[error("sort capacity exceeded: {element_count} elements exceeds the supported maximum")]
    SortCapacityExceeded { element_count: usize },

    /// An edge referenced a missing node key in strict mode.
    #[error("unknown node key referenced by edge")]
    UnknownKey,

    /// NaN detected in positions; the simulation has halted.
    #[error("simulation diverged: NaN detected in node positions")]
    SimulationDiverged,

    /// A call was made before `load` or after `dispose`.
    #[error("engine not ready: {0}")]
    NotReady(&'static str),
}
