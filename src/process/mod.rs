//! External process plumbing
//!
//! The lowest layer of the harness: every gaiad and gaiacli invocation goes
//! through [`run`], which decides readiness from the child's first stdout
//! chunk.

mod classifier;
mod runner;

pub use classifier::{FirstChunkClassifier, ReadinessSignal};
pub use runner::{run, ProcessHandle, ProcessSpec, Spawned};
