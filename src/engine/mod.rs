//! Instrumentation Engine
//!
//! The wrapping machinery:
//! - Target resolution along prototype chains (depth-bounded)
//! - Per-realm wrap registry (refcounted install/restore)
//! - Transparent interception wrappers (method/accessor/value strategies)

pub mod registry;
pub mod resolver;
pub mod wrapper;

pub use registry::{AcquireOutcome, WrapRegistry};
pub use resolver::{resolve, Resolution};
pub use wrapper::{WrapContext, WrapStrategy};
