pub mod addr;
pub mod adjacency;
pub mod builder;
pub mod distance;
pub mod error;
pub mod extract;
pub mod graph;
pub mod handle;
pub mod loops;
pub mod progress;
pub mod range;
pub mod ref_cache;
pub mod source;
pub mod update;
pub mod value;

pub mod harness;
