//! Utility modules

pub mod pool;
pub mod scratch;
pub mod write_lock;

pub use pool::{chunk_size, run_on_cpu_pool, run_on_task_pool, split_to_chunks};
pub use scratch::{create_scratch_dir, read_intermediate};
pub use write_lock::{commit_with_lock_retry, CommitFailure, CommitStep, StagedCounts};
