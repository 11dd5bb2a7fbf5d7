//! Process-related modules: acquisition, tree building, and flattening.
//!
//! This module provides:
//! - `record`: Process records and text coercion
//! - `sampler`: The sampler capability plus `ps` and file implementations
//! - `procfs`: Sampling from /proc on Linux
//! - `rules`: Self/init/high-order collapse rules
//! - `tree`: Parent/child linking and bottom-up aggregation
//! - `flatten`: Selection of the processes worth reporting

pub mod flatten;
#[cfg(target_os = "linux")]
pub mod procfs;
pub mod record;
pub mod rules;
pub mod sampler;
pub mod tree;

// Re-export commonly used types
pub use flatten::flatten;
pub use record::{executable_name, ProcessRecord, RawProcess, KERNEL_HELPER_PID, ROOT_PID};
pub use rules::{ProcessRules, RulesError};
pub use sampler::{
    load_test_data_from_file, parse_ps_output, select_sampler, FileSampler, ProcessSampler,
    PsSampler, SampleError, TestData,
};
pub use tree::{ProcessTree, TreeNode, Usage};
