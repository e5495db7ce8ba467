//! Exit codes of the `biobench` binary. Part of the public contract.

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_TASK_FAILED: i32 = 1; // worker: the task itself failed
pub const EXIT_CONFIG_ERROR: i32 = 2; // bad config, unknown backbone, unsupported executor
pub const EXIT_BACKBONE_ERROR: i32 = 3; // backbone failed to load
