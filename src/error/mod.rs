//! 错误类型

mod types;

pub use types::{FiberError, Result, TaskResult};
