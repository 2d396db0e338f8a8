use crate::kernel::task::Ident;
use std::any::Any;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FiberError {
    // 任务相关
    #[error("task {task} panicked: {message}")]
    TaskPanicked { task: Ident, message: String },
    #[error("task {0} is already queued or started")]
    AlreadyQueued(Ident),
    #[error("invalid stack size {size} (minimum {min})")]
    InvalidStackSize { size: usize, min: usize },

    // Future 相关
    #[error("future result already set")]
    FutureAlreadySet,

    // 同步相关
    #[error("lock is held by another task")]
    WouldBlock,

    // 执行器相关
    #[error("executor has been shut down")]
    ExecutorShutdown,
}

impl FiberError {
    /// 把 `catch_unwind` 捕获的 panic 负载转换为错误
    pub fn from_panic(task: Ident, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "<non-string panic payload>".to_string()
        };
        FiberError::TaskPanicked { task, message }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, FiberError::TaskPanicked { .. })
    }
}

pub type Result<T> = core::result::Result<T, FiberError>;

/// 任务闭包的执行结果，通过任务的 Future 交付
pub type TaskResult<R> = core::result::Result<R, FiberError>;
