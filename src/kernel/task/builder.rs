//! 任务构建器
//!
//! 提供链式 API 创建任务，支持设置名称和栈大小。

use super::{TaskContext, TaskHandle};
use crate::config::{DEFAULT_STACK_SIZE, MIN_STACK_SIZE, STACK_ALIGN};
use crate::error::{FiberError, Result};
use crate::kernel::scheduler::Executor;

/// 任务创建参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOptions {
    pub name: &'static str,
    /// 协程栈大小（字节），线程池任务忽略此项
    pub stack_size: usize,
}

impl TaskOptions {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self::new("task")
    }
}

/// 任务构建器
///
/// # 示例
///
/// ```rust,no_run
/// use neon_fiber::kernel::scheduler::{CoExecutor, Executor};
///
/// let exec = CoExecutor::new();
/// let task = exec
///     .builder("large_stack_task")
///     .stack_size(256 * 1024)
///     .create(|_cx| 1 + 1)
///     .unwrap();
/// ```
pub struct TaskBuilder<'a, E: Executor> {
    exec: &'a E,
    options: TaskOptions,
}

impl<'a, E: Executor> TaskBuilder<'a, E> {
    pub fn new(exec: &'a E, name: &'static str) -> Self {
        Self {
            exec,
            options: TaskOptions::new(name),
        }
    }

    /// 设置栈大小
    ///
    /// 自动向上对齐到 16 字节。
    pub fn stack_size(mut self, size: usize) -> Self {
        self.options.stack_size = (size + STACK_ALIGN - 1) & !(STACK_ALIGN - 1);
        self
    }

    pub fn options(&self) -> TaskOptions {
        self.options
    }

    /// 创建任务
    ///
    /// # 错误
    /// - `InvalidStackSize`: 栈小于 `MIN_STACK_SIZE`
    /// - `ExecutorShutdown`: 执行器已关闭
    pub fn create<F, R>(self, f: F) -> Result<TaskHandle<R>>
    where
        F: FnOnce(&TaskContext<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.options.stack_size < MIN_STACK_SIZE {
            return Err(FiberError::InvalidStackSize {
                size: self.options.stack_size,
                min: MIN_STACK_SIZE,
            });
        }
        if self.exec.is_shutdown() {
            return Err(FiberError::ExecutorShutdown);
        }
        Ok(self.exec.create_task_with(self.options, f))
    }
}
