//! 协作式多任务运行时
//!
//! 任务运行在独立栈的协程上，通过挂起和唤醒在若干 OS 线程之间协作调度。
//! 提供单次结果交接的 [`Future`]、有界和无界通道，以及两个可互换的执行器：
//! [`CoExecutor`]（协程）和 [`TpExecutor`]（线程池，一次运行到结束）。

pub mod config;
pub mod error;
pub mod hal;
pub mod ipc;
pub mod kernel;
pub mod log;
pub mod runtime;
pub mod sync;

pub use error::{FiberError, Result, TaskResult};
pub use ipc::{Channel, SyncChannel};
pub use kernel::coroutine::Coroutine;
pub use kernel::scheduler::{AdoptedThread, CoExecutor, Executor, StatsSnapshot, TpExecutor};
pub use kernel::task::{TaskContext, TaskFuture, TaskHandle, TaskId};
pub use runtime::Future;
pub use sync::TaskMutex;
