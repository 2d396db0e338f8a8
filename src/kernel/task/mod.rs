//! 任务
//!
//! 任务是一个可以被执行器运行、挂起和唤醒的对象。任务种类是固定的：
//! 纤程任务、线程池任务，以及被执行器接管的线程本身（调度循环任务）。
//!
//! 没有线程局部的"当前任务"。任务运行时会拿到一个 [`TaskContext`]，
//! 所有可能阻塞的操作（`Future::wait`、`Channel::get` 等）都显式接收它。

use core::fmt;
use core::marker::PhantomData;
use std::sync::{Arc, Weak};

// 子模块
pub mod builder;
pub mod flags;
pub mod handle;
pub mod id;

#[cfg(test)]
pub(crate) mod mock;

// 重新导出
pub use builder::{TaskBuilder, TaskOptions};
pub use flags::{FlagSet, TaskFlags};
pub use handle::{TaskFuture, TaskHandle};
pub use id::{Ident, TaskId};

/// 任务种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// 运行在独立栈上的协程任务
    Fiber,
    /// 线程池任务，一次运行到结束
    Pool,
    /// 被执行器接管的线程（调度循环任务）
    Thread,
}

impl TaskKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            TaskKind::Fiber => "fiber",
            TaskKind::Pool => "pool",
            TaskKind::Thread => "thread",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务能力
///
/// 所有实现都通过 `Arc` 共享：调用者持有的句柄、就绪队列以及等待者都持有引用。
pub trait Task: Send + Sync {
    fn ident(&self) -> Ident;

    fn id(&self) -> TaskId {
        self.ident().id()
    }

    fn kind(&self) -> TaskKind;

    fn flags(&self) -> &TaskFlags;

    /// 运行任务，由调度循环调用
    ///
    /// 任务已经在别的线程上运行时直接返回。
    fn run(&self);

    /// 唤醒一个挂起的任务，可以从任何线程调用
    fn wake(&self);

    /// 把任务放进所属执行器的就绪队列
    fn schedule(&self);

    /// 挂起当前任务，直到被唤醒
    ///
    /// # Safety
    ///
    /// 只能由任务自己在自己的执行流上调用。
    unsafe fn suspend(&self);

    /// 让出执行权，稍后继续
    ///
    /// # Safety
    ///
    /// 同 [`Task::suspend`]。
    unsafe fn yield_now(&self);
}

/// 任务引用
pub type TaskRef = Arc<dyn Task>;

/// 任务弱引用，用于记录等待者
pub type WeakTaskRef = Weak<dyn Task>;

/// 任务执行上下文
///
/// 只在任务自己的执行流上存在：任务入口或接管线程时创建，借用期间有效，
/// 不能发送到其他线程。挂起和让出只能经由它调用。
///
/// 上下文只借用任务并持有弱引用，协程栈上不会留下任务的强引用，
/// 挂起后再也没被唤醒的任务可以随最后一个句柄释放。
pub struct TaskContext<'a> {
    task: &'a dyn Task,
    weak: WeakTaskRef,
    _not_send: PhantomData<*const ()>,
}

impl<'a> TaskContext<'a> {
    /// 调用者必须正运行在 `task` 的执行流上，`weak` 指向同一个任务
    pub(crate) fn new(task: &'a dyn Task, weak: WeakTaskRef) -> Self {
        Self {
            task,
            weak,
            _not_send: PhantomData,
        }
    }

    pub(crate) fn from_ref(task: &'a TaskRef) -> Self {
        Self::new(&**task, Arc::downgrade(task))
    }

    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    pub fn ident(&self) -> Ident {
        self.task.ident()
    }

    pub fn kind(&self) -> TaskKind {
        self.task.kind()
    }

    /// 当前任务
    pub fn task(&self) -> &dyn Task {
        self.task
    }

    pub fn downgrade(&self) -> WeakTaskRef {
        self.weak.clone()
    }

    /// 挂起当前任务，直到被唤醒
    ///
    /// 可能出现虚假唤醒，调用者需要在循环里重新检查条件。
    pub fn suspend(&self) {
        // Safety: 上下文只存在于任务自己的执行流上
        unsafe { self.task.suspend() }
    }

    /// 让出执行权
    pub fn yield_now(&self) {
        // Safety: 同上
        unsafe { self.task.yield_now() }
    }
}

impl fmt::Debug for TaskContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("ident", &self.ident())
            .field("kind", &self.kind())
            .field("flags", self.task.flags())
            .finish()
    }
}
