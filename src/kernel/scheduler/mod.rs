//! 执行器
//!
//! 执行器把若干 OS 线程绑定到一个就绪任务队列上。线程通过 `adopt_thread`
//! 成为工作线程，拿到一个 [`AdoptedThread`]，在上面运行调度循环。
//!
//! 两个后端：
//! - [`CoExecutor`]: 任务运行在协程上，可以挂起和唤醒
//! - [`TpExecutor`]: 任务一次运行到结束，挂起和唤醒不做调度

pub mod coexecutor;
pub mod threadpool;

pub use coexecutor::CoExecutor;
pub use threadpool::TpExecutor;

use crate::error::{FiberError, TaskResult};
use crate::kernel::task::{
    Ident, Task, TaskBuilder, TaskContext, TaskFuture, TaskHandle, TaskOptions, TaskRef,
};
use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// 执行器接口
pub trait Executor: Clone + Send + Sync + 'static {
    /// 工作线程上的调度循环任务
    type Worker: Worker;

    /// 把当前线程变为工作线程
    fn adopt_thread(&self) -> AdoptedThread<Self::Worker>;

    /// 释放工作线程
    fn unadopt_thread(&self, thread: AdoptedThread<Self::Worker>) {
        drop(thread);
    }

    /// 在当前线程上运行调度循环，直到执行器关闭
    fn resume(&self, thread: &AdoptedThread<Self::Worker>) {
        thread.run();
    }

    /// 在当前线程上运行一个就绪任务，没有就绪任务时返回 `false`
    fn resume_pending(&self, thread: &AdoptedThread<Self::Worker>) -> bool {
        thread.resume_pending()
    }

    /// 把任务放进就绪队列
    fn schedule(&self, task: TaskRef);

    /// 关闭执行器，调度循环在队列取空后退出
    fn shutdown(&self);

    fn is_shutdown(&self) -> bool;

    fn stats(&self) -> StatsSnapshot;

    /// 按参数创建任务，任务在 `queue_start` 之前不会运行
    fn create_task_with<F, R>(&self, options: TaskOptions, f: F) -> TaskHandle<R>
    where
        F: FnOnce(&TaskContext<'_>) -> R + Send + 'static,
        R: Send + 'static;

    fn create_task<F, R>(&self, f: F) -> TaskHandle<R>
    where
        F: FnOnce(&TaskContext<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.create_task_with(TaskOptions::default(), f)
    }

    fn builder(&self, name: &'static str) -> TaskBuilder<'_, Self> {
        TaskBuilder::new(self, name)
    }
}

/// 调度循环任务
pub trait Worker: Task + Sized + 'static {
    /// 运行一个就绪任务
    fn resume_pending(&self) -> bool;
}

/// 被执行器接管的线程
///
/// 不能发送到其他线程。析构时释放接管。
pub struct AdoptedThread<W: Worker> {
    worker: Arc<W>,
    task: TaskRef,
    _not_send: PhantomData<*const ()>,
}

impl<W: Worker> AdoptedThread<W> {
    pub(crate) fn new(worker: Arc<W>) -> Self {
        let task: TaskRef = worker.clone();
        crate::debug!("adopt thread {:?} as {}", std::thread::current().id(), task.ident());
        Self {
            worker,
            task,
            _not_send: PhantomData,
        }
    }

    pub fn ident(&self) -> Ident {
        self.task.ident()
    }

    pub fn worker(&self) -> &W {
        &self.worker
    }

    /// 线程自身的任务上下文，用于在线程上等待 Future 或通道
    pub fn context(&self) -> TaskContext<'_> {
        TaskContext::from_ref(&self.task)
    }

    /// 运行调度循环，直到执行器关闭
    pub fn run(&self) {
        self.worker.run();
    }

    pub fn resume_pending(&self) -> bool {
        self.worker.resume_pending()
    }
}

impl<W: Worker> Drop for AdoptedThread<W> {
    fn drop(&mut self) {
        crate::debug!("unadopt thread {}", self.task.ident());
    }
}

/// 执行器统计
#[derive(Debug, Default)]
pub struct ExecutorStats {
    created: AtomicUsize,
    scheduled: AtomicUsize,
    completed: AtomicUsize,
    panicked: AtomicUsize,
}

impl ExecutorStats {
    #[inline]
    pub fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            created: self.created.load(Ordering::Relaxed),
            scheduled: self.scheduled.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// 统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// 创建的任务数
    pub created: usize,
    /// 放入就绪队列的次数（含重新排队）
    pub scheduled: usize,
    /// 正常结束的任务数
    pub completed: usize,
    /// panic 结束的任务数
    pub panicked: usize,
}

/// 在 panic 边界内运行任务闭包
pub(crate) fn call_closure<F, R>(ident: Ident, f: F, cx: &TaskContext<'_>) -> TaskResult<R>
where
    F: FnOnce(&TaskContext<'_>) -> R,
{
    panic::catch_unwind(AssertUnwindSafe(|| f(cx))).map_err(|payload| FiberError::from_panic(ident, payload))
}

/// 发布任务结果
pub(crate) fn publish_result<R>(ident: Ident, stats: &ExecutorStats, future: &TaskFuture<R>, result: TaskResult<R>) {
    match &result {
        Ok(_) => stats.record_completed(),
        Err(err) => {
            stats.record_panicked();
            crate::warn!("{}", err);
        }
    }
    if let Err(err) = future.set_result(result) {
        crate::error!("task {}: {}", ident, err);
    }
}
