//! 线程池执行器
//!
//! 与 [`CoExecutor`](super::CoExecutor) 接口相同，但任务没有自己的栈：
//! 闭包在 `run()` 里一次运行到结束。挂起和唤醒不做调度，
//! 阻塞的 `wait` 退化为让出 CPU 的轮询。

use super::{AdoptedThread, Executor, ExecutorStats, StatsSnapshot, Worker, call_closure, publish_result};
use crate::ipc::SyncChannel;
use crate::kernel::task::{
    FlagSet, Ident, Task, TaskContext, TaskFlags, TaskFuture, TaskHandle, TaskKind, TaskOptions, TaskRef,
    WeakTaskRef,
};
use crate::runtime::Future;
use spin::Mutex;
use std::sync::{Arc, Weak};

struct TpShared {
    runnable: SyncChannel<TaskRef>,
    stats: ExecutorStats,
}

/// 线程池执行器
#[derive(Clone)]
pub struct TpExecutor {
    inner: Arc<TpShared>,
}

impl TpExecutor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TpShared {
                runnable: SyncChannel::new(),
                stats: ExecutorStats::default(),
            }),
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.runnable.len()
    }
}

impl Default for TpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for TpExecutor {
    type Worker = TpThreadTask;

    fn adopt_thread(&self) -> AdoptedThread<TpThreadTask> {
        AdoptedThread::new(Arc::new(TpThreadTask {
            ident: Ident::named("tp-thread"),
            flags: TaskFlags::new(),
            exec: self.inner.clone(),
        }))
    }

    fn schedule(&self, task: TaskRef) {
        self.inner.stats.record_scheduled();
        self.inner.runnable.put(task);
    }

    fn shutdown(&self) {
        crate::debug!("tp executor shutdown, {} task(s) still queued", self.inner.runnable.len());
        self.inner.runnable.close();
    }

    fn is_shutdown(&self) -> bool {
        self.inner.runnable.is_closed()
    }

    fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    fn create_task_with<F, R>(&self, options: TaskOptions, f: F) -> TaskHandle<R>
    where
        F: FnOnce(&TaskContext<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.inner.stats.record_created();
        let future: TaskFuture<R> = Arc::new(Future::new());
        // 线程池任务没有独立栈，stack_size 不起作用
        let task = Arc::new_cyclic(|this: &Weak<TpTask<F, R>>| TpTask {
            ident: Ident::named(options.name),
            flags: TaskFlags::new(),
            this: this.clone(),
            exec: self.inner.clone(),
            future: future.clone(),
            closure: Mutex::new(Some(f)),
        });
        TaskHandle::new(task, future)
    }
}

/// 线程池任务
pub struct TpTask<F, R> {
    ident: Ident,
    flags: TaskFlags,
    this: Weak<Self>,
    exec: Arc<TpShared>,
    future: TaskFuture<R>,
    closure: Mutex<Option<F>>,
}

impl<F, R> Task for TpTask<F, R>
where
    F: FnOnce(&TaskContext<'_>) -> R + Send + 'static,
    R: Send + 'static,
{
    fn ident(&self) -> Ident {
        self.ident
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Pool
    }

    fn flags(&self) -> &TaskFlags {
        &self.flags
    }

    fn run(&self) {
        let entered = self.flags.update_with(|cur| {
            (!cur.intersects(FlagSet::RUNNING | FlagSet::FINISHED))
                .then(|| cur.with(FlagSet::RUNNING, FlagSet::QUEUED))
        });
        if let Err(cur) = entered {
            crate::trace!("{} not runnable ({:?})", self.ident, cur);
            return;
        }
        let Some(f) = self.closure.lock().take() else {
            self.flags.update(FlagSet::FINISHED, FlagSet::RUNNING);
            return;
        };

        let weak: WeakTaskRef = self.this.clone();
        let cx = TaskContext::new(self, weak);
        let result = call_closure(self.ident, f, &cx);
        self.flags.update(FlagSet::FINISHED, FlagSet::RUNNING);
        publish_result(self.ident, &self.exec.stats, &self.future, result);
    }

    fn wake(&self) {}

    fn schedule(&self) {
        if let Some(me) = self.this.upgrade() {
            self.exec.stats.record_scheduled();
            self.exec.runnable.put(me);
        }
    }

    unsafe fn suspend(&self) {
        std::thread::yield_now();
    }

    unsafe fn yield_now(&self) {
        std::thread::yield_now();
    }
}

/// 线程池工作线程的调度循环任务
pub struct TpThreadTask {
    ident: Ident,
    flags: TaskFlags,
    exec: Arc<TpShared>,
}

impl Task for TpThreadTask {
    fn ident(&self) -> Ident {
        self.ident
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Thread
    }

    fn flags(&self) -> &TaskFlags {
        &self.flags
    }

    fn run(&self) {
        self.flags.set(FlagSet::RUNNING);
        while let Some(task) = self.exec.runnable.get() {
            task.run();
        }
        self.flags.clear(FlagSet::RUNNING);
        crate::debug!("{} scheduling loop exit", self.ident);
    }

    fn wake(&self) {}

    fn schedule(&self) {}

    unsafe fn suspend(&self) {
        std::thread::yield_now();
    }

    unsafe fn yield_now(&self) {
        std::thread::yield_now();
    }
}

impl Worker for TpThreadTask {
    fn resume_pending(&self) -> bool {
        match self.exec.runnable.try_get() {
            Some(task) => {
                task.run();
                true
            }
            None => false,
        }
    }
}
