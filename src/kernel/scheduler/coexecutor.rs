//! 协程执行器
//!
//! 每个任务拥有一个 [`Coroutine`]，调度循环通过 `start` / `resume` 进入任务，
//! 任务通过挂起或让出切回调度循环。任务可以在不同的工作线程之间迁移，
//! 但同一时刻只会在一个线程上运行。
//!
//! ## 状态转换
//!
//! ```text
//! run()     进入:  !RUNNING           -> RUNNING, 清 QUEUED|SUSPENDED
//!           返回:  清 RUNNING; FINISHED -> 发布结果; QUEUED -> 重新排队
//! wake()    !QUEUED && !FINISHED   -> QUEUED; 之前未 RUNNING 才排队
//! suspend() 置 SUSPENDED 后切回调度循环
//! yield()   置 QUEUED 后切回调度循环
//! ```
//!
//! RUNNING 只在切回调度循环之后才清除，所以运行期间到达的唤醒只会留下 QUEUED，
//! 由调度循环负责重新排队，不会出现同一个任务在两个线程上同时运行。

use super::{AdoptedThread, Executor, ExecutorStats, StatsSnapshot, Worker, call_closure, publish_result};
use crate::error::TaskResult;
use crate::hal::StackContext;
use crate::ipc::SyncChannel;
use crate::ipc::sync_channel::Recv;
use crate::kernel::coroutine::Coroutine;
use crate::kernel::task::{
    FlagSet, Ident, Task, TaskContext, TaskFlags, TaskFuture, TaskHandle, TaskKind, TaskOptions, TaskRef,
    WeakTaskRef,
};
use crate::runtime::Future;
use core::cell::Cell;
use std::sync::{Arc, Weak};

/// 执行器共享状态
struct CoShared {
    runnable: SyncChannel<TaskRef>,
    stats: ExecutorStats,
}

impl CoShared {
    fn schedule(&self, task: TaskRef) {
        self.stats.record_scheduled();
        crate::trace!("schedule {}", task.ident());
        self.runnable.put(task);
    }
}

/// 协程执行器
///
/// 句柄可以廉价克隆，所有克隆共享同一个就绪队列。
///
/// # 示例
///
/// ```rust,no_run
/// use neon_fiber::kernel::scheduler::{CoExecutor, Executor};
///
/// let exec = CoExecutor::new();
/// let thread = exec.adopt_thread();
/// let task = exec.create_task(|_cx| 5);
/// let result = task.queue_start().unwrap();
/// exec.resume_pending(&thread);
/// assert_eq!(result.wait(&thread.context()).unwrap(), 5);
/// ```
#[derive(Clone)]
pub struct CoExecutor {
    inner: Arc<CoShared>,
}

impl CoExecutor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CoShared {
                runnable: SyncChannel::new(),
                stats: ExecutorStats::default(),
            }),
        }
    }

    /// 阻塞取下一个就绪任务，执行器关闭且队列为空时返回 `None`
    pub fn next(&self) -> Option<TaskRef> {
        self.inner.runnable.get()
    }

    pub fn try_next(&self) -> Option<TaskRef> {
        self.inner.runnable.try_get()
    }

    /// 就绪队列长度
    pub fn pending(&self) -> usize {
        self.inner.runnable.len()
    }
}

impl Default for CoExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for CoExecutor {
    type Worker = CoThreadTask;

    fn adopt_thread(&self) -> AdoptedThread<CoThreadTask> {
        AdoptedThread::new(Arc::new(CoThreadTask {
            ident: Ident::named("co-thread"),
            flags: TaskFlags::new(),
            exec: self.inner.clone(),
        }))
    }

    fn schedule(&self, task: TaskRef) {
        self.inner.schedule(task);
    }

    fn shutdown(&self) {
        crate::debug!("co executor shutdown, {} task(s) still queued", self.inner.runnable.len());
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
        let task = CoTask::new(self.inner.clone(), options, f, future.clone());
        TaskHandle::new(task, future)
    }
}

/// 协程的私有状态
///
/// 只有持有 RUNNING 的线程会访问，这一点由 [`CoTask::run`] 的进入条件保证。
struct Fiber<F, R> {
    co: Coroutine,
    /// 调度循环一侧的上下文，每次进入协程时重新保存
    other: StackContext,
    closure: Cell<Option<F>>,
    result: Cell<Option<TaskResult<R>>>,
}

/// 协程任务
///
/// 挂起后没有被唤醒的任务在最后一个强引用（句柄、就绪队列）释放时销毁，
/// 协程栈直接释放而不展开，栈上闭包捕获的值不会被 drop。
pub struct CoTask<F, R> {
    ident: Ident,
    flags: TaskFlags,
    this: Weak<Self>,
    exec: Arc<CoShared>,
    future: TaskFuture<R>,
    fiber: Fiber<F, R>,
}

// Safety: fiber 只被持有 RUNNING 的线程访问，其余字段本身是线程安全的
unsafe impl<F: Send, R: Send> Send for CoTask<F, R> {}
unsafe impl<F: Send, R: Send> Sync for CoTask<F, R> {}

impl<F, R> CoTask<F, R>
where
    F: FnOnce(&TaskContext<'_>) -> R + Send + 'static,
    R: Send + 'static,
{
    fn new(exec: Arc<CoShared>, options: TaskOptions, f: F, future: TaskFuture<R>) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| Self {
            ident: Ident::named(options.name),
            flags: TaskFlags::new(),
            this: this.clone(),
            exec,
            future,
            fiber: Fiber {
                co: Coroutine::with_stack_size(options.stack_size, co_enter::<F, R>, this.as_ptr() as *mut ()),
                other: StackContext::new(),
                closure: Cell::new(Some(f)),
                result: Cell::new(None),
            },
        })
    }

    /// 在协程栈上运行闭包
    ///
    /// 协程栈上只有借用和弱引用。运行期间的强引用由调用 `run()` 的一方持有。
    fn execute(&self) {
        if let Some(f) = self.fiber.closure.take() {
            let weak: WeakTaskRef = self.this.clone();
            let cx = TaskContext::new(self, weak);
            let result = call_closure(self.ident, f, &cx);
            self.fiber.result.set(Some(result));
        }
        self.flags.set(FlagSet::FINISHED);
    }
}

/// 协程入口
unsafe extern "C" fn co_enter<F, R>(data: *mut ()) -> !
where
    F: FnOnce(&TaskContext<'_>) -> R + Send + 'static,
    R: Send + 'static,
{
    // Safety: data 是 CoTask 自身的地址，调用 run() 的线程持有它的强引用
    let task = unsafe { &*(data as *const CoTask<F, R>) };
    task.execute();
    // run() 不会恢复已结束的任务，这里只是保险
    loop {
        unsafe { task.fiber.co.yield_to(&task.fiber.other) };
    }
}

impl<F, R> Task for CoTask<F, R>
where
    F: FnOnce(&TaskContext<'_>) -> R + Send + 'static,
    R: Send + 'static,
{
    fn ident(&self) -> Ident {
        self.ident
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Fiber
    }

    fn flags(&self) -> &TaskFlags {
        &self.flags
    }

    fn run(&self) {
        let entered = self.flags.update_with(|cur| {
            (!cur.is_running()).then(|| cur.with(FlagSet::RUNNING, FlagSet::QUEUED | FlagSet::SUSPENDED))
        });
        let prev = match entered {
            Ok(prev) => prev,
            Err(cur) => {
                crate::trace!("{} already running ({:?})", self.ident, cur);
                return;
            }
        };
        if prev.is_finished() {
            self.flags.clear(FlagSet::RUNNING);
            crate::trace!("{} already finished", self.ident);
            return;
        }

        // Safety: 持有 RUNNING，只有当前线程切换这个协程
        unsafe {
            if self.fiber.co.is_started() {
                self.fiber.co.resume(&self.fiber.other);
            } else {
                self.fiber.co.start(&self.fiber.other);
            }
        }

        let prev = match self.flags.update_with(|cur| {
            let clear = if cur.is_finished() {
                FlagSet::RUNNING | FlagSet::QUEUED
            } else {
                FlagSet::RUNNING
            };
            Some(cur.with(FlagSet::EMPTY, clear))
        }) {
            Ok(prev) | Err(prev) => prev,
        };

        if prev.is_finished() {
            if let Some(result) = self.fiber.result.take() {
                publish_result(self.ident, &self.exec.stats, &self.future, result);
            }
        } else if prev.is_queued() {
            self.schedule();
        }
    }

    fn wake(&self) {
        if let Ok(prev) = self.flags.set_cond(FlagSet::QUEUED, FlagSet::QUEUED | FlagSet::FINISHED) {
            if !prev.is_running() {
                self.schedule();
            }
        }
    }

    fn schedule(&self) {
        if let Some(me) = self.this.upgrade() {
            self.exec.schedule(me);
        }
    }

    unsafe fn suspend(&self) {
        self.flags.set(FlagSet::SUSPENDED);
        unsafe { self.fiber.co.yield_to(&self.fiber.other) };
    }

    unsafe fn yield_now(&self) {
        self.flags.set(FlagSet::QUEUED);
        unsafe { self.fiber.co.yield_to(&self.fiber.other) };
    }
}

/// 工作线程的调度循环任务
///
/// 挂起时不会空转：先运行就绪任务，没有就绪任务时在就绪队列的条件变量上等待。
/// 唤醒在队列锁内置 QUEUED，在挂起之前到达的唤醒会让下一次挂起立即返回。
pub struct CoThreadTask {
    ident: Ident,
    flags: TaskFlags,
    exec: Arc<CoShared>,
}

impl CoThreadTask {
    /// 运行就绪任务直到队列为空，返回运行的个数
    fn drain(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.exec.runnable.try_get() {
            task.run();
            ran += 1;
        }
        ran
    }

    /// 消费一次唤醒
    fn take_wakeup(&self) -> bool {
        self.flags
            .update_with(|cur| cur.is_queued().then(|| cur.with(FlagSet::EMPTY, FlagSet::QUEUED)))
            .is_ok()
    }
}

impl Task for CoThreadTask {
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

    fn wake(&self) {
        self.exec.runnable.notify_with(|| {
            self.flags.set(FlagSet::QUEUED);
        });
    }

    fn schedule(&self) {
        // 线程任务不进入就绪队列
    }

    unsafe fn suspend(&self) {
        self.flags.update(FlagSet::SUSPENDED, FlagSet::RUNNING);
        while !self.take_wakeup() {
            match self.exec.runnable.recv_until(|| self.flags.is_set(FlagSet::QUEUED)) {
                Recv::Item(task) => task.run(),
                Recv::Stopped => {}
                Recv::Closed => self.exec.runnable.wait_until(|| self.flags.is_set(FlagSet::QUEUED)),
            }
        }
        self.flags.update(FlagSet::RUNNING, FlagSet::SUSPENDED);
    }

    unsafe fn yield_now(&self) {
        self.drain();
    }
}

impl Worker for CoThreadTask {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::Channel;

    #[test]
    fn test_task_queued_same_thread() {
        let exec = CoExecutor::new();
        let thread = exec.adopt_thread();
        let task = exec.create_task(|_cx| 5);
        assert_eq!(task.kind(), TaskKind::Fiber);
        let result = task.queue_start().unwrap();
        assert!(result.get().is_none());
        assert!(exec.resume_pending(&thread));
        assert!(task.is_finished());
        assert_eq!(result.wait(&thread.context()), Ok(5));
        assert!(!exec.resume_pending(&thread));
    }

    #[test]
    fn test_queue_start_twice() {
        let exec = CoExecutor::new();
        let task = exec.create_task(|_cx| ());
        assert!(task.queue_start().is_ok());
        assert!(task.queue_start().is_err());
        assert_eq!(exec.pending(), 1);
    }

    #[test]
    fn test_yield_interleaves() {
        let exec = CoExecutor::new();
        let thread = exec.adopt_thread();
        let log = Arc::new(spin::Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..2)
            .map(|n| {
                let log = log.clone();
                exec.create_task(move |cx| {
                    for step in 0..3 {
                        log.lock().push((n, step));
                        cx.yield_now();
                    }
                })
            })
            .collect();
        let futures: Vec<_> = handles.iter().map(|h| h.queue_start().unwrap()).collect();
        while exec.resume_pending(&thread) {}

        for f in &futures {
            assert_eq!(f.get(), Some(Ok(())));
        }
        assert_eq!(
            *log.lock(),
            vec![(0, 0), (1, 0), (0, 1), (1, 1), (0, 2), (1, 2)]
        );
    }

    #[test]
    fn test_producer_consumer_same_thread() {
        let exec = CoExecutor::new();
        let thread = exec.adopt_thread();
        let ch = Arc::new(Channel::new());

        let rx = ch.clone();
        let consumer = exec.create_task(move |cx| (0..10).map(|_| rx.get(cx)).sum::<i32>());
        let tx = ch.clone();
        let producer = exec.create_task(move |cx| {
            for i in 0..10 {
                tx.put(cx, i);
            }
        });

        let sum = consumer.queue_start().unwrap();
        let done = producer.queue_start().unwrap();
        let cx = thread.context();
        assert_eq!(sum.wait(&cx), Ok(45));
        assert_eq!(done.wait(&cx), Ok(()));
        assert_eq!(exec.stats().completed, 2);
    }

    #[test]
    fn test_wake_while_running_requeues_once() {
        let exec = CoExecutor::new();
        let thread = exec.adopt_thread();
        let task = exec.create_task(|cx| {
            // 运行期间唤醒自己，然后挂起：调度循环应当把它重新排队一次
            cx.task().wake();
            cx.suspend();
            7
        });
        let result = task.queue_start().unwrap();
        assert!(exec.resume_pending(&thread));
        assert_eq!(exec.pending(), 1);
        assert!(exec.resume_pending(&thread));
        assert_eq!(exec.pending(), 0);
        assert_eq!(result.get(), Some(Ok(7)));
    }

    #[test]
    fn test_suspended_task_freed_with_handle() {
        let exec = CoExecutor::new();
        let thread = exec.adopt_thread();
        let ch = Arc::new(Channel::<u32>::new());

        // 没有生产者，任务会一直挂起
        let rx = ch.clone();
        let task = exec.create_task(move |cx| rx.get(cx));
        let result = task.queue_start().unwrap();
        assert!(exec.resume_pending(&thread));
        assert!(task.flags().is_suspended());
        assert!(!task.flags().is_running());

        let weak = Arc::downgrade(task.task());
        drop(task);
        drop(result);
        assert_eq!(Weak::strong_count(&weak), 0);
    }
}
