//! 测试用任务，记录挂起、让出和唤醒次数

use super::{Ident, Task, TaskContext, TaskFlags, TaskKind, TaskRef};
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::Mutex as SpinMutex;
use std::sync::Arc;

type Hook = Box<dyn FnOnce() + Send>;

pub(crate) struct MockInner {
    ident: Ident,
    flags: TaskFlags,
    wakes: AtomicUsize,
    suspends: AtomicUsize,
    yields: AtomicUsize,
    on_suspend: SpinMutex<Option<Hook>>,
    on_yield: SpinMutex<Option<Hook>>,
}

impl MockInner {
    pub(crate) fn wakes(&self) -> usize {
        self.wakes.load(Ordering::SeqCst)
    }

    pub(crate) fn suspends(&self) -> usize {
        self.suspends.load(Ordering::SeqCst)
    }

    pub(crate) fn yields(&self) -> usize {
        self.yields.load(Ordering::SeqCst)
    }

    /// 下一次挂起时执行一次
    pub(crate) fn on_suspend<F: FnOnce() + Send + 'static>(&self, f: F) {
        *self.on_suspend.lock() = Some(Box::new(f));
    }

    /// 下一次让出时执行一次
    pub(crate) fn on_yield<F: FnOnce() + Send + 'static>(&self, f: F) {
        *self.on_yield.lock() = Some(Box::new(f));
    }
}

impl Task for MockInner {
    fn ident(&self) -> Ident {
        self.ident
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Thread
    }

    fn flags(&self) -> &TaskFlags {
        &self.flags
    }

    fn run(&self) {}

    fn wake(&self) {
        self.wakes.fetch_add(1, Ordering::SeqCst);
    }

    fn schedule(&self) {}

    unsafe fn suspend(&self) {
        self.suspends.fetch_add(1, Ordering::SeqCst);
        let hook = self.on_suspend.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    unsafe fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::SeqCst);
        let hook = self.on_yield.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

pub(crate) struct MockTask {
    inner: Arc<MockInner>,
    task: TaskRef,
}

impl MockTask {
    pub(crate) fn new() -> Self {
        let inner = Arc::new(MockInner {
            ident: Ident::named("mock"),
            flags: TaskFlags::new(),
            wakes: AtomicUsize::new(0),
            suspends: AtomicUsize::new(0),
            yields: AtomicUsize::new(0),
            on_suspend: SpinMutex::new(None),
            on_yield: SpinMutex::new(None),
        });
        let task: TaskRef = inner.clone();
        Self { inner, task }
    }

    pub(crate) fn mock(&self) -> &MockInner {
        &self.inner
    }

    pub(crate) fn task_ref(&self) -> TaskRef {
        self.task.clone()
    }

    pub(crate) fn context(&self) -> TaskContext<'_> {
        TaskContext::from_ref(&self.task)
    }
}
