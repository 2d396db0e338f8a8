//! # 任务互斥锁
//!
//! 持有者可以在临界区内挂起或让出，等待者挂起而不是自旋。
//! 基于 `Arc` 共享，可以克隆后 move 到不同任务中。
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use neon_fiber::kernel::scheduler::{CoExecutor, Executor};
//! use neon_fiber::sync::TaskMutex;
//!
//! let exec = CoExecutor::new();
//! let counter = TaskMutex::new(0u32);
//!
//! let c = counter.clone();
//! let task = exec.create_task(move |cx| {
//!     let mut guard = c.lock(cx);
//!     *guard += 1;
//!     // 持锁让出，其他任务拿不到锁
//!     cx.yield_now();
//! });
//! ```
//!
//! 解锁时只唤醒队首等待者，被唤醒的任务重新竞争锁。

use crate::error::{FiberError, Result};
use crate::kernel::task::{TaskContext, TaskId, WeakTaskRef};
use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use spin::Mutex as SpinMutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

struct LockState {
    owner: Option<TaskId>,
    waiters: VecDeque<WeakTaskRef>,
}

struct MutexInner<T> {
    data: UnsafeCell<T>,
    state: SpinMutex<LockState>,
}

// Safety: data 只被 owner 访问
unsafe impl<T: Send> Send for MutexInner<T> {}
unsafe impl<T: Send> Sync for MutexInner<T> {}

/// 任务互斥锁
pub struct TaskMutex<T> {
    inner: Arc<MutexInner<T>>,
}

impl<T> Clone for TaskMutex<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> TaskMutex<T> {
    pub fn new(data: T) -> Self {
        Self {
            inner: Arc::new(MutexInner {
                data: UnsafeCell::new(data),
                state: SpinMutex::new(LockState {
                    owner: None,
                    waiters: VecDeque::new(),
                }),
            }),
        }
    }

    /// 获取锁
    ///
    /// 锁被占用时挂起当前任务，直到解锁者唤醒它。
    ///
    /// # Panics
    ///
    /// 当前任务已经持有这把锁时 panic。
    pub fn lock<'a>(&'a self, cx: &TaskContext<'_>) -> TaskMutexGuard<'a, T> {
        let me = cx.downgrade();
        loop {
            {
                let mut state = self.inner.state.lock();
                match state.owner {
                    None => {
                        state.owner = Some(cx.id());
                        // 虚假唤醒时自己可能还在队列里
                        state.waiters.retain(|w| !Weak::ptr_eq(w, &me));
                        return TaskMutexGuard { mutex: self };
                    }
                    Some(owner) if owner == cx.id() => {
                        drop(state);
                        panic!("TaskMutex::lock: {} already holds the lock", cx.ident());
                    }
                    Some(_) => {
                        if !state.waiters.iter().any(|w| Weak::ptr_eq(w, &me)) {
                            state.waiters.push_back(me.clone());
                        }
                    }
                }
            }
            cx.suspend();
        }
    }

    /// 尝试获取锁（非阻塞）
    ///
    /// # 返回值
    /// - `Ok(TaskMutexGuard)`: 成功获取锁
    /// - `Err(FiberError::WouldBlock)`: 锁被占用
    pub fn try_lock<'a>(&'a self, cx: &TaskContext<'_>) -> Result<TaskMutexGuard<'a, T>> {
        let mut state = self.inner.state.lock();
        if state.owner.is_some() {
            return Err(FiberError::WouldBlock);
        }
        state.owner = Some(cx.id());
        Ok(TaskMutexGuard { mutex: self })
    }

    /// 当前持有者
    pub fn owner(&self) -> Option<TaskId> {
        self.inner.state.lock().owner
    }

    pub fn is_locked(&self) -> bool {
        self.owner().is_some()
    }

    /// 排队的等待者数量
    pub fn waiters(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    fn unlock(&self) {
        let next = {
            let mut state = self.inner.state.lock();
            state.owner = None;
            state.waiters.pop_front()
        };
        // 锁外唤醒，wake 可能进入执行器的队列锁
        if let Some(task) = next.and_then(|w| w.upgrade()) {
            task.wake();
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for TaskMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TaskMutex")
            .field("owner", &state.owner)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}

/// RAII 锁守卫，drop 时释放锁并唤醒一个等待者
pub struct TaskMutexGuard<'a, T> {
    mutex: &'a TaskMutex<T>,
}

impl<T> Deref for TaskMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: 守卫存在期间只有持有者能访问 data
        unsafe { &*self.mutex.inner.data.get() }
    }
}

impl<T> DerefMut for TaskMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: 同上
        unsafe { &mut *self.mutex.inner.data.get() }
    }
}

impl<T> Drop for TaskMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::scheduler::{CoExecutor, Executor};
    use crate::kernel::task::mock::MockTask;

    #[test]
    fn test_try_lock() {
        let task = MockTask::new();
        let cx = task.context();
        let mutex = TaskMutex::new(1);

        let mut guard = mutex.try_lock(&cx).unwrap();
        *guard += 1;
        assert_eq!(mutex.owner(), Some(cx.id()));
        assert_eq!(mutex.try_lock(&cx).err(), Some(FiberError::WouldBlock));
        drop(guard);

        assert!(!mutex.is_locked());
        assert_eq!(*mutex.try_lock(&cx).unwrap(), 2);
    }

    #[test]
    fn test_unlock_wakes_waiter() {
        let holder = MockTask::new();
        let waiter = MockTask::new();
        let mutex: &'static TaskMutex<()> = Box::leak(Box::new(TaskMutex::new(())));

        let guard = mutex.lock(&holder.context());
        // 等待者第一次挂起时持有者解锁
        waiter.mock().on_suspend(move || drop(guard));

        let _g = mutex.lock(&waiter.context());
        assert_eq!(waiter.mock().suspends(), 1);
        assert_eq!(waiter.mock().wakes(), 1);
        assert_eq!(mutex.owner(), Some(waiter.context().id()));
        assert_eq!(mutex.waiters(), 0);
    }

    #[test]
    fn test_critical_section_across_yield() {
        let exec = CoExecutor::new();
        let thread = exec.adopt_thread();
        let log = TaskMutex::new(Vec::new());

        let futures: Vec<_> = (0..3)
            .map(|n| {
                let log = log.clone();
                exec.create_task(move |cx| {
                    let mut guard = log.lock(cx);
                    guard.push(n);
                    cx.yield_now();
                    guard.push(n);
                })
                .queue_start()
                .unwrap()
            })
            .collect();
        while exec.resume_pending(&thread) {}

        for f in &futures {
            assert_eq!(f.get(), Some(Ok(())));
        }
        let cx = thread.context();
        assert_eq!(*log.lock(&cx), vec![0, 0, 1, 1, 2, 2]);
    }

    #[test]
    #[should_panic(expected = "already holds the lock")]
    fn test_relock_by_owner_panics() {
        let task = MockTask::new();
        let cx = task.context();
        let mutex = TaskMutex::new(0);

        let _guard = mutex.lock(&cx);
        let _again = mutex.lock(&cx);
    }
}
