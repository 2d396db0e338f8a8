//! 跨线程无界通道
//!
//! 执行器的就绪队列也是它。`close()` 之后剩余的元素仍然可以取出，
//! 取空后 `get()` 返回 `None`。

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

struct SyncState<T> {
    queue: VecDeque<T>,
    closed: bool,
}

/// `recv_until` 的结果
pub(crate) enum Recv<T> {
    /// 取到一个元素
    Item(T),
    /// 停止条件成立
    Stopped,
    /// 通道已关闭且为空
    Closed,
}

/// 无界通道，互斥锁 + 条件变量
pub struct SyncChannel<T> {
    state: Mutex<SyncState<T>>,
    cv: Condvar,
}

impl<T> SyncChannel<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SyncState {
                queue: VecDeque::new(),
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// 放入一个元素，总是立即成功
    pub fn put(&self, value: T) {
        self.state.lock().queue.push_back(value);
        self.cv.notify_all();
    }

    /// 阻塞直到取到元素；通道关闭且为空时返回 `None`
    pub fn get(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(value) = state.queue.pop_front() {
                return Some(value);
            }
            if state.closed {
                return None;
            }
            self.cv.wait(&mut state);
        }
    }

    pub fn try_get(&self) -> Option<T> {
        self.state.lock().queue.pop_front()
    }

    /// 关闭通道，唤醒所有等待者。可以重复调用。
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.cv.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// 阻塞直到取到元素、`stop()` 成立或通道关闭且为空
    ///
    /// `stop` 在持锁状态下求值，配合 [`SyncChannel::notify_with`] 不会丢失唤醒。
    pub(crate) fn recv_until<F>(&self, mut stop: F) -> Recv<T>
    where
        F: FnMut() -> bool,
    {
        let mut state = self.state.lock();
        loop {
            if stop() {
                return Recv::Stopped;
            }
            if let Some(value) = state.queue.pop_front() {
                return Recv::Item(value);
            }
            if state.closed {
                return Recv::Closed;
            }
            self.cv.wait(&mut state);
        }
    }

    /// 阻塞直到 `stop()` 成立，不取元素
    pub(crate) fn wait_until<F>(&self, mut stop: F)
    where
        F: FnMut() -> bool,
    {
        let mut state = self.state.lock();
        while !stop() {
            self.cv.wait(&mut state);
        }
    }

    /// 持锁执行 `f`，然后唤醒所有等待者
    pub(crate) fn notify_with<R, F>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let result = {
            let _state = self.state.lock();
            f()
        };
        self.cv.notify_all();
        result
    }
}

impl<T> Default for SyncChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}
