//! 同一执行器内的有界通道
//!
//! 容量固定为 [`CHANNEL_CAPACITY`]，满时 `put` 让出当前任务，空时 `get` 挂起当前任务。
//! 同一时刻只支持一个阻塞在 `get` 上的任务。

use super::ring::Ring;
use crate::config::CHANNEL_CAPACITY;
use crate::kernel::task::{TaskContext, WeakTaskRef};
use spin::Mutex as SpinMutex;
use std::sync::Weak;

struct ChannelState<T> {
    items: Ring<T, CHANNEL_CAPACITY>,
    /// 阻塞在 `get` 上的任务，被唤醒时取走
    waiting: Option<WeakTaskRef>,
}

/// 有界通道
///
/// # 示例
///
/// ```rust,no_run
/// use neon_fiber::ipc::Channel;
/// use neon_fiber::kernel::scheduler::{CoExecutor, Executor};
/// use std::sync::Arc;
///
/// let exec = CoExecutor::new();
/// let ch = Arc::new(Channel::new());
/// let tx = ch.clone();
/// let producer = exec.create_task(move |cx| {
///     for i in 0..10 {
///         tx.put(cx, i);
///     }
/// });
/// let consumer = exec.create_task(move |cx| (0..10).map(|_| ch.get(cx)).sum::<i32>());
/// ```
pub struct Channel<T> {
    state: SpinMutex<ChannelState<T>>,
}

impl<T> Channel<T> {
    pub fn new() -> Self {
        Self {
            state: SpinMutex::new(ChannelState {
                items: Ring::new(),
                waiting: None,
            }),
        }
    }

    /// 放入一个元素
    ///
    /// 通道满时释放锁并让出当前任务，直到有空位。
    pub fn put(&self, cx: &TaskContext<'_>, value: T) {
        let mut value = value;
        let waiter = loop {
            let mut state = self.state.lock();
            match state.items.push(value) {
                Ok(()) => break state.waiting.take(),
                Err(back) => {
                    value = back;
                    drop(state);
                    cx.yield_now();
                }
            }
        };
        if let Some(task) = waiter.and_then(|w| w.upgrade()) {
            task.wake();
        }
    }

    /// 取出一个元素，通道为空时挂起当前任务
    ///
    /// # Panics
    ///
    /// 另一个任务已经阻塞在这个通道上时 panic。
    pub fn get(&self, cx: &TaskContext<'_>) -> T {
        let me = cx.downgrade();
        let mut state = self.state.lock();
        loop {
            // 被唤醒时槽位已被 put 取走，期间可能有别的任务登记
            let mine = match &state.waiting {
                Some(waiting) => {
                    let mine = Weak::ptr_eq(waiting, &me);
                    if !mine && state.items.is_empty() {
                        drop(state);
                        panic!("Channel::get: {} blocked while another task is waiting", cx.ident());
                    }
                    mine
                }
                None => false,
            };
            if let Some(value) = state.items.pop() {
                if mine {
                    state.waiting = None;
                }
                return value;
            }
            state.waiting = Some(me.clone());
            drop(state);
            cx.suspend();
            state = self.state.lock();
        }
    }

    /// 非阻塞地取出一个元素
    pub fn try_get(&self) -> Option<T> {
        self.state.lock().items.pop()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.state.lock().items.is_full()
    }

    pub const fn capacity(&self) -> usize {
        CHANNEL_CAPACITY
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}
