//! 两方结果交接
//!
//! 一个生产者调用一次 [`Future::set_result`]，一个消费者通过 [`Future::get`]
//! 或 [`Future::wait`] 取走结果。状态机完全基于 CAS，不持锁。
//!
//! 状态位：
//!
//! ```text
//! PENDING    消费者已登记为等待者
//! COMPLETED  结果已写入
//! FINISHED   结果已被取走
//! HAZARD     生产者正在读取等待者引用并唤醒它
//! ```
//!
//! HAZARD 在 `set_result` 观察到 PENDING 时与 COMPLETED 一起置位，唤醒完成后清除。
//! 消费者在 HAZARD 清除之前不会认领结果，因此生产者读等待者槽位时不会与消费者竞争。

use crate::error::{FiberError, Result};
use crate::kernel::task::{TaskContext, WeakTaskRef};
use core::cell::UnsafeCell;
use core::fmt;
use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

const EMPTY: u8 = 0x00;
const PENDING: u8 = 0x01;
const COMPLETED: u8 = 0x02;
const FINISHED: u8 = 0x04;
const HAZARD: u8 = 0x08;

/// 单次结果单元
pub struct Future<R> {
    flags: AtomicU8,
    value: UnsafeCell<Option<R>>,
    /// 只在未置 PENDING 时由消费者写，只在 HAZARD 期间由生产者读
    waiter: UnsafeCell<Option<WeakTaskRef>>,
    produced: AtomicBool,
    waiting: AtomicBool,
}

// Safety: value 和 waiter 的访问由上面的状态位协议串行化
unsafe impl<R: Send> Send for Future<R> {}
unsafe impl<R: Send> Sync for Future<R> {}

impl<R> Future<R> {
    pub const fn new() -> Self {
        Self {
            flags: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(None),
            waiter: UnsafeCell::new(None),
            produced: AtomicBool::new(false),
            waiting: AtomicBool::new(false),
        }
    }

    /// 已经带有结果的 Future
    pub const fn ready(value: R) -> Self {
        Self {
            flags: AtomicU8::new(COMPLETED),
            value: UnsafeCell::new(Some(value)),
            waiter: UnsafeCell::new(None),
            produced: AtomicBool::new(true),
            waiting: AtomicBool::new(false),
        }
    }

    /// 结果是否已写入
    pub fn is_ready(&self) -> bool {
        self.flags.load(Ordering::Acquire) & COMPLETED != 0
    }

    /// 结果是否已被取走
    pub fn is_consumed(&self) -> bool {
        self.flags.load(Ordering::Acquire) & FINISHED != 0
    }

    /// 非阻塞地取结果
    ///
    /// 结果只能取走一次，之后再调用返回 `None`。
    pub fn get(&self) -> Option<R> {
        self.claim().ok()?;
        // Safety: 赢得 FINISHED 的一方独占 value
        unsafe { (*self.value.get()).take() }
    }

    /// 阻塞当前任务直到结果就绪
    ///
    /// # Panics
    ///
    /// 两个任务同时等待，或结果已经被取走时 panic。
    pub fn wait(&self, cx: &TaskContext<'_>) -> R {
        assert!(
            !self.waiting.swap(true, Ordering::AcqRel),
            "Future::wait: {} is not the only waiter",
            cx.ident()
        );

        loop {
            let cur = self.flags.load(Ordering::Acquire);
            if cur & FINISHED != 0 {
                self.waiting.store(false, Ordering::Release);
                panic!("Future::wait: result already consumed");
            }
            if cur & COMPLETED != 0 {
                if self.claim().is_ok() {
                    break;
                }
                // 生产者还在唤醒我们
                spin_loop();
                continue;
            }
            if cur & PENDING == 0 {
                // Safety: 未置 PENDING，生产者不会读 waiter
                unsafe { *self.waiter.get() = Some(cx.downgrade()) };
                if self
                    .flags
                    .compare_exchange(cur, cur | PENDING, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    continue;
                }
            }
            cx.suspend();
        }

        // Safety: 已认领且 HAZARD 已清除，生产者不再访问任何字段
        let value = unsafe {
            *self.waiter.get() = None;
            (*self.value.get()).take()
        };
        self.waiting.store(false, Ordering::Release);
        match value {
            Some(value) => value,
            None => unreachable!("completed future without a value"),
        }
    }

    /// 写入结果并唤醒等待者
    ///
    /// 只能调用一次，第二次返回 [`FiberError::FutureAlreadySet`]。
    pub fn set_result(&self, value: R) -> Result<()> {
        if self.produced.swap(true, Ordering::AcqRel) {
            return Err(FiberError::FutureAlreadySet);
        }
        // Safety: COMPLETED 置位前消费者不会读 value
        unsafe { *self.value.get() = Some(value) };

        let prev = match self.flags.fetch_update(Ordering::AcqRel, Ordering::Acquire, |f| {
            Some(if f & PENDING != 0 { f | COMPLETED | HAZARD } else { f | COMPLETED })
        }) {
            Ok(prev) | Err(prev) => prev,
        };

        if prev & PENDING != 0 {
            // Safety: HAZARD 期间消费者不会改 waiter
            let waiter = unsafe { (*self.waiter.get()).as_ref().and_then(|w| w.upgrade()) };
            if let Some(task) = waiter {
                task.wake();
            }
            self.flags.fetch_and(!HAZARD, Ordering::Release);
        }
        Ok(())
    }

    /// COMPLETED → COMPLETED|FINISHED，HAZARD 期间不认领
    fn claim(&self) -> core::result::Result<u8, u8> {
        self.flags.fetch_update(Ordering::AcqRel, Ordering::Acquire, |f| {
            (f & COMPLETED != 0 && f & (FINISHED | HAZARD) == 0).then_some(f | FINISHED)
        })
    }
}

impl<R> Default for Future<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for Future<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = self.flags.load(Ordering::Acquire);
        f.debug_struct("Future")
            .field("pending", &(flags & PENDING != 0))
            .field("completed", &(flags & COMPLETED != 0))
            .field("finished", &(flags & FINISHED != 0))
            .finish()
    }
}
