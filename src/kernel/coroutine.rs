//! 协程
//!
//! 每个协程拥有一块独立的栈和一个 [`StackContext`]。`start` / `resume` 从调用者
//! 切换进协程，`yield_to` 从协程切换回调用者，`irq` 在协程栈上插入一次回调。
//!
//! 所有切换操作都是 `unsafe` 的：
//! - 同一时刻每个线程上最多有一个活跃的协程
//! - 协程必须比所有指向它的切换活得更久
//! - 没有栈保护页，栈溢出是未定义行为

use crate::config::{DEFAULT_STACK_SIZE, MIN_STACK_SIZE, STACK_ALIGN, STACK_RED_ZONE};
use crate::hal::{ContextSwitch, EntryFn, NativeSwitch, StackContext};
use core::cell::Cell;
use core::ptr::NonNull;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

type PanicPayload = Box<dyn Any + Send>;

/// 协程
pub struct Coroutine {
    /// 栈内存，切换例程通过裸指针访问
    stack: NonNull<[u8]>,
    ctx: StackContext,
    entry: EntryFn,
    data: *mut (),
    started: Cell<bool>,
    /// `irq` 回调中捕获的 panic，在协程恢复点重新抛出
    pending_panic: Cell<Option<PanicPayload>>,
}

impl Coroutine {
    /// 使用默认栈大小创建协程
    ///
    /// `entry(data)` 在首次 `start` 时于协程栈上执行，永不返回。
    pub fn new(entry: EntryFn, data: *mut ()) -> Self {
        Self::with_stack_size(DEFAULT_STACK_SIZE, entry, data)
    }

    /// 指定栈大小创建协程
    ///
    /// # Panics
    ///
    /// `stack_size` 小于 [`MIN_STACK_SIZE`] 时 panic。
    pub fn with_stack_size(stack_size: usize, entry: EntryFn, data: *mut ()) -> Self {
        assert!(
            stack_size >= MIN_STACK_SIZE,
            "coroutine stack of {} bytes is below the {} byte minimum",
            stack_size,
            MIN_STACK_SIZE
        );
        let stack: Box<[u8]> = vec![0u8; stack_size].into_boxed_slice();
        let stack = NonNull::from(Box::leak(stack));
        let base = stack.as_ptr() as *mut u8 as usize;
        let sp = (base + stack_size - STACK_RED_ZONE) & !(STACK_ALIGN - 1);
        Self {
            stack,
            ctx: StackContext::with_sp(sp),
            entry,
            data,
            started: Cell::new(false),
            pending_panic: Cell::new(None),
        }
    }

    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    pub fn is_started(&self) -> bool {
        self.started.get()
    }

    /// 栈底（最低地址）和栈顶
    pub fn stack_bounds(&self) -> (usize, usize) {
        let base = self.stack.as_ptr() as *mut u8 as usize;
        (base, base + self.stack.len())
    }

    /// 首次进入协程，调用者上下文保存到 `save`
    ///
    /// # Safety
    ///
    /// 协程未启动过；`save` 在协程切回之前保持有效。
    pub unsafe fn start(&self, save: &StackContext) {
        debug_assert!(!self.started.get(), "coroutine started twice");
        self.started.set(true);
        unsafe { NativeSwitch::switch_start(save, &self.ctx, self.entry, self.data) }
    }

    /// 恢复一个已经让出的协程
    ///
    /// # Safety
    ///
    /// 协程已启动且当前停在 `yield_to`。
    pub unsafe fn resume(&self, save: &StackContext) {
        debug_assert!(self.started.get(), "resume before start");
        unsafe { NativeSwitch::switch(save, &self.ctx) }
    }

    /// 从协程切回 `restore`
    ///
    /// 协程在这里暂停，下次 `resume` 时从这里返回。若期间有 `irq` 回调 panic，
    /// panic 在这里重新抛出。
    ///
    /// # Safety
    ///
    /// 只能在本协程的栈上调用；`restore` 是一个保存过的有效上下文。
    pub unsafe fn yield_to(&self, restore: &StackContext) {
        unsafe { NativeSwitch::switch(&self.ctx, restore) };
        if let Some(payload) = self.pending_panic.take() {
            panic::resume_unwind(payload);
        }
    }

    /// 切换进协程，并在协程自身恢复之前先在协程栈上执行 `isr(data)`
    ///
    /// # Safety
    ///
    /// 同 [`Coroutine::resume`]；`data` 在回调期间有效。
    pub unsafe fn irq<T>(&self, save: &StackContext, isr: fn(&T), data: &T) {
        debug_assert!(self.started.get(), "irq before start");
        let mut frame = IrqFrame {
            isr,
            data: data as *const T,
            co: self as *const Coroutine,
        };
        unsafe {
            NativeSwitch::switch_irq(
                save,
                &self.ctx,
                irq_trampoline::<T>,
                &mut frame as *mut IrqFrame<T> as *mut (),
            )
        }
    }
}

/// 释放栈内存
///
/// 停在 `yield_to` 的协程栈不会被展开，栈上对象的析构函数不会运行。
impl Drop for Coroutine {
    fn drop(&mut self) {
        // Safety: stack 来自 Box::leak，且不再有切换指向它
        unsafe { drop(Box::from_raw(self.stack.as_ptr())) }
    }
}

struct IrqFrame<T> {
    isr: fn(&T),
    data: *const T,
    co: *const Coroutine,
}

/// 在目标栈上运行回调，panic 不能穿过汇编帧，先接住再交给恢复点
unsafe extern "C" fn irq_trampoline<T>(frame: *mut ()) {
    let frame = unsafe { &*(frame as *const IrqFrame<T>) };
    let result = panic::catch_unwind(AssertUnwindSafe(|| (frame.isr)(unsafe { &*frame.data })));
    if let Err(payload) = result {
        unsafe { (*frame.co).pending_panic.set(Some(payload)) };
    }
}
