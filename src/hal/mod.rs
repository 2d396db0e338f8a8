//! 硬件抽象层 (HAL)
//!
//! 栈上下文记录和架构相关的切换例程。这是整个运行时里
//! 唯一直接操作栈指针的地方。

pub mod traits;
mod native;

use core::cell::Cell;

pub use native::NativeSwitch;
pub use traits::*;

/// 保存的执行上下文
///
/// 只记录栈指针，其余 callee-saved 寄存器由切换例程压在对应的栈上。
/// 切换例程通过 [`StackContext::sp_ptr`] 写入，因此用 `Cell` 承载。
#[repr(C)]
#[derive(Debug, Default)]
pub struct StackContext {
    sp: Cell<usize>,
}

impl StackContext {
    pub const fn new() -> Self {
        Self { sp: Cell::new(0) }
    }

    /// 以给定栈指针构造上下文
    pub(crate) fn with_sp(sp: usize) -> Self {
        Self { sp: Cell::new(sp) }
    }

    /// 保存的栈指针，0 表示尚未保存过
    pub fn sp(&self) -> usize {
        self.sp.get()
    }

    pub(crate) fn set_sp(&self, sp: usize) {
        self.sp.set(sp);
    }

    pub(crate) fn sp_ptr(&self) -> *mut usize {
        self.sp.as_ptr()
    }
}
