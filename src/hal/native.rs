//! 本机架构的切换例程
//!
//! 汇编实现见 `asm/` 目录。

use super::traits::{ArchInfo, ContextSwitch, EntryFn, IsrFn};
use super::StackContext;
use core::arch::global_asm;

#[cfg(not(all(
    any(target_arch = "x86_64", target_arch = "aarch64"),
    unix,
    not(target_vendor = "apple")
)))]
compile_error!("neon-fiber only supports x86_64 and aarch64 ELF targets");

#[cfg(target_arch = "x86_64")]
global_asm!(include_str!("asm/x86_64.s"));

#[cfg(target_arch = "aarch64")]
global_asm!(include_str!("asm/aarch64.s"));

unsafe extern "C" {
    fn neon_fiber_switch(from: *mut usize, to: *const usize);
    fn neon_fiber_switch_start(from: *mut usize, to: *const usize, entry: usize, arg: usize);
    fn neon_fiber_switch_irq(from: *mut usize, to: *const usize, isr: usize, data: usize);
}

/// 当前编译目标的上下文切换实现
pub struct NativeSwitch;

impl ContextSwitch for NativeSwitch {
    #[inline(always)]
    unsafe fn switch(from: &StackContext, to: &StackContext) {
        unsafe { neon_fiber_switch(from.sp_ptr(), to.sp_ptr()) }
    }

    #[inline(always)]
    unsafe fn switch_start(from: &StackContext, to: &StackContext, entry: EntryFn, arg: *mut ()) {
        unsafe { neon_fiber_switch_start(from.sp_ptr(), to.sp_ptr(), entry as usize, arg as usize) }
    }

    #[inline(always)]
    unsafe fn switch_irq(from: &StackContext, to: &StackContext, isr: IsrFn, data: *mut ()) {
        unsafe { neon_fiber_switch_irq(from.sp_ptr(), to.sp_ptr(), isr as usize, data as usize) }
    }
}

impl ArchInfo for NativeSwitch {
    fn arch_name() -> &'static str {
        #[cfg(target_arch = "x86_64")]
        {
            "x86_64"
        }
        #[cfg(target_arch = "aarch64")]
        {
            "aarch64"
        }
    }

    fn stack_alignment() -> usize {
        crate::config::STACK_ALIGN
    }

    fn saved_frame_size() -> usize {
        #[cfg(target_arch = "x86_64")]
        {
            64
        }
        #[cfg(target_arch = "aarch64")]
        {
            160
        }
    }
}
