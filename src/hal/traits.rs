//! 硬件抽象层 Trait 定义
//!
//! 协程只通过这里的接口与具体架构的切换例程交互，
//! 不同架构（x86_64, AArch64）各自实现。

use super::StackContext;

/// 协程入口函数
///
/// 入口永远不返回，结束时必须切换回别的上下文。
pub type EntryFn = unsafe extern "C" fn(*mut ()) -> !;

/// 中断回调，在目标栈上执行
pub type IsrFn = unsafe extern "C" fn(*mut ());

/// 上下文切换 trait
///
/// 定义了在两个执行上下文之间转移控制所需的基本操作。
/// 被保存的上下文只有一个栈指针，callee-saved 寄存器压在被切走的栈上。
///
/// # Safety
///
/// 所有操作都直接替换当前栈，调用者必须保证：
/// - `to` 指向一个有效的、尚未被其他线程使用的上下文
/// - 目标栈在切换期间一直存活
pub trait ContextSwitch {
    /// 保存当前上下文到 `from`，恢复 `to`
    unsafe fn switch(from: &StackContext, to: &StackContext);

    /// 首次进入一个新栈
    ///
    /// 保存当前上下文到 `from`，把栈指针设为 `to`，然后调用 `entry(arg)`。
    unsafe fn switch_start(from: &StackContext, to: &StackContext, entry: EntryFn, arg: *mut ());

    /// 切换到 `to`，在目标栈上先执行 `isr(data)`，然后再恢复目标上下文
    unsafe fn switch_irq(from: &StackContext, to: &StackContext, isr: IsrFn, data: *mut ());
}

/// 架构信息 trait
///
/// 提供架构相关的信息查询
pub trait ArchInfo {
    /// 获取架构名称
    fn arch_name() -> &'static str;

    /// 获取栈对齐要求
    fn stack_alignment() -> usize;

    /// 一次切换在栈上保存的字节数
    fn saved_frame_size() -> usize;
}
