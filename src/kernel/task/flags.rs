//! 任务状态位
//!
//! 任务状态是一组可以同时存在的标志位，所有修改都通过 CAS 循环完成，
//! 这样一次转换里"检查条件 + 修改"是原子的。

use core::fmt;
use core::ops::{BitAnd, BitOr, Not};
use core::sync::atomic::{AtomicU8, Ordering};

/// 状态位快照
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct FlagSet(u8);

/// 定义状态位常量以及对应的 `is_xxx` 查询方法
macro_rules! task_flags {
    ($($(#[$meta:meta])* $name:ident = $bit:expr;)+) => {
        paste::paste! {
            impl FlagSet {
                $(
                    $(#[$meta])*
                    pub const [<$name:upper>]: FlagSet = FlagSet($bit);
                )+

                $(
                    #[inline]
                    pub const fn [<is_ $name:snake>](self) -> bool {
                        self.0 & $bit != 0
                    }
                )+

                const NAMES: &'static [(&'static str, u8)] = &[$((stringify!($name), $bit)),+];
            }
        }
    };
}

task_flags! {
    /// 正在某个线程上执行
    Running = 0x01;
    /// 闭包已返回
    Finished = 0x02;
    /// 未使用：本运行时不实现取消
    Canceled = 0x04;
    /// 未使用：本运行时不实现取消
    Dead = 0x08;
    /// 已经在（或即将进入）就绪队列
    Queued = 0x10;
    /// 已挂起，等待唤醒
    Suspended = 0x20;
}

impl FlagSet {
    pub const EMPTY: FlagSet = FlagSet(0);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// 是否包含 `other` 的全部位
    pub const fn contains(self, other: FlagSet) -> bool {
        self.0 & other.0 == other.0
    }

    /// 是否与 `other` 有任意交集
    pub const fn intersects(self, other: FlagSet) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn with(self, set: FlagSet, clear: FlagSet) -> FlagSet {
        FlagSet((self.0 | set.0) & !clear.0)
    }
}

impl BitOr for FlagSet {
    type Output = FlagSet;

    fn bitor(self, rhs: FlagSet) -> FlagSet {
        FlagSet(self.0 | rhs.0)
    }
}

impl BitAnd for FlagSet {
    type Output = FlagSet;

    fn bitand(self, rhs: FlagSet) -> FlagSet {
        FlagSet(self.0 & rhs.0)
    }
}

impl Not for FlagSet {
    type Output = FlagSet;

    fn not(self) -> FlagSet {
        FlagSet(!self.0)
    }
}

impl fmt::Debug for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("Empty");
        }
        let mut first = true;
        for (name, bit) in Self::NAMES {
            if self.0 & bit != 0 {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// 原子状态位，由所属任务独占
#[derive(Default)]
pub struct TaskFlags(AtomicU8);

impl TaskFlags {
    pub const fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    pub fn load(&self) -> FlagSet {
        FlagSet(self.0.load(Ordering::Acquire))
    }

    /// 置位 `set`、清除 `clear`，返回修改前的值
    pub fn update(&self, set: FlagSet, clear: FlagSet) -> FlagSet {
        match self.update_with(|cur| Some(cur.with(set, clear))) {
            Ok(prev) | Err(prev) => prev,
        }
    }

    pub fn set(&self, set: FlagSet) -> FlagSet {
        self.update(set, FlagSet::EMPTY)
    }

    pub fn clear(&self, clear: FlagSet) -> FlagSet {
        self.update(FlagSet::EMPTY, clear)
    }

    /// 仅当 `unless` 中的位全部为 0 时置位 `set`
    ///
    /// 成功返回 `Ok(修改前的值)`，条件不满足返回 `Err(当前值)`。
    pub fn set_cond(&self, set: FlagSet, unless: FlagSet) -> Result<FlagSet, FlagSet> {
        self.update_with(|cur| (!cur.intersects(unless)).then(|| cur.with(set, FlagSet::EMPTY)))
    }

    /// 通用的带谓词更新
    ///
    /// `f` 返回 `None` 表示放弃本次修改。
    pub fn update_with<F>(&self, mut f: F) -> Result<FlagSet, FlagSet>
    where
        F: FnMut(FlagSet) -> Option<FlagSet>,
    {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| f(FlagSet(cur)).map(|n| n.0))
            .map(FlagSet)
            .map_err(FlagSet)
    }

    pub fn is_set(&self, flags: FlagSet) -> bool {
        self.load().contains(flags)
    }

    pub fn is_clear(&self, flags: FlagSet) -> bool {
        !self.load().intersects(flags)
    }
}

impl fmt::Debug for TaskFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(), f)
    }
}
