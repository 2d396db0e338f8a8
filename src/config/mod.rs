// 运行时配置常量
use crate::log::LogLevel;

/// 协程默认栈大小（64KB）
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;
/// 协程最小栈大小，低于此值 `TaskBuilder` 会拒绝创建
pub const MIN_STACK_SIZE: usize = 16 * 1024;
/// 栈顶保留区，初始栈指针从栈顶向下偏移这么多字节
pub const STACK_RED_ZONE: usize = 128;
/// 栈指针对齐要求
pub const STACK_ALIGN: usize = 16;
/// 有界通道容量
pub const CHANNEL_CAPACITY: usize = 16;
/// 默认日志级别
pub const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Info;
