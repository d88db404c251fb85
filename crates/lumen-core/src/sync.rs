//! 内部同步原语的统一出口。
//!
//! # 契约说明（What）
//! - 默认构建直接复用 `std::sync`；
//! - `loom-model` Feature 且配合 `--cfg loom`（或 `--cfg lumen_loom`）时切换为 `loom::sync`，
//!   使完成句柄的状态机可以在 Loom 中穷举交错；
//! - `Arc` 始终使用标准库版本：句柄身份比较依赖 `Arc::ptr_eq` 与指针地址哈希。

#[cfg(all(feature = "loom-model", any(loom, lumen_loom)))]
pub(crate) use loom::sync::{
    Condvar, Mutex, MutexGuard,
    atomic::{AtomicU8, Ordering},
};

#[cfg(not(all(feature = "loom-model", any(loom, lumen_loom))))]
pub(crate) use std::sync::{
    Condvar, Mutex, MutexGuard,
    atomic::{AtomicU8, Ordering},
};

/// 获取互斥锁；若持锁线程曾 panic，则继续使用内部数据。
///
/// 句柄状态只在持锁期间做单步替换，不存在“改了一半”的中间态，因此毒化锁的数据仍然一致。
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
