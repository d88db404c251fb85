//! `LightResult<T>`：值或待完成句柄的联合体。
//!
//! # 设计背景（Why）
//! - 多数调用在返回时结果已经可知，此时无需为一次性的结果分配完成句柄；只有真正异步的路径才委托给
//!   [`CompletionHandle`]。
//!
//! # 契约说明（What）
//! - **二选一**：`Value(T)` 与 `Pending(handle)` 互斥，所有行为由当前分支决定；
//! - **不可变**：构造后不提供就地修改，只能整体移动或克隆；
//! - **相等性（刻意不对称）**：任一侧为句柄时比较句柄身份，两个语义相同但实例不同的句柄不相等；
//!   两侧均为值时做结构比较。`Hash` 与之分支一致，保证 `a == b ⇒ hash(a) == hash(b)`；
//! - **物化不缓存**：值分支每次 [`materialize`](LightResult::materialize) 都分配新句柄，句柄分支始终返回同一引用。
//!
//! # 风险提示（Trade-offs）
//! - 句柄分支的提取需要 `T: Clone`，因为同一句柄可能被多个持有者读取。

use std::{
    fmt,
    future::{Future, IntoFuture},
    hash::{Hash, Hasher},
};

use futures_util::future::{self, Either, Ready};

use crate::{
    LightError, Result,
    awaiter::{AwaitFuture, LightAwaiter},
    configured::ConfiguredLightResult,
    handle::{CompletionHandle, CompletionSource, HandleFuture},
    error::Fault,
};

/// 值优先的异步结果联合体。
///
/// # 使用方式（How）
/// ```rust
/// use lumen_core::{CompletionSource, LightResult};
///
/// let ready = LightResult::from_value(42);
/// assert!(ready.is_completed());
/// assert_eq!(ready.result().unwrap(), 42);
///
/// let source = CompletionSource::new();
/// let pending = LightResult::from_handle(source.handle());
/// assert!(!pending.is_completed());
/// source.set_result(7).unwrap();
/// assert_eq!(pending.result().unwrap(), 7);
/// ```
pub enum LightResult<T> {
    /// 结果已就绪，零分配。
    Value(T),
    /// 结果由完成句柄承载。
    Pending(CompletionHandle<T>),
}

impl<T> LightResult<T> {
    /// 以就绪值构造，始终成功且不分配。
    pub const fn from_value(value: T) -> Self {
        LightResult::Value(value)
    }

    /// 以完成句柄构造。
    pub fn from_handle(handle: CompletionHandle<T>) -> Self {
        LightResult::Pending(handle)
    }

    /// 以可能为空的句柄构造，空句柄返回 [`LightError::NullHandle`]。
    pub fn try_from_handle(handle: Option<CompletionHandle<T>>) -> Result<Self> {
        handle
            .map(LightResult::Pending)
            .ok_or(LightError::NullHandle)
    }

    /// 以故障构造一个句柄支撑的实例。
    pub fn from_fault(fault: Fault) -> Self {
        LightResult::Pending(CompletionHandle::from_fault(fault))
    }

    /// 以取消构造一个句柄支撑的实例。
    pub fn canceled() -> Self {
        LightResult::Pending(CompletionHandle::canceled())
    }

    /// 是否由完成句柄承载。
    pub fn is_handle_backed(&self) -> bool {
        matches!(self, LightResult::Pending(_))
    }

    /// 被包装的句柄（若有）。
    pub fn handle(&self) -> Option<&CompletionHandle<T>> {
        match self {
            LightResult::Pending(handle) => Some(handle),
            LightResult::Value(_) => None,
        }
    }

    /// 值分支恒为 `true`；句柄分支实时读取句柄状态，不做缓存。
    pub fn is_completed(&self) -> bool {
        match self {
            LightResult::Value(_) => true,
            LightResult::Pending(handle) => handle.is_completed(),
        }
    }

    pub fn is_completed_successfully(&self) -> bool {
        match self {
            LightResult::Value(_) => true,
            LightResult::Pending(handle) => handle.is_completed_successfully(),
        }
    }

    pub fn is_faulted(&self) -> bool {
        match self {
            LightResult::Value(_) => false,
            LightResult::Pending(handle) => handle.is_faulted(),
        }
    }

    pub fn is_canceled(&self) -> bool {
        match self {
            LightResult::Value(_) => false,
            LightResult::Pending(handle) => handle.is_canceled(),
        }
    }

    /// 同步取值：仅值分支成功，句柄分支无论是否已完成都返回 [`LightError::InvalidCast`]。
    pub fn try_unwrap_value(self) -> Result<T> {
        match self {
            LightResult::Value(value) => Ok(value),
            LightResult::Pending(_) => Err(LightError::InvalidCast),
        }
    }

    /// [`try_unwrap_value`](Self::try_unwrap_value) 的借用版本。
    pub fn value(&self) -> Result<&T> {
        match self {
            LightResult::Value(value) => Ok(value),
            LightResult::Pending(_) => Err(LightError::InvalidCast),
        }
    }

    /// 消费自身并返回完成句柄；值分支分配一个已成功的新句柄。
    pub fn into_handle(self) -> CompletionHandle<T> {
        match self {
            LightResult::Value(value) => {
                tracing::trace!("materializing completion handle from ready value");
                CompletionHandle::from_value(value)
            }
            LightResult::Pending(handle) => handle,
        }
    }

    /// 返回挂起适配器。
    pub fn suspend(self) -> LightAwaiter<T> {
        LightAwaiter::new(self)
    }

    /// 返回带“是否保留调度上下文”标志的配置视图。
    pub fn configure_completion_context(self, preserve_context: bool) -> ConfiguredLightResult<T> {
        ConfiguredLightResult::new(self, preserve_context)
    }
}

impl<T: Clone> LightResult<T> {
    /// 阻塞访问器。
    ///
    /// # 契约说明（What）
    /// - 值分支立即返回值的克隆；
    /// - 句柄分支阻塞当前线程直至句柄终态，故障与取消原样作为错误返回；
    /// - **风险提示**：这是刻意保留的同步出口，在单线程派发器上等待其自身要执行的工作会死锁。
    pub fn result(&self) -> Result<T> {
        match self {
            LightResult::Value(value) => Ok(value.clone()),
            LightResult::Pending(handle) => handle.wait(),
        }
    }

    /// 消费版阻塞访问器，值分支不克隆。
    pub fn into_result(self) -> Result<T> {
        match self {
            LightResult::Value(value) => Ok(value),
            LightResult::Pending(handle) => handle.wait(),
        }
    }

    /// 物化为完成句柄。
    ///
    /// # 契约说明（What）
    /// - 句柄分支：每次返回同一引用；
    /// - 值分支：每次分配一个新的已成功句柄，不做缓存，以保持联合体本身不可变。
    pub fn materialize(&self) -> CompletionHandle<T> {
        self.clone().into_handle()
    }

    /// 转为生态中更轻的 `Future` 形态：值分支为 [`Ready`]，句柄分支为 [`HandleFuture`]。
    ///
    /// 与 [`materialize`](Self::materialize) 分支一致，但值分支不会强制分配句柄。
    pub fn into_alternate(self) -> Either<Ready<Result<T>>, HandleFuture<T>> {
        match self {
            LightResult::Value(value) => Either::Left(future::ready(Ok(value))),
            LightResult::Pending(handle) => Either::Right(HandleFuture::new(handle)),
        }
    }
}

impl<T> LightResult<T>
where
    T: Send + 'static,
{
    /// 由 `Future` 构造联合体：先内联轮询一次，就绪则走值分支，否则交给默认调度器驱动。
    ///
    /// # 契约说明（What）
    /// - `Ok(v)` 就绪 → `Value(v)`，不分配完成句柄；
    /// - `Err(fault)` 就绪 → 已故障的句柄分支；
    /// - 未就绪 → 句柄分支，句柄由调度器线程在 Future 完成时写入；
    ///   Future panic 或在完成前被丢弃时，句柄以故障结束，等待方不会永久阻塞。
    ///
    /// # 风险提示（Trade-offs）
    /// - 为了能在首次轮询后继续驱动，Future 会被装箱固定；节省的是完成句柄，而非 Future 本身的分配。
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = core::result::Result<T, Fault>> + Send + 'static,
    {
        use futures_util::FutureExt;

        let mut future = Box::pin(future);
        match future.as_mut().now_or_never() {
            Some(Ok(value)) => LightResult::Value(value),
            Some(Err(fault)) => LightResult::from_fault(fault),
            None => {
                let source = CompletionSource::new();
                let result = LightResult::Pending(source.handle());
                crate::scheduler::spawn_detached(async move {
                    let guard = SettleOnDrop(source);
                    let completed = match future.await {
                        Ok(value) => guard.0.try_set_result(value),
                        Err(fault) => guard.0.try_set_fault(fault),
                    };
                    debug_assert!(completed, "detached future owns the only completion source");
                });
                result
            }
        }
    }
}

/// 分离任务持有的唯一完成源：任务因 panic 或被丢弃而未写入结果时，以故障收尾。
struct SettleOnDrop<T>(CompletionSource<T>);

impl<T> Drop for SettleOnDrop<T> {
    fn drop(&mut self) {
        if self
            .0
            .try_set_fault(Fault::msg("detached future ended without producing a result"))
        {
            tracing::warn!("detached future dropped before completion; handle faulted");
        }
    }
}

impl<T> From<CompletionHandle<T>> for LightResult<T> {
    fn from(handle: CompletionHandle<T>) -> Self {
        LightResult::Pending(handle)
    }
}

impl<T: Default> Default for LightResult<T> {
    /// 默认实例等价于 `Value(T::default())`。
    fn default() -> Self {
        LightResult::Value(T::default())
    }
}

impl<T: Clone> Clone for LightResult<T> {
    fn clone(&self) -> Self {
        match self {
            LightResult::Value(value) => LightResult::Value(value.clone()),
            LightResult::Pending(handle) => LightResult::Pending(handle.clone()),
        }
    }
}

impl<T: PartialEq> PartialEq for LightResult<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LightResult::Value(a), LightResult::Value(b)) => a == b,
            (LightResult::Pending(a), LightResult::Pending(b)) => CompletionHandle::ptr_eq(a, b),
            // 任一侧为句柄即按身份比较；值与句柄不可能是同一实例。
            _ => false,
        }
    }
}

impl<T: Eq> Eq for LightResult<T> {}

impl<T: Hash> Hash for LightResult<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            LightResult::Value(value) => value.hash(state),
            LightResult::Pending(handle) => handle.hash(state),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for LightResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LightResult::Value(value) => f.debug_tuple("Value").field(value).finish(),
            LightResult::Pending(handle) => f.debug_tuple("Pending").field(handle).finish(),
        }
    }
}

impl<T: fmt::Display> fmt::Display for LightResult<T> {
    /// 值分支渲染值本身；句柄分支仅在成功完成时渲染值，故障、取消或未完成渲染为空。
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LightResult::Value(value) => fmt::Display::fmt(value, f),
            LightResult::Pending(handle) => handle.peek(|value| match value {
                Some(value) => fmt::Display::fmt(value, f),
                None => Ok(()),
            }),
        }
    }
}

impl<U: fmt::Display> LightResult<Option<U>> {
    /// 以 `None` 作为“无值”哨兵的字符串渲染：哨兵、故障、取消与未完成均为空串。
    pub fn render(&self) -> String {
        let render_slot = |slot: Option<&Option<U>>| match slot {
            Some(Some(value)) => value.to_string(),
            _ => String::new(),
        };
        match self {
            LightResult::Value(value) => render_slot(Some(value)),
            LightResult::Pending(handle) => handle.peek(render_slot),
        }
    }
}

impl<T: Clone> IntoFuture for LightResult<T> {
    type Output = Result<T>;
    type IntoFuture = AwaitFuture<LightAwaiter<T>>;

    fn into_future(self) -> Self::IntoFuture {
        AwaitFuture::new(self.suspend())
    }
}
