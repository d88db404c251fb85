//! 联合体与完成句柄共享的错误域。
//!
//! # 契约说明（What）
//! - [`LightError::NullHandle`]：`try_from_handle` 收到空句柄；
//! - [`LightError::InvalidCast`]：在句柄支撑的实例上尝试同步取值，调用方必须改走挂起路径或阻塞访问器；
//! - [`LightError::Faulted`] / [`LightError::Canceled`]：句柄的终态在每次提取结果时原样重新抛出；
//! - 其余分支服务于生产端（重复完成）与调度器安装。
//!
//! 所有错误均在触发它的调用点同步返回，内部不重试、不吞掉。

use std::{error::Error as StdError, fmt, sync::Arc};

/// 句柄故障的共享载体。
///
/// # 逻辑解析（How）
/// - 内部以 `Arc<dyn Error + Send + Sync>` 保存根因，克隆只增加引用计数；
/// - 同一故障可被多次提取（阻塞访问器、挂起适配器、`HandleFuture`），每次看到的都是同一个根因实例。
#[derive(Clone)]
pub struct Fault {
    cause: Arc<dyn StdError + Send + Sync + 'static>,
}

impl Fault {
    /// 以任意错误构造故障。
    pub fn new(cause: impl StdError + Send + Sync + 'static) -> Self {
        Self {
            cause: Arc::new(cause),
        }
    }

    /// 以纯文本描述构造故障。
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(FaultMessage(message.into()))
    }

    /// 访问根因。
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.cause
    }

    /// 判断两个故障是否为同一根因实例。
    pub fn same_cause(&self, other: &Fault) -> bool {
        Arc::ptr_eq(&self.cause, &other.cause)
    }

    /// 尝试将根因向下转型为具体错误类型。
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.cause.downcast_ref::<E>()
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Fault").field(&self.cause).finish()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.cause, f)
    }
}

impl StdError for Fault {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.cause)
    }
}

impl From<std::io::Error> for Fault {
    fn from(value: std::io::Error) -> Self {
        Fault::new(value)
    }
}

#[derive(Debug)]
struct FaultMessage(String);

impl fmt::Display for FaultMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for FaultMessage {}

/// `lumen-core` 对外暴露的统一错误枚举。
///
/// # 契约说明（What）
/// - 实现 `Clone`，便于同一终态在多个提取点重复返回；
/// - `#[non_exhaustive]`：调用方匹配时需保留通配分支。
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum LightError {
    /// 以空句柄构造联合体。
    #[error("completion handle must not be null")]
    NullHandle,
    /// 在句柄支撑的实例上同步取值。
    #[error("light result is backed by a completion handle; await it or use the blocking accessor")]
    InvalidCast,
    /// 底层操作以故障结束。
    #[error("operation faulted: {0}")]
    Faulted(#[source] Fault),
    /// 底层操作被取消。
    #[error("operation canceled")]
    Canceled,
    /// 句柄已处于终态，无法再次完成。
    #[error("completion handle already reached a terminal state")]
    AlreadyCompleted,
    /// 默认调度器已经安装（或已被惰性初始化）。
    #[error("default scheduler already installed")]
    SchedulerAlreadyInstalled,
    /// 默认调度器的线程池无法创建。
    #[error("default scheduler unavailable: {0}")]
    SchedulerUnavailable(#[source] Fault),
}

impl LightError {
    /// 是否为句柄故障重新抛出的错误。
    pub fn is_faulted(&self) -> bool {
        matches!(self, LightError::Faulted(_))
    }

    /// 是否为取消。
    pub fn is_canceled(&self) -> bool {
        matches!(self, LightError::Canceled)
    }

    /// 若为故障，返回其载体。
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            LightError::Faulted(fault) | LightError::SchedulerUnavailable(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<Fault> for LightError {
    fn from(value: Fault) -> Self {
        LightError::Faulted(value)
    }
}
