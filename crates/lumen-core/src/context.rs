//! 环境调度上下文（ambient scheduling context）。
//!
//! # 设计背景（Why）
//! - 续体的“在哪里恢复”由捕获的调度上下文决定：UI 线程、单线程事件循环、或者测试中手动驱动的队列；
//! - 上下文以线程局部变量的形式挂在当前线程上，[`enter`] 返回守卫并在析构时恢复先前值。
//!
//! # 契约说明（What）
//! - [`SchedulingContext::post`] 必须异步执行续体，不得在 `post` 返回前同步调用；
//! - [`current`] 仅返回当前线程通过 [`enter`] 安装的上下文，线程之间互不可见；
//! - 未安装上下文的线程上，“保留上下文”的注册退化为普通注册。

use std::{cell::RefCell, fmt, marker::PhantomData, sync::Arc};

/// 续体：完成时调用一次的回调。
pub type Continuation = Box<dyn FnOnce() + Send + 'static>;

/// 调度上下文契约。
///
/// # 契约说明（What）
/// - **前置条件**：实现必须 `Send + Sync`，因为完成线程可能是任意线程；
/// - **后置条件**：被投递的续体最终恰好执行一次；若上下文关闭，实现负责记录并丢弃，不得重复执行。
pub trait SchedulingContext: Send + Sync {
    /// 将续体投递到该上下文。
    fn post(&self, continuation: Continuation);

    /// 调试用名称。
    fn name(&self) -> &str {
        "anonymous"
    }
}

impl fmt::Debug for dyn SchedulingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulingContext")
            .field("name", &self.name())
            .finish()
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<dyn SchedulingContext>>> = const { RefCell::new(None) };
}

/// 返回当前线程安装的调度上下文。
pub fn current() -> Option<Arc<dyn SchedulingContext>> {
    CURRENT.with(|slot| slot.borrow().clone())
}

/// 在当前线程安装调度上下文，守卫析构时恢复先前值。
pub fn enter(context: Arc<dyn SchedulingContext>) -> ContextGuard {
    let previous = CURRENT.with(|slot| slot.borrow_mut().replace(context));
    ContextGuard {
        previous,
        _not_send: PhantomData,
    }
}

/// [`enter`] 返回的作用域守卫。
///
/// 守卫绑定在安装它的线程上（`!Send`），嵌套安装按栈顺序恢复。
#[must_use = "dropping the guard immediately restores the previous context"]
pub struct ContextGuard {
    previous: Option<Arc<dyn SchedulingContext>>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|slot| *slot.borrow_mut() = previous);
    }
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard")
            .field("restores", &self.previous.as_ref().map(|ctx| ctx.name().to_owned()))
            .finish()
    }
}

/// 一次续体注册捕获到的目标。
///
/// `Captured` 表示投递回捕获的上下文；`Detached` 表示不关心恢复位置。
pub(crate) enum ResumeTarget {
    Captured(Arc<dyn SchedulingContext>),
    Detached,
}

impl ResumeTarget {
    /// 根据是否保留上下文决定捕获目标。
    pub(crate) fn capture(preserve_context: bool) -> Self {
        if !preserve_context {
            return ResumeTarget::Detached;
        }
        match current() {
            Some(context) => ResumeTarget::Captured(context),
            None => ResumeTarget::Detached,
        }
    }

    /// 句柄完成时调度续体：捕获的上下文走 `post`，否则在完成线程上内联执行。
    pub(crate) fn resume_on_completion(self, continuation: Continuation) {
        match self {
            ResumeTarget::Captured(context) => {
                tracing::trace!(context = context.name(), "posting continuation to captured context");
                context.post(continuation);
            }
            ResumeTarget::Detached => continuation(),
        }
    }

    /// 注册时句柄已处于终态：不得在注册调用返回前执行续体，因此 `Detached` 交给默认调度器。
    ///
    /// 默认调度器连线程都无法创建时会内联执行，这是唯一的例外。
    pub(crate) fn resume_after_registration(self, continuation: Continuation) {
        match self {
            ResumeTarget::Captured(context) => {
                tracing::trace!(context = context.name(), "late registration posted to captured context");
                context.post(continuation);
            }
            ResumeTarget::Detached => crate::scheduler::dispatch_detached(continuation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_stubs::ManualContext;

    #[test]
    fn enter_restores_previous_context_in_stack_order() {
        assert!(current().is_none(), "新线程不应带有调度上下文");
        let outer = ManualContext::shared("outer");
        let inner = ManualContext::shared("inner");

        let outer_guard = enter(outer.clone());
        assert_eq!(current().map(|ctx| ctx.name().to_owned()).as_deref(), Some("outer"));
        {
            let _inner_guard = enter(inner.clone());
            assert_eq!(current().map(|ctx| ctx.name().to_owned()).as_deref(), Some("inner"));
        }
        assert_eq!(current().map(|ctx| ctx.name().to_owned()).as_deref(), Some("outer"));
        drop(outer_guard);
        assert!(current().is_none());
    }

    #[test]
    fn capture_without_preserve_is_detached() {
        let ctx = ManualContext::shared("ui");
        let _guard = enter(ctx);
        assert!(matches!(ResumeTarget::capture(false), ResumeTarget::Detached));
        assert!(matches!(ResumeTarget::capture(true), ResumeTarget::Captured(_)));
    }
}
