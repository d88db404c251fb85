//! 挂起适配器：四原语挂起协议及其 `Future` 桥接。
//!
//! # 契约说明（What）
//! - [`Awaiter`] 描述宿主异步机制需要的全部能力：`is_completed`、`get_result`、
//!   `on_completed`（保留上下文）、`on_completed_unsafe`（不关心上下文）；
//! - **调用约定**：调用方必须先查询 `is_completed`，仅在返回 `false` 时注册续体；
//!   在已完成实例上注册续体不属于调用方可依赖的契约；
//! - [`AwaitFuture`] 按上述约定把任意 `Awaiter` 变成标准 `Future`，于是 `light.await` 可直接使用。

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures_util::task::AtomicWaker;

use crate::{
    Result,
    context::{Continuation, ResumeTarget},
    light::LightResult,
};

/// 宿主异步机制消费的挂起协议。
pub trait Awaiter {
    /// 提取成功时的值类型。
    type Output;

    /// 是否已完成；与被包装对象的完成状态保持一致。
    fn is_completed(&self) -> bool;

    /// 提取结果，故障与取消以错误形式传播。
    ///
    /// 在未完成时调用会阻塞当前线程，调用方应先确认 [`is_completed`](Self::is_completed)。
    fn get_result(self) -> Result<Self::Output>;

    /// 注册保留调度上下文的续体。
    fn on_completed(&self, continuation: Continuation);

    /// 注册不捕获调度上下文的续体。
    fn on_completed_unsafe(&self, continuation: Continuation);
}

/// [`LightResult`] 的挂起适配器，每个 await 表达式创建一次。
///
/// # 逻辑解析（How）
/// - 值分支：`is_completed` 恒为真，`get_result` 直接移出值；
/// - 句柄分支：全部委托给 [`CompletionHandle`](crate::CompletionHandle) 的同名能力。
pub struct LightAwaiter<T> {
    light: LightResult<T>,
}

impl<T> LightAwaiter<T> {
    pub fn new(light: LightResult<T>) -> Self {
        Self { light }
    }

    /// 被适配的联合体。
    pub fn light_result(&self) -> &LightResult<T> {
        &self.light
    }

    fn register(&self, preserve_context: bool, continuation: Continuation) {
        match &self.light {
            LightResult::Pending(handle) => {
                handle.configure_on_completed(preserve_context, continuation)
            }
            // 违反调用约定的迟到注册：不分配句柄，按已完成句柄的规则异步派发。
            LightResult::Value(_) => {
                ResumeTarget::capture(preserve_context).resume_after_registration(continuation)
            }
        }
    }
}

impl<T: Clone> Awaiter for LightAwaiter<T> {
    type Output = T;

    fn is_completed(&self) -> bool {
        self.light.is_completed()
    }

    fn get_result(self) -> Result<T> {
        self.light.into_result()
    }

    fn on_completed(&self, continuation: Continuation) {
        self.register(true, continuation);
    }

    fn on_completed_unsafe(&self, continuation: Continuation) {
        self.register(false, continuation);
    }
}

impl<T: fmt::Debug> fmt::Debug for LightAwaiter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LightAwaiter")
            .field("light", &self.light)
            .finish()
    }
}

/// 将 [`Awaiter`] 桥接为标准 `Future`。
///
/// # 逻辑解析（How）
/// 1. 每次轮询先查询 `is_completed`，已完成则立即 `get_result`（值分支的快速路径不会注册任何续体）；
/// 2. 首次未完成时经 `on_completed` 注册唯一一个续体，续体只唤醒 [`AtomicWaker`] 中最新的唤醒器；
/// 3. 注册后再次查询完成状态，覆盖“查询与注册之间完成”的竞态。
///
/// # 契约说明（What）
/// - 续体经 `on_completed` 注册，因此唤醒发生在被捕获的调度上下文上；对于配置视图，由其自身标志决定；
/// - 完成后再次轮询会 panic，与标准 `Future` 契约一致。
pub struct AwaitFuture<A> {
    awaiter: Option<A>,
    waker: Option<Arc<AtomicWaker>>,
}

impl<A: Awaiter> AwaitFuture<A> {
    pub fn new(awaiter: A) -> Self {
        Self {
            awaiter: Some(awaiter),
            waker: None,
        }
    }

    fn take_result(&mut self) -> Poll<Result<A::Output>> {
        let awaiter = self
            .awaiter
            .take()
            .expect("AwaitFuture 在完成后被再次轮询");
        Poll::Ready(awaiter.get_result())
    }
}

impl<A> Unpin for AwaitFuture<A> {}

impl<A: Awaiter> Future for AwaitFuture<A> {
    type Output = Result<A::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let awaiter = this
            .awaiter
            .as_ref()
            .expect("AwaitFuture 在完成后被再次轮询");
        if awaiter.is_completed() {
            return this.take_result();
        }
        match &this.waker {
            Some(waker) => waker.register(cx.waker()),
            None => {
                let waker = Arc::new(AtomicWaker::new());
                waker.register(cx.waker());
                let notifier = Arc::clone(&waker);
                awaiter.on_completed(Box::new(move || notifier.wake()));
                this.waker = Some(waker);
            }
        }
        if awaiter.is_completed() {
            return this.take_result();
        }
        Poll::Pending
    }
}

impl<A: fmt::Debug> fmt::Debug for AwaitFuture<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwaitFuture")
            .field("awaiter", &self.awaiter)
            .field("registered", &self.waker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompletionSource, LightError, error::Fault};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn value_fast_path_extracts_without_registration() {
        let awaiter = LightResult::from_value(11).suspend();
        assert!(awaiter.is_completed());
        assert_eq!(awaiter.get_result().expect("值分支直接返回"), 11);
    }

    #[test]
    fn handle_path_propagates_fault() {
        let source = CompletionSource::<u8>::new();
        let awaiter = LightResult::from_handle(source.handle()).suspend();
        assert!(!awaiter.is_completed());
        source.set_fault(Fault::msg("io")).expect("完成必须成功");
        assert!(awaiter.is_completed());
        let err = awaiter.get_result().expect_err("故障必须被重新抛出");
        assert!(matches!(err, LightError::Faulted(_)));
    }

    #[test]
    fn unsafe_registration_fires_on_completing_thread() {
        let source = CompletionSource::<u8>::new();
        let awaiter = LightResult::from_handle(source.handle()).suspend();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        awaiter.on_completed_unsafe(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        source.set_canceled().expect("完成必须成功");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(awaiter.get_result().expect_err("取消必须被重新抛出").is_canceled());
    }

    #[test]
    fn await_future_on_value_is_immediately_ready() {
        let value = futures::executor::block_on(async { LightResult::from_value(5_i32).await });
        assert_eq!(value.expect("就绪值不应失败"), 5);
    }
}
