//! 运行时边界：异步函数机制构造 [`LightResult`] 返回值所需的最小构建器。
//!
//! # 契约说明（What）
//! - 生产端通过 [`LightResultBuilder::set_result`] / [`set_fault`](LightResultBuilder::set_fault) /
//!   [`set_canceled`](LightResultBuilder::set_canceled) 交付结果，恰好一次；
//! - [`LightResultBuilder::light_result`] 可在交付前或交付后调用：
//!   - 交付前调用：创建构建器自有的完成句柄并返回句柄分支，之后的交付完成该句柄；
//!   - 值先于请求交付：返回值分支，不分配句柄；
//! - 续体注册透传给 [`Awaiter`] 的两种注册原语。

use std::{fmt, mem};

use crate::{
    LightError, Result,
    awaiter::Awaiter,
    context::Continuation,
    error::Fault,
    handle::CompletionSource,
    light::LightResult,
};

enum BuilderState<T> {
    Empty,
    Value(T),
    Source(CompletionSource<T>),
}

/// [`LightResult`] 的构建器。
pub struct LightResultBuilder<T> {
    state: BuilderState<T>,
}

impl<T> LightResultBuilder<T> {
    pub fn new() -> Self {
        Self {
            state: BuilderState::Empty,
        }
    }

    fn source(&mut self) -> &CompletionSource<T> {
        if matches!(self.state, BuilderState::Empty) {
            self.state = BuilderState::Source(CompletionSource::new());
        }
        match &self.state {
            BuilderState::Source(source) => source,
            // `Value` 只会在 `set_result` 中写入，调用方已在此之前拒绝重复交付。
            _ => unreachable!("source requested after a value was delivered"),
        }
    }

    fn ensure_undelivered(&self) -> Result<()> {
        match &self.state {
            BuilderState::Value(_) => Err(LightError::AlreadyCompleted),
            BuilderState::Source(source) if source.handle().is_completed() => {
                Err(LightError::AlreadyCompleted)
            }
            _ => Ok(()),
        }
    }

    /// 交付成功值。
    pub fn set_result(&mut self, value: T) -> Result<()> {
        self.ensure_undelivered()?;
        match &self.state {
            BuilderState::Source(source) => source.set_result(value),
            _ => {
                self.state = BuilderState::Value(value);
                Ok(())
            }
        }
    }

    /// 交付故障；故障始终经由完成句柄承载。
    pub fn set_fault(&mut self, fault: Fault) -> Result<()> {
        self.ensure_undelivered()?;
        self.source().set_fault(fault)
    }

    /// 交付取消。
    pub fn set_canceled(&mut self) -> Result<()> {
        self.ensure_undelivered()?;
        self.source().set_canceled()
    }

    /// 注册保留上下文的续体。
    pub fn await_on_completed<A: Awaiter>(&self, awaiter: &A, continuation: Continuation) {
        awaiter.on_completed(continuation);
    }

    /// 注册不关心上下文的续体。
    pub fn await_unsafe_on_completed<A: Awaiter>(&self, awaiter: &A, continuation: Continuation) {
        awaiter.on_completed_unsafe(continuation);
    }
}

impl<T: Clone> LightResultBuilder<T> {
    /// 返回构建器产出的联合体。
    ///
    /// # 契约说明（What）
    /// - 值已交付：返回值分支（克隆值，构建器保留原值以便重复请求）；
    /// - 尚未交付或以故障/取消结束：返回围绕同一完成句柄的句柄分支，多次调用得到相等的实例。
    pub fn light_result(&mut self) -> LightResult<T> {
        match &self.state {
            BuilderState::Value(value) => LightResult::from_value(value.clone()),
            _ => LightResult::from_handle(self.source().handle()),
        }
    }
}

impl<T> Default for LightResultBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for LightResultBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            BuilderState::Empty => "empty",
            BuilderState::Value(_) => "value",
            BuilderState::Source(_) => "source",
        };
        f.debug_struct("LightResultBuilder")
            .field("state", &state)
            .finish()
    }
}

impl<T> Drop for LightResultBuilder<T> {
    fn drop(&mut self) {
        // 已发放句柄但从未交付结果时以取消收尾，避免等待方永久阻塞。
        if let BuilderState::Source(source) = mem::replace(&mut self.state, BuilderState::Empty) {
            if source.try_set_canceled() {
                tracing::debug!("builder dropped before delivering a result; handle canceled");
            }
        }
    }
}
