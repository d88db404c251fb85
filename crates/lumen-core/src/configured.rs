//! 上下文可配置的联合体视图及其挂起适配器。
//!
//! # 契约说明（What）
//! - [`ConfiguredLightResult`] = 联合体 + `preserve_context` 标志，纯组合，没有额外不变量；
//! - 完成查询与结果提取保留值分支的快速路径，与 [`LightAwaiter`](crate::LightAwaiter) 完全一致；
//! - 两种续体注册都**先物化句柄**（值分支也会分配），再按 `preserve_context` 把续体交给该句柄；
//!   配置路径在注册续体时不保证零分配。
//!
//! # 风险提示（Trade-offs）
//! - 调用约定保证只有在未完成时才会注册续体，因此值分支的物化只会在违反约定时发生；
//!   即便如此也照常物化，不做特判。

use std::{fmt, future::IntoFuture};

use crate::{
    Result,
    awaiter::{AwaitFuture, Awaiter},
    context::Continuation,
    light::LightResult,
};

/// 携带“是否保留调度上下文”标志的联合体视图。
pub struct ConfiguredLightResult<T> {
    light: LightResult<T>,
    preserve_context: bool,
}

impl<T> ConfiguredLightResult<T> {
    pub fn new(light: LightResult<T>, preserve_context: bool) -> Self {
        Self {
            light,
            preserve_context,
        }
    }

    pub fn preserve_context(&self) -> bool {
        self.preserve_context
    }

    pub fn light_result(&self) -> &LightResult<T> {
        &self.light
    }

    /// 拆回内部联合体。
    pub fn into_inner(self) -> LightResult<T> {
        self.light
    }

    /// 返回配置后的挂起适配器。
    pub fn suspend(self) -> ConfiguredAwaiter<T> {
        ConfiguredAwaiter {
            light: self.light,
            preserve_context: self.preserve_context,
        }
    }
}

impl<T: Clone> Clone for ConfiguredLightResult<T> {
    fn clone(&self) -> Self {
        Self {
            light: self.light.clone(),
            preserve_context: self.preserve_context,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ConfiguredLightResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfiguredLightResult")
            .field("light", &self.light)
            .field("preserve_context", &self.preserve_context)
            .finish()
    }
}

impl<T: Clone> IntoFuture for ConfiguredLightResult<T> {
    type Output = Result<T>;
    type IntoFuture = AwaitFuture<ConfiguredAwaiter<T>>;

    fn into_future(self) -> Self::IntoFuture {
        AwaitFuture::new(self.suspend())
    }
}

/// [`ConfiguredLightResult`] 的挂起适配器。
pub struct ConfiguredAwaiter<T> {
    light: LightResult<T>,
    preserve_context: bool,
}

impl<T> ConfiguredAwaiter<T> {
    /// 被适配的联合体。
    pub fn light_result(&self) -> &LightResult<T> {
        &self.light
    }

    pub fn preserve_context(&self) -> bool {
        self.preserve_context
    }
}

impl<T: Clone> ConfiguredAwaiter<T> {
    fn register(&self, continuation: Continuation) {
        self.light
            .materialize()
            .configure_on_completed(self.preserve_context, continuation);
    }
}

impl<T: Clone> Awaiter for ConfiguredAwaiter<T> {
    type Output = T;

    fn is_completed(&self) -> bool {
        self.light.is_completed()
    }

    fn get_result(self) -> Result<T> {
        self.light.into_result()
    }

    /// 物化后按配置标志注册。
    fn on_completed(&self, continuation: Continuation) {
        self.register(continuation);
    }

    /// 与 [`on_completed`](Awaiter::on_completed) 相同：是否捕获上下文只由配置标志决定。
    fn on_completed_unsafe(&self, continuation: Continuation) {
        self.register(continuation);
    }
}

impl<T: fmt::Debug> fmt::Debug for ConfiguredAwaiter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfiguredAwaiter")
            .field("light", &self.light)
            .field("preserve_context", &self.preserve_context)
            .finish()
    }
}
