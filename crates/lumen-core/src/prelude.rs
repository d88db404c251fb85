//! 常用类型的一站式导入：`use lumen_core::prelude::*;`

pub use crate::{
    Result,
    awaiter::{AwaitFuture, Awaiter, LightAwaiter},
    builder::LightResultBuilder,
    configured::{ConfiguredAwaiter, ConfiguredLightResult},
    context::{Continuation, SchedulingContext},
    error::{Fault, LightError},
    handle::{CompletionHandle, CompletionSource, HandleFuture, HandleStatus},
    light::LightResult,
};
