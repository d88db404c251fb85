#![deny(unsafe_code)]
#![doc = "lumen-core: 值优先、按需分配完成句柄的轻量异步结果联合体。"]
#![doc = ""]
#![doc = "== 核心类型 =="]
#![doc = "- [`LightResult`]：`Value(T) | Pending(CompletionHandle<T>)` 联合体，值已就绪时零分配。"]
#![doc = "- [`LightAwaiter`] / [`ConfiguredAwaiter`]：四原语挂起协议（完成查询、结果提取、两种续体注册）。"]
#![doc = "- [`CompletionHandle`] / [`CompletionSource`]：独立分配的完成句柄，联合体在结果未知时委托给它。"]
#![doc = ""]
#![doc = "== 阻塞边界 =="]
#![doc = "除 [`LightResult::result`] 与 [`CompletionHandle::wait`] 外，所有操作均不阻塞调用线程。"]

/// 框架级统一结果别名，错误类型默认为 [`LightError`]。
pub type Result<T, E = LightError> = core::result::Result<T, E>;

mod sync;

pub mod awaiter;
pub mod builder;
pub mod configured;
pub mod context;
pub mod error;
pub mod handle;
pub mod light;
pub mod prelude;
pub mod scheduler;
/// 测试桩命名空间，集中暴露可由测试手动驱动的调度上下文实现。
///
/// # 使用方式（How）
/// - 通过 `use lumen_core::test_stubs::ManualContext;` 引入；
/// - `ManualContext` 模拟“单线程 UI 派发器”：续体投递后排队，直到测试显式调用 `run_pending`。
pub mod test_stubs;

pub use awaiter::{AwaitFuture, Awaiter, LightAwaiter};
pub use builder::LightResultBuilder;
pub use configured::{ConfiguredAwaiter, ConfiguredLightResult};
pub use context::{ContextGuard, Continuation, SchedulingContext};
pub use error::{Fault, LightError};
pub use handle::{CompletionHandle, CompletionSource, HandleFuture, HandleStatus};
pub use light::LightResult;
pub use scheduler::{SchedulerConfig, install_default_scheduler};
