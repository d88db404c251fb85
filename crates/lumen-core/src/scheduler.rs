//! 默认调度器：承接“注册时已完成”且不关心恢复位置的续体。
//!
//! # 契约说明（What）
//! - 当句柄在注册前已经完成且没有捕获上下文时，续体会交给这里的线程池异步运行，
//!   因此不会在注册调用返回前执行（唯一例外见下方风险提示）；
//! - 续体或分离 Future 的 panic 被限制在单个任务内，以 `error` 级别记录，工作线程继续服务；
//! - 线程池本身来自 `futures::executor::ThreadPool`，本 crate 不实现任何调度策略；
//! - [`install_default_scheduler`] 只能在首次使用前调用一次，之后的调用返回
//!   [`LightError::SchedulerAlreadyInstalled`]。
//!
//! # 风险提示（Trade-offs）
//! - 线程池创建失败时退化为每个续体一个独立线程；
//! - 若连线程都无法创建，续体作为最后手段在当前线程内联执行，并以 `warn` 级别记录。
//!   此时续体会在注册调用返回前运行，这是“迟到注册不内联”约定的唯一例外。

use std::{borrow::Cow, future::Future, panic::AssertUnwindSafe, sync::OnceLock, thread};

use futures::executor::{ThreadPool, ThreadPoolBuilder};
use futures_util::FutureExt;

use crate::{LightError, Result, context::Continuation, error::Fault};

static DEFAULT_SCHEDULER: OnceLock<DetachedScheduler> = OnceLock::new();

/// 默认调度器配置。
///
/// # 契约说明（What）
/// - `pool_size`：线程数；`None` 表示沿用 `futures` 线程池的默认值（CPU 核数）；
/// - `name_prefix`：工作线程名称前缀，便于在调试器与日志中识别。
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub pool_size: Option<usize>,
    pub name_prefix: Cow<'static, str>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: None,
            name_prefix: Cow::Borrowed("lumen-continuation-"),
        }
    }
}

impl SchedulerConfig {
    /// 以给定线程名前缀构造配置。
    pub fn named(name_prefix: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            ..Default::default()
        }
    }

    /// 指定线程数，`0` 会被提升为 `1`。
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = Some(pool_size.max(1));
        self
    }
}

enum DetachedScheduler {
    Pool(ThreadPool),
    Threads { name_prefix: Cow<'static, str> },
}

impl DetachedScheduler {
    fn build(config: &SchedulerConfig) -> core::result::Result<Self, std::io::Error> {
        let mut builder = ThreadPoolBuilder::new();
        builder.name_prefix(config.name_prefix.as_ref());
        if let Some(size) = config.pool_size {
            builder.pool_size(size);
        }
        builder.create().map(DetachedScheduler::Pool)
    }

    fn build_or_fallback(config: &SchedulerConfig) -> Self {
        match Self::build(config) {
            Ok(scheduler) => scheduler,
            Err(err) => {
                tracing::warn!(error = %err, "thread pool unavailable; falling back to dedicated threads");
                DetachedScheduler::Threads {
                    name_prefix: config.name_prefix.clone(),
                }
            }
        }
    }

    fn dispatch(&self, continuation: Continuation) {
        match self {
            DetachedScheduler::Pool(pool) => pool.spawn_ok(contained(async move { continuation() })),
            DetachedScheduler::Threads { name_prefix } => {
                // `spawn` 失败时闭包随 Err 一起被丢弃，因此先放进共享槽位，失败后仍能取回执行。
                let slot = std::sync::Arc::new(std::sync::Mutex::new(Some(continuation)));
                let worker_slot = std::sync::Arc::clone(&slot);
                let spawned = thread::Builder::new()
                    .name(format!("{name_prefix}detached"))
                    .spawn(move || run_slot(&worker_slot));
                if let Err(err) = spawned {
                    tracing::warn!(error = %err, "cannot spawn continuation thread; running inline");
                    run_slot(&slot);
                }
            }
        }
    }
}

fn run_slot(slot: &std::sync::Mutex<Option<Continuation>>) {
    let continuation = slot
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .take();
    if let Some(continuation) = continuation {
        continuation();
    }
}

/// 安装默认调度器。
///
/// # 契约说明（What）
/// - **前置条件**：尚未有任何续体经由默认调度器派发；
/// - **返回值**：线程池创建失败时返回 [`LightError::SchedulerUnavailable`]，重复安装返回
///   [`LightError::SchedulerAlreadyInstalled`]；
/// - **后置条件**：成功后，所有“迟到注册”的分离续体都运行在该线程池上。
pub fn install_default_scheduler(config: SchedulerConfig) -> Result<()> {
    if DEFAULT_SCHEDULER.get().is_some() {
        return Err(LightError::SchedulerAlreadyInstalled);
    }
    let scheduler = DetachedScheduler::build(&config)
        .map_err(|err| LightError::SchedulerUnavailable(Fault::from(err)))?;
    DEFAULT_SCHEDULER
        .set(scheduler)
        .map_err(|_| LightError::SchedulerAlreadyInstalled)?;
    tracing::debug!(name_prefix = %config.name_prefix, pool_size = ?config.pool_size, "default scheduler installed");
    Ok(())
}

/// 把任务内的 panic 截留在任务边界，避免线程池工作线程随之退出。
fn contained<F>(future: F) -> impl Future<Output = ()> + Send + 'static
where
    F: Future<Output = ()> + Send + 'static,
{
    AssertUnwindSafe(future).catch_unwind().map(|outcome| {
        if outcome.is_err() {
            tracing::error!("detached task panicked; worker keeps running");
        }
    })
}

/// 将续体派发到默认调度器，首次使用时以默认配置惰性初始化。
///
/// 续体通常在其他线程上运行；只有在线程池与独立线程都不可用时才会内联执行（见模块级风险提示）。
pub(crate) fn dispatch_detached(continuation: Continuation) {
    DEFAULT_SCHEDULER
        .get_or_init(|| DetachedScheduler::build_or_fallback(&SchedulerConfig::default()))
        .dispatch(continuation);
}

/// 将一个 `'static` Future 交给默认调度器驱动至完成。
pub(crate) fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let scheduler = DEFAULT_SCHEDULER
        .get_or_init(|| DetachedScheduler::build_or_fallback(&SchedulerConfig::default()));
    match scheduler {
        DetachedScheduler::Pool(pool) => pool.spawn_ok(contained(future)),
        DetachedScheduler::Threads { .. } => {
            scheduler.dispatch(Box::new(move || futures::executor::block_on(future)))
        }
    }
}
