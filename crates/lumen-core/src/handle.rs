//! 完成句柄：联合体在结果尚未可知时委托的独立分配对象。
//!
//! # 设计背景（Why）
//! - [`LightResult`](crate::LightResult) 只在“结果未知”时才需要一个可跨线程观测、可注册续体的堆对象；
//!   本模块提供满足该边界契约的最小实现，不承担调度、重试或取消发起。
//!
//! # 契约说明（What）
//! - **状态**：`Pending → {Succeeded | Faulted | Canceled}`，终态不可逆；状态字为原子变量，查询无锁；
//! - **提取**：[`CompletionHandle::wait`] 阻塞至终态，成功返回值的克隆，故障/取消原样转为错误；
//! - **续体**：每个续体至多执行一次，且严格晚于终态转换；注册时若已终态，续体经捕获的上下文或
//!   默认调度器异步执行，绝不在注册调用内部同步执行；
//! - **身份**：句柄克隆只复制引用；`PartialEq`/`Hash` 基于引用身份。
//!
//! # 逻辑解析（How）
//! - 生产端 [`CompletionSource`] 在持锁状态下替换状态、取走续体列表并唤醒等待者，释放锁后再派发续体，
//!   避免续体重入句柄时自锁。

use std::{
    fmt,
    future::Future,
    hash::{Hash, Hasher},
    mem,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures_util::task::AtomicWaker;

use crate::{
    LightError, Result,
    context::{Continuation, ResumeTarget},
    error::Fault,
    sync::{self, AtomicU8, Condvar, Mutex, Ordering},
};

/// 句柄终态分类。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum HandleStatus {
    Pending,
    Succeeded,
    Faulted,
    Canceled,
}

impl HandleStatus {
    const PENDING: u8 = 0;
    const SUCCEEDED: u8 = 1;
    const FAULTED: u8 = 2;
    const CANCELED: u8 = 3;

    fn from_u8(raw: u8) -> Self {
        match raw {
            Self::SUCCEEDED => HandleStatus::Succeeded,
            Self::FAULTED => HandleStatus::Faulted,
            Self::CANCELED => HandleStatus::Canceled,
            _ => HandleStatus::Pending,
        }
    }

    /// 是否已进入终态。
    pub fn is_terminal(self) -> bool {
        !matches!(self, HandleStatus::Pending)
    }
}

enum Outcome<T> {
    Pending(Vec<Registration>),
    Succeeded(T),
    Faulted(Fault),
    Canceled,
}

struct Registration {
    target: ResumeTarget,
    continuation: Continuation,
}

struct Shared<T> {
    status: AtomicU8,
    outcome: Mutex<Outcome<T>>,
    settled: Condvar,
}

/// 完成句柄的共享引用。
///
/// # 契约说明（What）
/// - 克隆只增加引用计数，所有克隆观测同一状态；
/// - 生命周期由最后一个持有者决定：生产端、联合体或物化出的互操作句柄。
pub struct CompletionHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for CompletionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> CompletionHandle<T> {
    fn with_outcome(outcome: Outcome<T>, status: u8) -> Self {
        Self {
            shared: Arc::new(Shared {
                status: AtomicU8::new(status),
                outcome: Mutex::new(outcome),
                settled: Condvar::new(),
            }),
        }
    }

    fn pending() -> Self {
        Self::with_outcome(Outcome::Pending(Vec::new()), HandleStatus::PENDING)
    }

    /// 构造已成功完成的句柄。
    pub fn from_value(value: T) -> Self {
        Self::with_outcome(Outcome::Succeeded(value), HandleStatus::SUCCEEDED)
    }

    /// 构造已故障的句柄。
    pub fn from_fault(fault: Fault) -> Self {
        Self::with_outcome(Outcome::Faulted(fault), HandleStatus::FAULTED)
    }

    /// 构造已取消的句柄。
    pub fn canceled() -> Self {
        Self::with_outcome(Outcome::Canceled, HandleStatus::CANCELED)
    }

    /// 当前状态（无锁读取）。
    pub fn status(&self) -> HandleStatus {
        HandleStatus::from_u8(self.shared.status.load(Ordering::Acquire))
    }

    pub fn is_completed(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn is_completed_successfully(&self) -> bool {
        self.status() == HandleStatus::Succeeded
    }

    pub fn is_faulted(&self) -> bool {
        self.status() == HandleStatus::Faulted
    }

    pub fn is_canceled(&self) -> bool {
        self.status() == HandleStatus::Canceled
    }

    /// 两个句柄是否为同一实例。
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.shared, &other.shared)
    }

    /// 当前存活的引用数量，仅供诊断。
    pub fn reference_count(this: &Self) -> usize {
        Arc::strong_count(&this.shared)
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.shared) as *const () as usize
    }

    /// 注册保留上下文的续体：捕获当前线程的调度上下文，完成后投递回去。
    pub fn on_completed(&self, continuation: Continuation) {
        self.register(ResumeTarget::capture(true), continuation);
    }

    /// 注册不关心上下文的续体：不捕获上下文，在完成线程上执行。
    pub fn on_completed_unsafe(&self, continuation: Continuation) {
        self.register(ResumeTarget::Detached, continuation);
    }

    /// 按标志选择 [`on_completed`](Self::on_completed) 或 [`on_completed_unsafe`](Self::on_completed_unsafe)。
    pub fn configure_on_completed(&self, preserve_context: bool, continuation: Continuation) {
        self.register(ResumeTarget::capture(preserve_context), continuation);
    }

    fn register(&self, target: ResumeTarget, continuation: Continuation) {
        let mut outcome = sync::lock(&self.shared.outcome);
        if let Outcome::Pending(registrations) = &mut *outcome {
            registrations.push(Registration {
                target,
                continuation,
            });
            return;
        }
        drop(outcome);
        target.resume_after_registration(continuation);
    }

    /// 在持锁状态下访问成功值；未成功完成时传入 `None`。
    pub(crate) fn peek<R>(&self, inspect: impl FnOnce(Option<&T>) -> R) -> R {
        let outcome = sync::lock(&self.shared.outcome);
        match &*outcome {
            Outcome::Succeeded(value) => inspect(Some(value)),
            _ => inspect(None),
        }
    }

    fn transition(&self, next: Outcome<T>, status: u8) -> bool {
        let registrations = {
            let mut outcome = sync::lock(&self.shared.outcome);
            if !matches!(&*outcome, Outcome::Pending(_)) {
                return false;
            }
            let previous = mem::replace(&mut *outcome, next);
            self.shared.status.store(status, Ordering::Release);
            self.shared.settled.notify_all();
            match previous {
                Outcome::Pending(registrations) => registrations,
                _ => Vec::new(),
            }
        };
        tracing::debug!(
            status = ?HandleStatus::from_u8(status),
            continuations = registrations.len(),
            "completion handle settled"
        );
        // 单个续体 panic 不得吞掉其余续体；全部派发后再重新抛出第一个 panic。
        let mut first_panic = None;
        for Registration {
            target,
            continuation,
        } in registrations
        {
            let resumed = panic::catch_unwind(AssertUnwindSafe(|| {
                target.resume_on_completion(continuation)
            }));
            if let Err(payload) = resumed {
                tracing::error!("continuation panicked during completion dispatch");
                first_panic.get_or_insert(payload);
            }
        }
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        true
    }
}

impl<T: Clone> CompletionHandle<T> {
    /// 阻塞当前线程直至终态。
    ///
    /// # 契约说明（What）
    /// - **返回值**：成功时返回值的克隆；故障返回 [`LightError::Faulted`]，取消返回 [`LightError::Canceled`]；
    /// - **风险提示**：在不允许阻塞的上下文（例如单线程派发器）调用可能导致死锁，调用方需自行规避。
    pub fn wait(&self) -> Result<T> {
        let mut outcome = sync::lock(&self.shared.outcome);
        while matches!(&*outcome, Outcome::Pending(_)) {
            outcome = self
                .shared
                .settled
                .wait(outcome)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        Self::extract(&outcome)
    }

    /// 非阻塞提取：未完成时返回 `None`。
    pub fn try_result(&self) -> Option<Result<T>> {
        if !self.is_completed() {
            return None;
        }
        let outcome = sync::lock(&self.shared.outcome);
        match &*outcome {
            Outcome::Pending(_) => None,
            settled => Some(Self::extract(settled)),
        }
    }

    fn extract(outcome: &Outcome<T>) -> Result<T> {
        match outcome {
            Outcome::Succeeded(value) => Ok(value.clone()),
            Outcome::Faulted(fault) => Err(LightError::Faulted(fault.clone())),
            Outcome::Canceled => Err(LightError::Canceled),
            Outcome::Pending(_) => unreachable!("extract is only called on settled outcomes"),
        }
    }

    /// 以 `Future` 形式观察句柄。
    pub fn into_future_view(self) -> HandleFuture<T> {
        HandleFuture::new(self)
    }
}

impl<T> PartialEq for CompletionHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        CompletionHandle::ptr_eq(self, other)
    }
}

impl<T> Eq for CompletionHandle<T> {}

impl<T> Hash for CompletionHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl<T> fmt::Debug for CompletionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("id", &format_args!("{:#x}", self.identity()))
            .field("status", &self.status())
            .finish()
    }
}

/// 完成句柄的生产端。
///
/// # 契约说明（What）
/// - `set_*` 在句柄已终态时返回 [`LightError::AlreadyCompleted`]；`try_set_*` 返回 `false`；
/// - 丢弃 `CompletionSource` 不会自动完成句柄；若生产端放弃操作，应显式调用 [`set_canceled`](Self::set_canceled)。
pub struct CompletionSource<T> {
    handle: CompletionHandle<T>,
}

impl<T> CompletionSource<T> {
    /// 创建处于 `Pending` 的句柄。
    pub fn new() -> Self {
        Self {
            handle: CompletionHandle::pending(),
        }
    }

    /// 返回共享句柄引用。
    pub fn handle(&self) -> CompletionHandle<T> {
        self.handle.clone()
    }

    pub fn try_set_result(&self, value: T) -> bool {
        self.handle
            .transition(Outcome::Succeeded(value), HandleStatus::SUCCEEDED)
    }

    pub fn try_set_fault(&self, fault: Fault) -> bool {
        self.handle
            .transition(Outcome::Faulted(fault), HandleStatus::FAULTED)
    }

    pub fn try_set_canceled(&self) -> bool {
        self.handle
            .transition(Outcome::Canceled, HandleStatus::CANCELED)
    }

    /// 以成功值完成句柄。
    pub fn set_result(&self, value: T) -> Result<()> {
        self.try_set_result(value)
            .then_some(())
            .ok_or(LightError::AlreadyCompleted)
    }

    /// 以故障完成句柄。
    pub fn set_fault(&self, fault: Fault) -> Result<()> {
        self.try_set_fault(fault)
            .then_some(())
            .ok_or(LightError::AlreadyCompleted)
    }

    /// 以取消完成句柄。
    pub fn set_canceled(&self) -> Result<()> {
        self.try_set_canceled()
            .then_some(())
            .ok_or(LightError::AlreadyCompleted)
    }
}

impl<T> Default for CompletionSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for CompletionSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSource")
            .field("handle", &self.handle)
            .finish()
    }
}

/// 以唤醒器驱动的句柄 `Future` 视图。
///
/// # 逻辑解析（How）
/// - 首次 `Pending` 时注册一个不捕获上下文的续体，续体只负责唤醒 [`AtomicWaker`] 中最新的唤醒器；
/// - 每次轮询都刷新唤醒器并在注册后复查状态，关闭“注册前刚好完成”的窗口。
pub struct HandleFuture<T> {
    handle: CompletionHandle<T>,
    waker: Option<Arc<AtomicWaker>>,
}

impl<T> HandleFuture<T> {
    pub fn new(handle: CompletionHandle<T>) -> Self {
        Self {
            handle,
            waker: None,
        }
    }

    /// 被观察的句柄。
    pub fn handle(&self) -> &CompletionHandle<T> {
        &self.handle
    }
}

impl<T: Clone> Future for HandleFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(result) = this.handle.try_result() {
            return Poll::Ready(result);
        }
        match &this.waker {
            Some(waker) => waker.register(cx.waker()),
            None => {
                let waker = Arc::new(AtomicWaker::new());
                waker.register(cx.waker());
                let notifier = Arc::clone(&waker);
                this.handle
                    .on_completed_unsafe(Box::new(move || notifier.wake()));
                this.waker = Some(waker);
            }
        }
        match this.handle.try_result() {
            Some(result) => Poll::Ready(result),
            None => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for HandleFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleFuture")
            .field("handle", &self.handle)
            .field("registered", &self.waker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as StdOrdering};

    #[test]
    fn factories_report_terminal_classification() {
        let ok = CompletionHandle::from_value(7_u32);
        assert!(ok.is_completed() && ok.is_completed_successfully());
        assert_eq!(ok.wait().expect("成功句柄应返回值"), 7);

        let faulted = CompletionHandle::<u32>::from_fault(Fault::msg("boom"));
        assert!(faulted.is_completed() && faulted.is_faulted());
        assert!(faulted.wait().expect_err("故障句柄应返回错误").is_faulted());

        let canceled = CompletionHandle::<u32>::canceled();
        assert!(canceled.is_canceled());
        assert!(matches!(canceled.wait(), Err(LightError::Canceled)));
    }

    #[test]
    fn second_completion_is_rejected() {
        let source = CompletionSource::new();
        source.set_result("first").expect("首次完成必须成功");
        assert!(matches!(
            source.set_result("second"),
            Err(LightError::AlreadyCompleted)
        ));
        assert!(!source.try_set_canceled());
        assert_eq!(source.handle().wait().expect("值应保持首次写入"), "first");
    }

    #[test]
    fn pending_registration_runs_exactly_once_on_completion() {
        let source = CompletionSource::<u8>::new();
        let handle = source.handle();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        handle.on_completed_unsafe(Box::new(move || {
            counter.fetch_add(1, StdOrdering::SeqCst);
        }));
        assert_eq!(fired.load(StdOrdering::SeqCst), 0, "完成前续体不得执行");
        source.set_result(1).expect("完成必须成功");
        assert_eq!(fired.load(StdOrdering::SeqCst), 1);
        assert!(!source.try_set_result(2));
        assert_eq!(fired.load(StdOrdering::SeqCst), 1, "续体至多执行一次");
    }

    #[test]
    fn identity_equality_ignores_payload() {
        let a = CompletionHandle::from_value(5);
        let b = CompletionHandle::from_value(5);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(CompletionHandle::reference_count(&a), 1);
    }

    #[test]
    fn handle_future_resolves_after_completion() {
        let source = CompletionSource::new();
        let future = source.handle().into_future_view();
        let producer = std::thread::spawn(move || source.set_result(String::from("late")));
        let value = futures::executor::block_on(future).expect("句柄完成后 Future 必须就绪");
        assert_eq!(value, "late");
        producer
            .join()
            .expect("生产线程不应 panic")
            .expect("完成必须成功");
    }

    #[test]
    fn panicking_continuation_does_not_starve_siblings() {
        let source = CompletionSource::<u8>::new();
        let handle = source.handle();
        let fired = Arc::new(AtomicUsize::new(0));
        handle.on_completed_unsafe(Box::new(|| panic!("continuation failure")));
        {
            let fired = Arc::clone(&fired);
            handle.on_completed_unsafe(Box::new(move || {
                fired.fetch_add(1, StdOrdering::SeqCst);
            }));
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| source.set_result(1)));
        assert!(outcome.is_err(), "首个续体的 panic 应在全部派发后重新抛出");
        assert_eq!(fired.load(StdOrdering::SeqCst), 1, "其余续体必须照常执行");
        assert!(handle.is_completed_successfully());
        assert_eq!(handle.wait().expect("终态不受续体 panic 影响"), 1);
    }
}
