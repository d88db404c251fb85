//! 可由测试手动驱动的调度上下文桩。
//!
//! # 使用方式（How）
//! - [`ManualContext`]：投递的续体进入队列，测试调用 [`ManualContext::run_pending`] 时在当前线程、
//!   以该上下文为环境逐个执行，模拟单线程 UI 派发器；
//! - [`CountingContext`]：收到续体后立即在新线程上执行，并记录投递次数，用于断言“是否经过上下文”。
//!
//! # 契约说明（What）
//! - 两者均满足 [`SchedulingContext`] 的“不在 `post` 内同步执行”要求。

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use crate::context::{self, Continuation, SchedulingContext};

/// 手动驱动的队列上下文。
pub struct ManualContext {
    name: String,
    queue: Mutex<VecDeque<Continuation>>,
    posted: AtomicUsize,
}

impl ManualContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            posted: AtomicUsize::new(0),
        }
    }

    /// 构造共享实例，便于直接传给 [`context::enter`]。
    pub fn shared(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }

    /// 队列中尚未执行的续体数量。
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 累计投递次数。
    pub fn posted(&self) -> usize {
        self.posted.load(Ordering::SeqCst)
    }

    /// 在当前线程上执行队列中的续体，直到队列为空；返回执行数量。
    ///
    /// 执行期间当前线程的环境上下文被设置为本实例，续体再次投递的工作也会在本轮被执行。
    pub fn run_pending(self: &Arc<Self>) -> usize {
        let _guard = context::enter(Arc::clone(self) as Arc<dyn SchedulingContext>);
        let mut executed = 0;
        loop {
            let next = self
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            match next {
                Some(continuation) => {
                    continuation();
                    executed += 1;
                }
                None => return executed,
            }
        }
    }
}

impl SchedulingContext for ManualContext {
    fn post(&self, continuation: Continuation) {
        self.posted.fetch_add(1, Ordering::SeqCst);
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(continuation);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 在独立线程上执行续体并计数的上下文。
#[derive(Default)]
pub struct CountingContext {
    posted: AtomicUsize,
}

impl CountingContext {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn posted(&self) -> usize {
        self.posted.load(Ordering::SeqCst)
    }
}

impl SchedulingContext for CountingContext {
    fn post(&self, continuation: Continuation) {
        self.posted.fetch_add(1, Ordering::SeqCst);
        thread::spawn(continuation);
    }

    fn name(&self) -> &str {
        "counting"
    }
}
