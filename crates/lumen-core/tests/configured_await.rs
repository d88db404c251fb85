//! `.await` 路径：未配置与配置两种挂起适配器在真实执行器上的行为。

use std::{
    future::{Future, IntoFuture},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use futures::executor::block_on;
use lumen_core::{
    Awaiter, CompletionSource, Fault, LightError, LightResult, context,
    test_stubs::ManualContext,
};

#[test]
fn configured_completed_value_short_circuits_on_await() {
    let value = block_on(async {
        LightResult::from_value(42)
            .configure_completion_context(true)
            .await
    });
    assert_eq!(value.expect("已完成的值必须直接返回"), 42);
}

#[test]
fn await_resumes_after_cross_thread_completion() {
    let source = CompletionSource::<String>::new();
    let light = LightResult::from_handle(source.handle());
    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        source.set_result(String::from("payload"))
    });

    let value = block_on(async { light.await });
    assert_eq!(value.expect("句柄成功后 await 必须返回值"), "payload");
    producer
        .join()
        .expect("生产线程不应 panic")
        .expect("完成必须成功");
}

#[test]
fn await_propagates_fault_and_cancellation() {
    let source = CompletionSource::<u8>::new();
    let light = LightResult::from_handle(source.handle());
    source.set_fault(Fault::msg("timeout")).expect("完成必须成功");
    let err = block_on(async { light.configure_completion_context(false).await })
        .expect_err("故障必须传播");
    assert!(err.is_faulted());

    let canceled = block_on(async { LightResult::<u8>::canceled().await });
    assert!(matches!(canceled, Err(LightError::Canceled)));
}

#[test]
fn configured_registration_materializes_even_for_values() {
    let light = LightResult::from_value(5_u32);
    let awaiter = light.configure_completion_context(false).suspend();
    let (tx, rx) = std::sync::mpsc::channel();
    awaiter.on_completed(Box::new(move || {
        let _ = tx.send(());
    }));
    rx.recv_timeout(Duration::from_secs(5))
        .expect("物化后的已完成句柄必须异步调度续体");
    assert_eq!(awaiter.get_result().expect("值仍可提取"), 5);
}

#[test]
fn preserved_await_wakes_through_captured_context() {
    let ui = ManualContext::shared("ui");
    let source = CompletionSource::<u8>::new();
    let light = LightResult::from_handle(source.handle());

    let mut future = std::pin::pin!(light.configure_completion_context(true).into_future());
    let woken = Arc::new(AtomicUsize::new(0));
    let waker = futures::task::waker(Arc::new(CountingWaker(Arc::clone(&woken))));
    let mut cx = std::task::Context::from_waker(&waker);

    {
        let _guard = context::enter(ui.clone());
        assert!(future.as_mut().poll(&mut cx).is_pending());
    }
    source.set_result(9).expect("完成必须成功");
    assert_eq!(woken.load(Ordering::SeqCst), 0, "唤醒应排队在捕获的上下文中");
    assert_eq!(ui.run_pending(), 1);
    assert_eq!(woken.load(Ordering::SeqCst), 1);
    match future.as_mut().poll(&mut cx) {
        std::task::Poll::Ready(result) => assert_eq!(result.expect("已成功"), 9),
        std::task::Poll::Pending => panic!("唤醒后必须就绪"),
    }
}

#[test]
fn unconfigured_await_registers_through_context_preserving_path() {
    let ui = ManualContext::shared("ui");
    let source = CompletionSource::<u8>::new();
    let light = LightResult::from_handle(source.handle());

    let mut future = std::pin::pin!(light.into_future());
    let woken = Arc::new(AtomicUsize::new(0));
    let waker = futures::task::waker(Arc::new(CountingWaker(Arc::clone(&woken))));
    let mut cx = std::task::Context::from_waker(&waker);
    {
        let _guard = context::enter(ui.clone());
        assert!(future.as_mut().poll(&mut cx).is_pending());
        // 重复轮询只刷新唤醒器，不追加新的续体。
        assert!(future.as_mut().poll(&mut cx).is_pending());
    }
    source.set_result(1).expect("完成必须成功");
    assert_eq!(ui.posted(), 1, "同一 Future 只注册一个续体");
    ui.run_pending();
    assert_eq!(woken.load(Ordering::SeqCst), 1);
}

struct CountingWaker(Arc<AtomicUsize>);

impl futures::task::ArcWake for CountingWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.fetch_add(1, Ordering::SeqCst);
    }
}
