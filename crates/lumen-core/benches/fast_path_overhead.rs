use std::env;
use std::future::{Future, IntoFuture};
use std::hint::black_box;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::task::noop_waker;
use lumen_core::{CompletionHandle, LightResult};

/// 基准测试入口：比较同步完成时值分支与强制分配完成句柄的开销。
///
/// # 背景说明（Why）
/// - 大多数调用在热路径上同步完成，`LightResult` 的价值在于此时不分配任何堆对象；
/// - 该基准量化“值分支直接 await”与“物化为句柄后再 await”之间的差距。
///
/// # 测试逻辑（How）
/// - `measure_value_await`：构造值分支并用空 Waker 轮询其 `IntoFuture` 形态；
/// - `measure_handle_await`：先物化为已完成句柄，再轮询句柄分支；
/// - `measure_alternate`：经 `into_alternate` 转为 `Either<Ready, HandleFuture>` 后轮询；
/// - `--quick` 模式减少迭代次数，用于 CI 冒烟验证。
///
/// # 输出（What）
/// - 每类测试打印总耗时与单次平均耗时（纳秒），以及句柄路径相对值路径的倍率。
fn main() {
    let is_quick = env::args().skip(1).any(|arg| arg == "--quick");
    let iterations = if is_quick { 100_000_u64 } else { 1_000_000_u64 };

    let value = measure_value_await(iterations);
    let handle = measure_handle_await(iterations);
    let alternate = measure_alternate(iterations);

    report("value_await", value, iterations);
    report("handle_await", handle, iterations);
    report("alternate_ready", alternate, iterations);

    println!("handle_overhead_ratio={:.3}", ratio(handle, value));
}

fn report(label: &str, duration: Duration, iterations: u64) {
    let per_iter = duration.as_nanos() as f64 / iterations as f64;
    println!("{label}_elapsed_ns={}", duration.as_nanos());
    println!("{label}_per_iter_ns={per_iter:.4}");
}

fn ratio(a: Duration, b: Duration) -> f64 {
    a.as_secs_f64() / b.as_secs_f64()
}

fn poll_ready<F: Future<Output = lumen_core::Result<u64>> + Unpin>(
    future: &mut F,
    cx: &mut Context<'_>,
) -> u64 {
    match Pin::new(future).poll(cx) {
        Poll::Ready(Ok(value)) => value,
        Poll::Ready(Err(err)) => panic!("completed light result must not fail: {err}"),
        Poll::Pending => unreachable!("completed light result must not pend"),
    }
}

fn measure_value_await(iterations: u64) -> Duration {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    let started = Instant::now();
    let mut checksum = 0_u64;
    for idx in 0..iterations {
        let mut future = LightResult::from_value(idx).into_future();
        checksum = checksum.wrapping_add(poll_ready(&mut future, &mut cx));
    }
    let elapsed = started.elapsed();
    black_box(checksum);
    elapsed
}

fn measure_handle_await(iterations: u64) -> Duration {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    let started = Instant::now();
    let mut checksum = 0_u64;
    for idx in 0..iterations {
        let light = LightResult::from_handle(CompletionHandle::from_value(idx));
        let mut future = light.into_future();
        checksum = checksum.wrapping_add(poll_ready(&mut future, &mut cx));
    }
    let elapsed = started.elapsed();
    black_box(checksum);
    elapsed
}

fn measure_alternate(iterations: u64) -> Duration {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    let started = Instant::now();
    let mut checksum = 0_u64;
    for idx in 0..iterations {
        let mut future = LightResult::from_value(idx).into_alternate();
        checksum = checksum.wrapping_add(poll_ready(&mut future, &mut cx));
    }
    let elapsed = started.elapsed();
    black_box(checksum);
    elapsed
}
