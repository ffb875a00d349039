//! Shared fixtures for integration tests: a settable clock, a sleeper the
//! test releases one poll cycle at a time, and canned callbacks.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, TimeZone};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use cronkeep::{Clock, Sleeper, TaskCallback, TaskFuture};

/// Route scheduler logs through the test harness when `RUST_LOG` asks.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn local(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .expect("unambiguous local time")
}

/// A clock the test moves by hand.
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Local>) {
        *self.now.lock().unwrap() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap()
    }
}

/// A sleeper that parks the loop until the test releases the next cycle.
pub struct StepSleeper {
    permits: Semaphore,
}

impl StepSleeper {
    pub fn new() -> Self {
        Self {
            permits: Semaphore::new(0),
        }
    }

    /// Let the loop run one more poll cycle.
    pub fn release(&self) {
        self.permits.add_permits(1);
    }
}

#[async_trait]
impl Sleeper for StepSleeper {
    async fn sleep(&self, _duration: std::time::Duration) {
        match self.permits.acquire().await {
            Ok(permit) => permit.forget(),
            // The semaphore is never closed; park forever if it somehow is.
            Err(_) => std::future::pending().await,
        }
    }
}

/// A callback that counts its invocations and always succeeds.
pub fn counting_callback(counter: &Arc<AtomicUsize>) -> TaskCallback {
    let counter = counter.clone();
    Arc::new(move || {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }) as TaskFuture
    })
}

/// A callback that counts its invocations and fails the first
/// `failures` of them.
pub fn flaky_callback(counter: &Arc<AtomicUsize>, failures: usize) -> TaskCallback {
    let counter = counter.clone();
    Arc::new(move || {
        let counter = counter.clone();
        Box::pin(async move {
            let invocation = counter.fetch_add(1, Ordering::SeqCst);
            if invocation < failures {
                Err(anyhow::anyhow!("simulated failure #{}", invocation + 1))
            } else {
                Ok(())
            }
        }) as TaskFuture
    })
}
