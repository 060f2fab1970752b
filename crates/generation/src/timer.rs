use parking_lot::Mutex;
use std::time::Duration;

/// Scheduler port for the poll loop
#[async_trait::async_trait]
pub trait Timer: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

#[async_trait::async_trait]
impl Timer for TokioTimer {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Returns at once and remembers what it was asked to wait.
#[derive(Debug, Default)]
pub struct ImmediateTimer {
    delays: Mutex<Vec<Duration>>,
}

impl ImmediateTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

#[async_trait::async_trait]
impl Timer for ImmediateTimer {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().push(delay);
        tokio::task::yield_now().await;
    }
}
