//! Periodic task runner.
//!
//! Executes every registered task once immediately on `start`, then again on
//! a fixed interval until stopped. Distinct tasks run concurrently within a
//! tick; a single task never overlaps itself, because the next tick is not
//! awaited until the previous execution settles. `stop` prevents future
//! ticks without interrupting an in-flight execution.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, join_all};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

type Task = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

pub struct TaskScheduler {
    execute_every: Duration,
    tasks: Vec<Task>,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TaskScheduler {
    pub fn new(execute_every: Duration) -> Self {
        Self {
            execute_every,
            tasks: Vec::new(),
            stop_tx: None,
            handle: None,
        }
    }

    pub fn add_task<F>(&mut self, task: F)
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.tasks.push(Arc::new(task));
    }

    /// Runs every task once before returning, then keeps executing on the
    /// fixed interval in the background.
    pub async fn start(&mut self) {
        execute(&self.tasks).await;

        let tasks = self.tasks.clone();
        let every = self.execute_every;
        let (stop_tx, mut stop_rx) = oneshot::channel();
        self.stop_tx = Some(stop_tx);

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick completes immediately; the initial
            // execution already happened above.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => execute(&tasks).await,
                }
            }
        }));
    }

    /// Prevents future ticks. An execution already in flight runs to
    /// completion.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        self.handle.take();
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn execute(tasks: &[Task]) {
    join_all(tasks.iter().map(|task| task())).await;
}
