use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// 입력이 `delay` 동안 조용해야 값을 확정하는 순수 상태 기계
#[derive(Debug)]
pub struct DebounceGate<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
    committed: Option<T>,
}

impl<T: Clone + PartialEq> DebounceGate<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            committed: None,
        }
    }

    /// 대기 값을 교체하고 조용한 구간을 다시 시작한다
    pub fn update(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.delay));
    }

    /// 대기 값이 확정될 시각
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, due)| *due)
    }

    /// Returns the value only on the commit edge. A pending value equal to the
    /// last committed one is dropped without a new commit.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let due = self.deadline()?;
        if now < due {
            return None;
        }
        let (value, _) = self.pending.take()?;
        if self.committed.as_ref() == Some(&value) {
            return None;
        }
        self.committed = Some(value.clone());
        Some(value)
    }

    pub fn committed(&self) -> Option<&T> {
        self.committed.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// [`DebounceGate`] 를 tokio 태스크로 구동하고 확정 값을 watch 채널로 발행
pub struct Debouncer<T> {
    input: mpsc::UnboundedSender<T>,
    output: watch::Receiver<Option<T>>,
    task: JoinHandle<()>,
}

impl<T> Debouncer<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn spawn(delay: Duration) -> Self {
        let (input, mut rx) = mpsc::unbounded_channel::<T>();
        let (tx, output) = watch::channel(None);

        let task = tokio::spawn(async move {
            let mut gate = DebounceGate::new(delay);
            loop {
                let deadline = gate.deadline();
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(value) => gate.update(value, Instant::now()),
                        None => break,
                    },
                    _ = wait_until(deadline) => {
                        if let Some(value) = gate.poll(Instant::now()) {
                            debug!("⏱️ Debounced input committed");
                            if tx.send(Some(value)).is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        });

        Self { input, output, task }
    }

    /// 호출자를 막지 않는다
    pub fn push(&self, value: T) {
        let _ = self.input.send(value);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.output.clone()
    }

    pub fn latest(&self) -> Option<T> {
        self.output.borrow().clone()
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
