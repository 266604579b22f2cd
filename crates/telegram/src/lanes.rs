use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use questpal_core::domain::chat::ChatId;

#[async_trait]
pub(crate) trait LaneWorker<J>: Send + Sync + 'static {
    async fn run(&self, chat_id: ChatId, job: J);
}

type Senders<J> = Arc<Mutex<HashMap<ChatId, mpsc::UnboundedSender<J>>>>;

/// One FIFO worker per chat. Jobs for the same chat run one at a time in push
/// order. Jobs for different chats run concurrently. A worker retires after
/// `idle_timeout` without work and is respawned on the next push.
pub(crate) struct ChatLanes<J> {
    worker: Arc<dyn LaneWorker<J>>,
    senders: Senders<J>,
    idle_timeout: Duration,
}

fn lock<J>(senders: &Senders<J>) -> MutexGuard<'_, HashMap<ChatId, mpsc::UnboundedSender<J>>> {
    match senders.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<J: Send + 'static> ChatLanes<J> {
    pub(crate) fn new(worker: Arc<dyn LaneWorker<J>>, idle_timeout: Duration) -> Self {
        Self { worker, senders: Arc::new(Mutex::new(HashMap::new())), idle_timeout }
    }

    pub(crate) fn push(&self, chat_id: ChatId, job: J) {
        let mut senders = lock(&self.senders);
        let job = match senders.get(&chat_id) {
            Some(sender) => match sender.send(job) {
                Ok(()) => return,
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        if sender.send(job).is_ok() {
            senders.insert(chat_id, sender);
            tokio::spawn(run_lane(
                chat_id,
                receiver,
                self.worker.clone(),
                self.senders.clone(),
                self.idle_timeout,
            ));
        }
    }

    pub(crate) fn active(&self) -> usize {
        lock(&self.senders).len()
    }
}

async fn run_lane<J: Send + 'static>(
    chat_id: ChatId,
    mut jobs: mpsc::UnboundedReceiver<J>,
    worker: Arc<dyn LaneWorker<J>>,
    senders: Senders<J>,
    idle_timeout: Duration,
) {
    loop {
        let job = match tokio::time::timeout(idle_timeout, jobs.recv()).await {
            Ok(Some(job)) => job,
            Ok(None) => break,
            Err(_) => {
                // Pushes happen under the same lock, so nothing can arrive
                // after the entry is removed.
                let next = {
                    let mut senders = lock(&senders);
                    match jobs.try_recv() {
                        Ok(job) => Some(job),
                        Err(_) => {
                            senders.remove(&chat_id);
                            None
                        }
                    }
                };
                match next {
                    Some(job) => job,
                    None => break,
                }
            }
        };
        worker.run(chat_id, job).await;
    }
}
