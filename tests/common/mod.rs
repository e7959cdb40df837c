//! Shared mocks for integration tests: a scriptable work queue and chat sink.

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::events::CrmEvent;
use relay_core::messaging::{EnqueueOptions, JobHandle, QueueError, WorkQueue};
use relay_core::sink::{ChatSink, RenderedMessage, SinkAck, SinkError};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

/// Work queue that either accepts everything or reports a connection failure
#[derive(Default)]
pub struct MockWorkQueue {
    pub fail_connection: AtomicBool,
    pub submissions: AtomicUsize,
    next_message_id: AtomicI64,
}

impl MockWorkQueue {
    pub fn accepting() -> Self {
        Self::default()
    }

    pub fn unreachable() -> Self {
        let queue = Self::default();
        queue.fail_connection.store(true, Ordering::SeqCst);
        queue
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkQueue for MockWorkQueue {
    async fn enqueue(
        &self,
        _event: &CrmEvent,
        _options: EnqueueOptions,
    ) -> Result<JobHandle, QueueError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        if self.fail_connection.load(Ordering::SeqCst) {
            return Err(QueueError::connection("queue not connected"));
        }
        Ok(JobHandle {
            queue_name: "relay_deliveries".to_string(),
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1,
        })
    }
}

/// Chat sink recording every post; can be scripted to fail
#[derive(Default)]
pub struct MockChatSink {
    pub fail_all: AtomicBool,
    posts: Mutex<Vec<(String, RenderedMessage)>>,
}

impl MockChatSink {
    pub fn working() -> Self {
        Self::default()
    }

    pub fn broken() -> Self {
        let sink = Self::default();
        sink.fail_all.store(true, Ordering::SeqCst);
        sink
    }

    pub fn posts(&self) -> Vec<(String, RenderedMessage)> {
        self.posts.lock().clone()
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().len()
    }
}

#[async_trait]
impl ChatSink for MockChatSink {
    async fn post(&self, address: &str, message: &RenderedMessage) -> Result<SinkAck, SinkError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(SinkError::Status { code: 503 });
        }
        self.posts
            .lock()
            .push((address.to_string(), message.clone()));
        Ok(SinkAck { status_code: 200 })
    }
}
