//! Shared harness for worker tests: the full pipeline over in-memory
//! collaborators.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use image::{DynamicImage, Rgba, RgbaImage};
use pixelforge_core::formats::ImageFormat;
use pixelforge_core::keys::generate_upload_key;
use pixelforge_db::models::job::{Job, NewJob};
use pixelforge_db::queue::{ConvertImageTask, MemoryTaskQueue, RetryPolicy, TaskQueue};
use pixelforge_db::store::{JobStore, MemoryJobStore};
use pixelforge_events::{BusReceiver, FanoutBus, LocalBus, StatusEvent};
use pixelforge_storage::{BlobGateway, BlobKind, MemoryBlobGateway};
use pixelforge_worker::converter::ConversionWorker;
use pixelforge_worker::publisher::StatusPublisher;
use pixelforge_worker::runner::Runner;
use pixelforge_worker::supervisor::{Supervisor, SupervisorConfig};

pub struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub queue: Arc<MemoryTaskQueue>,
    pub blobs: Arc<MemoryBlobGateway>,
    pub bus: Arc<LocalBus>,
    pub worker: Arc<ConversionWorker>,
    pub runner: Runner,
}

impl Harness {
    pub fn new(max_attempts: u32) -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(MemoryTaskQueue::new(RetryPolicy {
            max_attempts,
            base_backoff: Duration::ZERO,
        }));
        let blobs = Arc::new(MemoryBlobGateway::new());
        let bus = Arc::new(LocalBus::default());

        let worker = Arc::new(ConversionWorker::new(
            store.clone(),
            blobs.clone(),
            StatusPublisher::new(bus.clone()),
        ));
        let runner = Runner::new(queue.clone(), worker.clone(), Duration::from_millis(10));

        Self {
            store,
            queue,
            blobs,
            bus,
            worker,
            runner,
        }
    }

    pub fn supervisor(&self, processing_timeout: Duration, pending_timeout: Duration) -> Supervisor {
        Supervisor::new(
            self.store.clone(),
            self.queue.clone(),
            StatusPublisher::new(self.bus.clone()),
            SupervisorConfig {
                interval: Duration::from_secs(60),
                processing_timeout,
                pending_timeout,
            },
        )
    }

    pub async fn subscribe(&self) -> Box<dyn BusReceiver> {
        self.bus.subscribe().await.unwrap()
    }

    /// Store an upload, create its job and enqueue it, as the API does.
    pub async fn submit(&self, bytes: Bytes, source: ImageFormat, target: ImageFormat) -> Job {
        let key = generate_upload_key(source);
        self.blobs
            .put(BlobKind::Upload, &key, bytes, source.mime_type())
            .await
            .unwrap();
        let job = self
            .store
            .create(&NewJob {
                user_id: 1,
                filename: format!("photo.{source}"),
                input_path: key,
                original_format: source,
                target_format: target,
            })
            .await
            .unwrap();
        self.queue
            .enqueue(&ConvertImageTask::new(job.id).to_message())
            .await
            .unwrap();
        job
    }

    pub async fn job(&self, id: i64) -> Job {
        self.store.find_by_id(id).await.unwrap().unwrap()
    }
}

/// Collect every event already published to `rx`.
pub async fn buffered_events(rx: &mut Box<dyn BusReceiver>) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Ok(Some(message)) = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await
    {
        events.push(serde_json::from_value(message.message).unwrap());
    }
    events
}

pub fn png_bytes() -> Bytes {
    let img = RgbaImage::from_fn(4, 4, |x, y| Rgba([x as u8 * 60, y as u8 * 60, 200, 255]));
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    Bytes::from(out)
}
