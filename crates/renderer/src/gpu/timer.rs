//! wgpu implementations of [`TimestampDevice`].

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Instant;

use crate::timing::{TimestampDevice, TimestampPair, TimestampSlot, TimingError};

const QUERY_COUNT: u32 = 2;
const QUERY_BYTES: wgpu::BufferAddress = QUERY_COUNT as wgpu::BufferAddress * 8;

pub(crate) enum WgpuTimestamps {
    Timestamps(QueryTimestamps),
    SubmissionClock(SubmissionClock),
}

impl WgpuTimestamps {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, timestamps: bool) -> Self {
        let backend = if timestamps {
            Self::Timestamps(QueryTimestamps::new(device, queue))
        } else {
            Self::SubmissionClock(SubmissionClock::new(device, queue))
        };
        tracing::info!(timer = backend.label(), "frame timing source");
        backend
    }

    /// Timestamp writes for the scene render pass while an interval is open.
    pub fn pass_writes(&self) -> Option<wgpu::RenderPassTimestampWrites<'_>> {
        match self {
            Self::Timestamps(query) if query.armed => Some(wgpu::RenderPassTimestampWrites {
                query_set: &query.query_set,
                beginning_of_pass_write_index: Some(0),
                end_of_pass_write_index: Some(1),
            }),
            _ => None,
        }
    }
}

impl TimestampDevice for WgpuTimestamps {
    fn request(&mut self, slot: TimestampSlot) -> Result<(), TimingError> {
        match self {
            Self::Timestamps(query) => query.request(slot),
            Self::SubmissionClock(clock) => clock.request(slot),
        }
    }

    fn poll(&mut self) -> Result<Option<TimestampPair>, TimingError> {
        match self {
            Self::Timestamps(query) => query.poll(),
            Self::SubmissionClock(clock) => clock.poll(),
        }
    }

    fn period_ns(&self) -> f64 {
        match self {
            Self::Timestamps(query) => query.period_ns,
            Self::SubmissionClock(_) => 1.0,
        }
    }

    fn abandon(&mut self) {
        match self {
            Self::Timestamps(query) => query.abandon(),
            Self::SubmissionClock(clock) => clock.pending = None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Timestamps(_) => "timestamp queries",
            Self::SubmissionClock(_) => "submission clock",
        }
    }
}

/// Two GPU timestamps written at the edges of the scene pass and read back
/// through a mappable buffer.
pub(crate) struct QueryTimestamps {
    device: wgpu::Device,
    queue: wgpu::Queue,
    query_set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    readback: wgpu::Buffer,
    period_ns: f64,
    armed: bool,
    pending: Option<Receiver<Result<(), wgpu::BufferAsyncError>>>,
}

impl QueryTimestamps {
    fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("frame timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: QUERY_COUNT,
        });
        let resolve = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("timestamp resolve"),
            size: QUERY_BYTES,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        Self {
            device: device.clone(),
            queue: queue.clone(),
            query_set,
            resolve,
            readback: Self::readback_buffer(device),
            period_ns: f64::from(queue.get_timestamp_period()),
            armed: false,
            pending: None,
        }
    }

    fn readback_buffer(device: &wgpu::Device) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("timestamp readback"),
            size: QUERY_BYTES,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        })
    }

    fn request(&mut self, slot: TimestampSlot) -> Result<(), TimingError> {
        match slot {
            TimestampSlot::Start => {
                self.armed = true;
                Ok(())
            }
            TimestampSlot::End => {
                self.armed = false;
                let mut encoder =
                    self.device
                        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                            label: Some("timestamp resolve encoder"),
                        });
                encoder.resolve_query_set(&self.query_set, 0..QUERY_COUNT, &self.resolve, 0);
                encoder.copy_buffer_to_buffer(&self.resolve, 0, &self.readback, 0, QUERY_BYTES);
                self.queue.submit(Some(encoder.finish()));

                let (sender, receiver) = mpsc::channel();
                self.readback
                    .slice(..)
                    .map_async(wgpu::MapMode::Read, move |result| {
                        let _ = sender.send(result);
                    });
                self.pending = Some(receiver);
                Ok(())
            }
        }
    }

    fn poll(&mut self) -> Result<Option<TimestampPair>, TimingError> {
        let Some(receiver) = &self.pending else {
            return Err(TimingError::Device("no readback in flight".into()));
        };
        poll_device(&self.device)?;
        match receiver.try_recv() {
            Ok(Ok(())) => {
                self.pending = None;
                let pair = {
                    let data = self.readback.slice(..).get_mapped_range();
                    TimestampPair {
                        start: bytemuck::pod_read_unaligned(&data[0..8]),
                        end: bytemuck::pod_read_unaligned(&data[8..16]),
                    }
                };
                self.readback.unmap();
                Ok(Some(pair))
            }
            Ok(Err(err)) => {
                self.pending = None;
                Err(TimingError::Device(err.to_string()))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                self.pending = None;
                Err(TimingError::Device(
                    "readback callback dropped before completing".into(),
                ))
            }
        }
    }

    fn abandon(&mut self) {
        self.armed = false;
        if self.pending.take().is_some() {
            // The old buffer may still be waiting on its mapping; start over
            // with a fresh one instead of mapping it twice.
            self.readback = Self::readback_buffer(&self.device);
        }
    }
}

/// CPU wall time from the scene submission until the queue reports the work
/// done. Used when the adapter has no timestamp queries.
pub(crate) struct SubmissionClock {
    device: wgpu::Device,
    queue: wgpu::Queue,
    origin: Instant,
    start_ns: u64,
    pending: Option<Receiver<()>>,
}

impl SubmissionClock {
    fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self {
            device: device.clone(),
            queue: queue.clone(),
            origin: Instant::now(),
            start_ns: 0,
            pending: None,
        }
    }

    fn now_ns(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn request(&mut self, slot: TimestampSlot) -> Result<(), TimingError> {
        match slot {
            TimestampSlot::Start => self.start_ns = self.now_ns(),
            TimestampSlot::End => {
                let (sender, receiver) = mpsc::channel();
                self.queue.on_submitted_work_done(move || {
                    let _ = sender.send(());
                });
                self.pending = Some(receiver);
            }
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<TimestampPair>, TimingError> {
        let Some(receiver) = &self.pending else {
            return Err(TimingError::Device("no submission in flight".into()));
        };
        poll_device(&self.device)?;
        match receiver.try_recv() {
            Ok(()) => {
                self.pending = None;
                Ok(Some(TimestampPair {
                    start: self.start_ns,
                    end: self.now_ns(),
                }))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                self.pending = None;
                Err(TimingError::Device(
                    "work-done callback dropped before completing".into(),
                ))
            }
        }
    }
}

fn poll_device(device: &wgpu::Device) -> Result<(), TimingError> {
    device
        .poll(wgpu::PollType::Poll)
        .map(|_| ())
        .map_err(|err| TimingError::Device(err.to_string()))
}
