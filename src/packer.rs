//! Packer facade owning inputs, configuration and the two threads

use crate::{
    allocator::IndexAllocator,
    config::{OutputFormat, PackerConfig},
    error::{Error, Result},
    jpeg::Mangler,
    round::{input_channel, InputHandle, InputReceiver, RoundCollector},
    tiff::{MetadataCodec, TiffExifCodec},
    worker::{Handoff, PackerEvent, Worker},
};
use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use std::{
    collections::BTreeMap,
    fmt,
    sync::Arc,
    thread::{self, JoinHandle},
};

struct Running {
    shutdown: Sender<()>,
    collector: JoinHandle<Vec<InputReceiver>>,
    worker: JoinHandle<()>,
}

/// Combines one buffer per input into a single JPEG carrying a thumbnail
///
/// # Example
/// ```
/// use jpeg_packer::{Buffer, JpegPacker, PackerConfig, PackerEvent};
/// use jpeg_packer::test_utils::{sample_primary, sample_thumbnail};
///
/// # fn main() -> jpeg_packer::Result<()> {
/// let mut packer = JpegPacker::new(PackerConfig::default());
/// let main = packer.request_input()?;
/// let thumb = packer.request_input()?;
/// let events = packer.events();
///
/// packer.start()?;
/// main.push(Buffer::new(sample_primary()))?;
/// thumb.push(Buffer::new(sample_thumbnail(128)))?;
/// main.end_of_stream()?;
///
/// let Ok(PackerEvent::Buffer(packed)) = events.recv() else { panic!() };
/// assert!(packed.len() > 128);
/// packer.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct JpegPacker {
    config: PackerConfig,
    codec: Arc<dyn MetadataCodec>,
    allocator: IndexAllocator,
    inputs: BTreeMap<usize, InputReceiver>,
    events_tx: Sender<PackerEvent>,
    events_rx: Receiver<PackerEvent>,
    running: Option<Running>,
}

impl fmt::Debug for JpegPacker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JpegPacker")
            .field("config", &self.config)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("running", &self.running.is_some())
            .finish_non_exhaustive()
    }
}

impl JpegPacker {
    pub fn new(config: PackerConfig) -> Self {
        Self::with_allocator(config, IndexAllocator::new())
    }

    /// Use a caller-provided input index allocator
    pub fn with_allocator(config: PackerConfig, allocator: IndexAllocator) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            config,
            codec: Arc::new(TiffExifCodec),
            allocator,
            inputs: BTreeMap::new(),
            events_tx,
            events_rx,
            running: None,
        }
    }

    /// Replace the EXIF metadata codec (only while stopped)
    pub fn set_codec(&mut self, codec: Arc<dyn MetadataCodec>) -> Result<()> {
        self.ensure_stopped("change the metadata codec")?;
        self.codec = codec;
        Ok(())
    }

    pub fn config(&self) -> &PackerConfig {
        &self.config
    }

    pub fn format(&self) -> OutputFormat {
        self.config.format
    }

    /// Change the output format (only while stopped)
    pub fn set_format(&mut self, format: OutputFormat) -> Result<()> {
        self.ensure_stopped("change the output format")?;
        log::debug!("Output format set to {format}");
        self.config.format = format;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Indices of the registered inputs
    pub fn inputs(&self) -> Vec<usize> {
        self.allocator.in_use().collect()
    }

    /// Register a new input (only while stopped)
    pub fn request_input(&mut self) -> Result<InputHandle> {
        self.ensure_stopped("request an input")?;
        let index = self.allocator.acquire();
        let (handle, receiver) = input_channel(index);
        self.inputs.insert(index, receiver);
        log::debug!("New input {index}");
        Ok(handle)
    }

    /// Unregister input `index` (only while stopped)
    pub fn release_input(&mut self, index: usize) -> Result<()> {
        self.ensure_stopped("release an input")?;
        if self.inputs.remove(&index).is_none() {
            return Err(Error::UnknownInput(index));
        }
        self.allocator.release(index);
        Ok(())
    }

    /// Receiver for packed buffers and end-of-stream
    pub fn events(&self) -> Receiver<PackerEvent> {
        self.events_rx.clone()
    }

    /// Spawn the collector and worker threads
    pub fn start(&mut self) -> Result<()> {
        self.ensure_stopped("start")?;

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let (handoff_tx, handoff_rx) = bounded::<Handoff>(self.config.handoff_capacity);

        let inputs: Vec<InputReceiver> = std::mem::take(&mut self.inputs).into_values().collect();
        log::debug!(
            "Starting with {} input(s), format {}",
            inputs.len(),
            self.config.format
        );

        let collector = RoundCollector::new(inputs, shutdown_rx.clone(), &self.config);
        let collector = thread::Builder::new()
            .name("jpeg-packer-collector".into())
            .spawn(move || collector.run(handoff_tx))?;

        let mangler = Mangler::new(self.config.format)
            .with_thumbnail_policy(self.config.thumbnail_policy)
            .with_codec(Arc::clone(&self.codec));
        let worker = Worker::new(mangler);
        let events = self.events_tx.clone();
        let worker = match thread::Builder::new()
            .name("jpeg-packer-worker".into())
            .spawn(move || worker.run(handoff_rx, events, shutdown_rx))
        {
            Ok(handle) => handle,
            Err(e) => {
                drop(shutdown_tx);
                self.restore_inputs(collector.join());
                return Err(e.into());
            }
        };

        self.running = Some(Running {
            shutdown: shutdown_tx,
            collector,
            worker,
        });
        Ok(())
    }

    /// Signal shutdown and wait for both threads
    ///
    /// Buffers held by the collector or still queued on an input, and rounds
    /// not yet packed, are discarded.
    /// Stopping a stopped packer does nothing.
    pub fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        drop(running.shutdown);
        self.restore_inputs(running.collector.join());
        if running.worker.join().is_err() {
            log::error!("Worker thread panicked");
        }
        log::debug!("Stopped");
        Ok(())
    }

    fn restore_inputs(&mut self, joined: thread::Result<Vec<InputReceiver>>) {
        match joined {
            Ok(inputs) => {
                for input in inputs {
                    // Queued buffers belong to the interrupted stream
                    let discarded = input.discard_queued();
                    if discarded > 0 {
                        log::debug!("Input {}: discarded {discarded} queued message(s)", input.index());
                    }
                    self.inputs.insert(input.index(), input);
                }
            }
            Err(_) => log::error!("Collector thread panicked, inputs lost"),
        }
    }

    fn ensure_stopped(&self, action: &str) -> Result<()> {
        if self.running.is_some() {
            return Err(Error::InvalidState(format!("Cannot {action} while running")));
        }
        Ok(())
    }
}

impl Drop for JpegPacker {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        round::Buffer,
        test_utils::{logger, sample_primary, sample_thumbnail},
    };
    use std::time::Duration;

    #[test]
    fn test_state_changes_rejected_while_running() {
        logger();
        let mut packer = JpegPacker::new(PackerConfig::default());
        let _input = packer.request_input().unwrap();
        packer.start().unwrap();

        assert!(matches!(
            packer.set_format(OutputFormat::Jfif),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(packer.request_input(), Err(Error::InvalidState(_))));
        assert!(matches!(packer.release_input(0), Err(Error::InvalidState(_))));
        assert!(matches!(packer.start(), Err(Error::InvalidState(_))));

        packer.stop().unwrap();
        packer.set_format(OutputFormat::Jfif).unwrap();
        assert_eq!(packer.format(), OutputFormat::Jfif);
    }

    #[test]
    fn test_release_input() {
        let mut packer = JpegPacker::new(PackerConfig::default());
        let a = packer.request_input().unwrap();
        let b = packer.request_input().unwrap();
        assert_eq!((a.index(), b.index()), (0, 1));

        packer.release_input(0).unwrap();
        assert!(matches!(packer.release_input(0), Err(Error::UnknownInput(0))));
        assert_eq!(packer.inputs(), vec![1]);
        assert_eq!(packer.request_input().unwrap().index(), 0);
    }

    #[test]
    fn test_restart_keeps_inputs() {
        let mut packer = JpegPacker::new(
            PackerConfig::default().with_collect_timeout(Duration::from_millis(200)),
        );
        let main = packer.request_input().unwrap();
        let thumb = packer.request_input().unwrap();
        let events = packer.events();

        packer.start().unwrap();
        packer.stop().unwrap();
        packer.start().unwrap();

        main.push(Buffer::new(sample_primary())).unwrap();
        thumb.push(Buffer::new(sample_thumbnail(32))).unwrap();

        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(event, PackerEvent::Buffer(_)));
        packer.stop().unwrap();
    }

    #[test]
    fn test_stop_discards_queued_input_buffers() {
        logger();
        let mut packer = JpegPacker::new(PackerConfig::default());
        let main = packer.request_input().unwrap();
        let thumb = packer.request_input().unwrap();
        let events = packer.events();
        packer.start().unwrap();

        // First frame is held by the collector, second stays queued
        for ms in [1, 2] {
            main.push(Buffer::new(sample_primary()).with_pts(Duration::from_millis(ms)))
                .unwrap();
        }
        std::thread::sleep(Duration::from_millis(100));
        packer.stop().unwrap();
        packer.start().unwrap();

        main.push(Buffer::new(sample_primary()).with_pts(Duration::from_millis(100)))
            .unwrap();
        thumb.push(Buffer::new(sample_thumbnail(32))).unwrap();

        let PackerEvent::Buffer(packed) = events.recv_timeout(Duration::from_secs(5)).unwrap()
        else {
            panic!("expected a packed buffer");
        };
        assert_eq!(packed.pts, Some(Duration::from_millis(100)));
        packer.stop().unwrap();
        assert!(events.try_recv().is_err());
    }
}
