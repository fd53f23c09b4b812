//! Input buffers and round collection
//!
//! A round is one buffer from every input. The collector waits on all inputs
//! at once with a crossbeam [`Select`], so a slow input never blocks another
//! from being read.

use crate::{
    config::PackerConfig,
    error::{Error, Result},
    worker::Handoff,
};
use bytes::Bytes;
use crossbeam::channel::{select, unbounded, Receiver, Select, Sender, TryRecvError};
use std::time::{Duration, Instant};

/// One encoded image with its timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    pub data: Bytes,
    pub pts: Option<Duration>,
    pub duration: Option<Duration>,
}

impl Buffer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: None,
            duration: None,
        }
    }

    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One buffer per input, split into primary and secondaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    primary: Buffer,
    secondary: Vec<Buffer>,
}

impl Round {
    pub fn new(primary: Buffer, secondary: Vec<Buffer>) -> Self {
        Self { primary, secondary }
    }

    /// Build a round from buffers in arrival order
    ///
    /// The largest buffer becomes primary (the earliest on ties); the others
    /// stay secondary in arrival order. Returns `None` for no buffers.
    pub fn from_arrivals(mut buffers: Vec<Buffer>) -> Option<Self> {
        if buffers.is_empty() {
            return None;
        }

        let mut primary_index = 0;
        for (i, buffer) in buffers.iter().enumerate().skip(1) {
            if buffer.len() > buffers[primary_index].len() {
                primary_index = i;
            }
        }

        let primary = buffers.remove(primary_index);
        Some(Self {
            primary,
            secondary: buffers,
        })
    }

    pub fn primary(&self) -> &Buffer {
        &self.primary
    }

    pub fn secondary(&self) -> &[Buffer] {
        &self.secondary
    }

    /// Number of buffers in the round
    pub fn buffer_count(&self) -> usize {
        1 + self.secondary.len()
    }
}

enum InputMessage {
    Buffer(Buffer),
    EndOfStream,
}

/// Producer side of one packer input
///
/// Dropping the handle ends the stream just like [`end_of_stream`](Self::end_of_stream).
#[derive(Debug)]
pub struct InputHandle {
    index: usize,
    tx: Sender<InputMessage>,
}

impl InputHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Queue a buffer for the next round
    pub fn push(&self, buffer: Buffer) -> Result<()> {
        log::trace!("Input {} pushed {} bytes", self.index, buffer.len());
        self.tx
            .send(InputMessage::Buffer(buffer))
            .map_err(|_| Error::ChannelClosed)
    }

    /// Signal that no more buffers will follow
    pub fn end_of_stream(&self) -> Result<()> {
        log::debug!("Input {} end of stream", self.index);
        self.tx
            .send(InputMessage::EndOfStream)
            .map_err(|_| Error::ChannelClosed)
    }
}

impl std::fmt::Debug for InputMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputMessage::Buffer(buffer) => write!(f, "Buffer({} bytes)", buffer.len()),
            InputMessage::EndOfStream => f.write_str("EndOfStream"),
        }
    }
}

/// Collector side of one packer input
#[derive(Debug)]
pub struct InputReceiver {
    index: usize,
    rx: Receiver<InputMessage>,
}

impl InputReceiver {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Drop every message still queued, returning how many were dropped
    pub(crate) fn discard_queued(&self) -> usize {
        self.rx.try_iter().count()
    }
}

/// Create the two ends of input `index`
pub fn input_channel(index: usize) -> (InputHandle, InputReceiver) {
    let (tx, rx) = unbounded();
    (InputHandle { index, tx }, InputReceiver { index, rx })
}

/// Outcome of one [`RoundCollector::collect`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collected {
    /// A complete round, or the partial round left at end of stream
    Round(Round),
    /// An input ended and nothing is left to pack
    EndOfStream,
    /// Shutdown was signalled; held buffers were discarded
    Stopped,
}

/// What one wait on the inputs produced
enum Event {
    Stop,
    Timeout,
    Buffer(usize, Buffer),
    EndOfStream(usize),
}

/// True once the shutdown sender has been dropped
pub(crate) fn stop_requested(shutdown: &Receiver<()>) -> bool {
    matches!(shutdown.try_recv(), Err(TryRecvError::Disconnected))
}

/// Waits for one buffer from every input
#[derive(Debug)]
pub struct RoundCollector {
    inputs: Vec<InputReceiver>,
    shutdown: Receiver<()>,
    collect_timeout: Duration,
    eos_drain_timeout: Duration,
    finished: bool,
}

impl RoundCollector {
    /// `shutdown` is a channel whose sender is dropped to request a stop
    pub fn new(inputs: Vec<InputReceiver>, shutdown: Receiver<()>, config: &PackerConfig) -> Self {
        Self {
            inputs,
            shutdown,
            collect_timeout: config.collect_timeout,
            eos_drain_timeout: config.eos_drain_timeout,
            finished: false,
        }
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Hand the input receivers back
    pub fn into_inputs(self) -> Vec<InputReceiver> {
        self.inputs
    }

    /// Wait for the next round
    ///
    /// The first buffer of a round may take arbitrarily long. Once it has
    /// arrived, the remaining inputs must deliver within the collect timeout,
    /// otherwise the held buffers are discarded and
    /// [`Error::CollectionTimeout`] is returned. Calling again starts a fresh
    /// round.
    pub fn collect(&mut self) -> Result<Collected> {
        if self.finished {
            return Ok(Collected::EndOfStream);
        }
        if stop_requested(&self.shutdown) {
            return Ok(Collected::Stopped);
        }
        if self.inputs.is_empty() {
            log::warn!("No inputs configured");
            self.finished = true;
            return Ok(Collected::EndOfStream);
        }

        let count = self.inputs.len();
        let mut held: Vec<Option<Buffer>> = vec![None; count];
        let mut arrivals = Vec::with_capacity(count);
        let mut started: Option<Instant> = None;

        while arrivals.len() < count {
            let pending: Vec<usize> = (0..count).filter(|&i| held[i].is_none()).collect();
            let deadline = started.map(|t| t + self.collect_timeout);

            match self.wait(&pending, deadline) {
                Event::Stop => {
                    log::debug!("Stopped, discarding {} held buffers", arrivals.len());
                    return Ok(Collected::Stopped);
                }
                Event::Timeout => {
                    let missing = count - arrivals.len();
                    log::warn!(
                        "Round timed out after {:?}, {missing} input(s) missing",
                        self.collect_timeout
                    );
                    return Err(Error::CollectionTimeout {
                        waited: self.collect_timeout,
                        missing,
                    });
                }
                Event::Buffer(slot, buffer) => {
                    log::trace!("Input {} delivered {} bytes", self.inputs[slot].index, buffer.len());
                    held[slot] = Some(buffer);
                    arrivals.push(slot);
                    started.get_or_insert_with(Instant::now);
                }
                Event::EndOfStream(slot) => {
                    log::debug!("Got EOS on input {}", self.inputs[slot].index);
                    self.finished = true;
                    return self.drain(held, arrivals, slot);
                }
            }
        }

        let buffers = arrivals.iter().filter_map(|&slot| held[slot].take()).collect();
        Ok(Round::from_arrivals(buffers).map_or(Collected::EndOfStream, Collected::Round))
    }

    /// Give inputs still owing a buffer a short grace period after EOS
    fn drain(
        &self,
        mut held: Vec<Option<Buffer>>,
        mut arrivals: Vec<usize>,
        eos_slot: usize,
    ) -> Result<Collected> {
        let count = self.inputs.len();
        let mut ended = vec![false; count];
        ended[eos_slot] = true;
        let deadline = Instant::now() + self.eos_drain_timeout;

        loop {
            let pending: Vec<usize> = (0..count)
                .filter(|&i| held[i].is_none() && !ended[i])
                .collect();
            if pending.is_empty() {
                break;
            }

            match self.wait(&pending, Some(deadline)) {
                Event::Stop => return Ok(Collected::Stopped),
                Event::Timeout => {
                    log::debug!("{} input(s) did not deliver before EOS drain ended", pending.len());
                    break;
                }
                Event::Buffer(slot, buffer) => {
                    held[slot] = Some(buffer);
                    arrivals.push(slot);
                }
                Event::EndOfStream(slot) => ended[slot] = true,
            }
        }

        let buffers: Vec<Buffer> = arrivals.iter().filter_map(|&slot| held[slot].take()).collect();
        match Round::from_arrivals(buffers) {
            Some(round) => {
                log::debug!("Returning final round with {} buffer(s)", round.buffer_count());
                Ok(Collected::Round(round))
            }
            None => Ok(Collected::EndOfStream),
        }
    }

    /// Block until shutdown, a deadline, or a message on a pending input
    fn wait(&self, pending: &[usize], deadline: Option<Instant>) -> Event {
        let mut sel = Select::new();
        let stop = sel.recv(&self.shutdown);
        for &slot in pending {
            sel.recv(&self.inputs[slot].rx);
        }

        let oper = match deadline {
            Some(deadline) => match sel.select_deadline(deadline) {
                Ok(oper) => oper,
                Err(_) => return Event::Timeout,
            },
            None => sel.select(),
        };

        let index = oper.index();
        if index == stop {
            let _ = oper.recv(&self.shutdown);
            return Event::Stop;
        }

        // Operation indices follow registration order, shutdown first
        let slot = pending[index - 1];
        match oper.recv(&self.inputs[slot].rx) {
            Ok(InputMessage::Buffer(buffer)) => Event::Buffer(slot, buffer),
            Ok(InputMessage::EndOfStream) | Err(_) => Event::EndOfStream(slot),
        }
    }

    /// Collect rounds into `handoff` until end of stream or shutdown
    ///
    /// Returns the input receivers so the packer can be restarted.
    pub fn run(mut self, handoff: Sender<Handoff>) -> Vec<InputReceiver> {
        loop {
            match self.collect() {
                Ok(Collected::Round(round)) => {
                    if !self.hand_off(&handoff, Handoff::Round(round)) {
                        break;
                    }
                }
                Ok(Collected::EndOfStream) => {
                    log::debug!("Forwarding end of stream");
                    self.hand_off(&handoff, Handoff::EndOfStream);
                    break;
                }
                Ok(Collected::Stopped) => break,
                Err(e) => log::warn!("Dropping round: {e}"),
            }
        }
        log::debug!("Collector exiting");
        self.inputs
    }

    /// Blocking send that gives up on shutdown
    fn hand_off(&self, handoff: &Sender<Handoff>, message: Handoff) -> bool {
        select! {
            send(handoff, message) -> res => {
                if res.is_err() {
                    log::debug!("Worker gone, stopping collection");
                }
                res.is_ok()
            }
            recv(self.shutdown) -> _ => {
                log::debug!("Stopped while handing off a round");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::bounded;

    fn config() -> PackerConfig {
        PackerConfig::new()
            .with_collect_timeout(Duration::from_millis(50))
            .with_eos_drain_timeout(Duration::from_millis(20))
    }

    fn setup(count: usize) -> (Vec<InputHandle>, RoundCollector, Sender<()>) {
        let (handles, receivers): (Vec<_>, Vec<_>) = (0..count).map(input_channel).unzip();
        let (stop_tx, stop_rx) = bounded(0);
        (handles, RoundCollector::new(receivers, stop_rx, &config()), stop_tx)
    }

    #[test]
    fn test_largest_buffer_is_primary() {
        let round = Round::from_arrivals(vec![
            Buffer::new(vec![1; 10]),
            Buffer::new(vec![2; 30]),
            Buffer::new(vec![3; 20]),
            Buffer::new(vec![4; 30]),
        ])
        .unwrap();
        assert_eq!(round.primary().data[0], 2);
        let secondary: Vec<u8> = round.secondary().iter().map(|b| b.data[0]).collect();
        assert_eq!(secondary, vec![1, 3, 4]);
        assert!(Round::from_arrivals(Vec::new()).is_none());
    }

    #[test]
    fn test_collect_full_round() {
        let (handles, mut collector, _stop) = setup(2);
        handles[1].push(Buffer::new(vec![0; 4])).unwrap();
        handles[0].push(Buffer::new(vec![0; 40])).unwrap();

        let Collected::Round(round) = collector.collect().unwrap() else {
            panic!("expected a round");
        };
        assert_eq!(round.primary().len(), 40);
        assert_eq!(round.secondary().len(), 1);
    }

    #[test]
    fn test_collect_timeout_discards_round() {
        let (handles, mut collector, _stop) = setup(2);
        handles[0].push(Buffer::new(vec![0; 8])).unwrap();

        let err = collector.collect().unwrap_err();
        assert!(matches!(err, Error::CollectionTimeout { missing: 1, .. }));

        // Next round starts fresh
        handles[0].push(Buffer::new(vec![0; 8])).unwrap();
        handles[1].push(Buffer::new(vec![0; 2])).unwrap();
        assert!(matches!(collector.collect().unwrap(), Collected::Round(_)));
    }

    #[test]
    fn test_eos_returns_partial_round_then_eos() {
        let (handles, mut collector, _stop) = setup(2);
        handles[0].push(Buffer::new(vec![0; 8])).unwrap();
        handles[1].end_of_stream().unwrap();

        let Collected::Round(round) = collector.collect().unwrap() else {
            panic!("expected the partial round");
        };
        assert_eq!(round.buffer_count(), 1);
        assert_eq!(collector.collect().unwrap(), Collected::EndOfStream);
        assert_eq!(collector.collect().unwrap(), Collected::EndOfStream);
    }

    #[test]
    fn test_dropped_handle_is_eos() {
        let (mut handles, mut collector, _stop) = setup(1);
        drop(handles.pop());
        assert_eq!(collector.collect().unwrap(), Collected::EndOfStream);
    }

    #[test]
    fn test_stop_discards_held_buffers() {
        let (handles, mut collector, stop) = setup(2);
        handles[0].push(Buffer::new(vec![0; 8])).unwrap();
        drop(stop);
        assert_eq!(collector.collect().unwrap(), Collected::Stopped);
    }

    #[test]
    fn test_run_forwards_rounds_and_eos() {
        let (handles, collector, _stop) = setup(2);
        let (handoff_tx, handoff_rx) = bounded(4);

        handles[0].push(Buffer::new(vec![0; 8])).unwrap();
        handles[1].push(Buffer::new(vec![0; 4])).unwrap();
        drop(handles);

        let inputs = collector.run(handoff_tx);
        assert_eq!(inputs.len(), 2);

        assert!(matches!(handoff_rx.recv().unwrap(), Handoff::Round(_)));
        assert!(matches!(handoff_rx.recv().unwrap(), Handoff::EndOfStream));
    }
}
