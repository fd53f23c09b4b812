//! Round packing and the worker thread draining the handoff channel

use crate::{
    error::{Error, Result},
    jpeg::{parse, recombine, Mangler, Role},
    round::{stop_requested, Buffer, Round},
};
use crossbeam::channel::{select, Receiver, Sender};

/// Message from the collector to the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handoff {
    Round(Round),
    /// No more rounds will follow
    EndOfStream,
}

/// Output of a running packer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackerEvent {
    /// One packed image
    Buffer(Buffer),
    /// The stream ended; emitted once per run
    Eos,
}

/// Pack one round into a single buffer
///
/// The primary buffer is parsed into segments, the first secondary buffer (in
/// arrival order) becomes the thumbnail. The output carries the primary's
/// timestamps.
pub fn pack_round(round: &Round, mangler: &Mangler) -> Result<Buffer> {
    let primary = round.primary();
    let image = parse(&primary.data, Role::Primary)?
        .into_primary()
        .ok_or_else(|| Error::InvalidState("primary buffer parsed as a thumbnail".into()))?;

    let thumbnail = match round.secondary() {
        [] => None,
        [first, rest @ ..] => {
            if !rest.is_empty() {
                log::debug!("Ignoring {} extra secondary buffer(s)", rest.len());
            }
            parse(&first.data, Role::Secondary)?.into_thumbnail()
        }
    };

    let sequence = mangler.mangle(image.sequence, thumbnail.as_ref())?;
    let data = recombine(&sequence, &image.scan, thumbnail.as_ref())?;
    log::debug!(
        "Packed round: primary {} bytes, thumbnail {:?} bytes, output {} bytes",
        primary.len(),
        thumbnail.as_ref().map(|t| t.len()),
        data.len()
    );

    Ok(Buffer {
        data,
        pts: primary.pts,
        duration: primary.duration,
    })
}

/// Consumer side of the handoff channel
#[derive(Debug, Clone)]
pub struct Worker {
    mangler: Mangler,
}

impl Worker {
    pub fn new(mangler: Mangler) -> Self {
        Self { mangler }
    }

    /// Pack rounds in FIFO order until end of stream or shutdown
    ///
    /// A round that fails to pack is logged and skipped. On shutdown the
    /// round in progress finishes and anything still queued is discarded.
    pub fn run(
        self,
        handoff: Receiver<Handoff>,
        events: Sender<PackerEvent>,
        shutdown: Receiver<()>,
    ) {
        loop {
            if stop_requested(&shutdown) {
                discard_queued(&handoff);
                break;
            }

            let message = select! {
                recv(handoff) -> message => message.ok(),
                recv(shutdown) -> _ => None,
            };
            let Some(message) = message else {
                if stop_requested(&shutdown) {
                    discard_queued(&handoff);
                } else {
                    log::debug!("Handoff closed");
                }
                break;
            };

            match message {
                Handoff::Round(round) => match pack_round(&round, &self.mangler) {
                    Ok(buffer) => {
                        if events.send(PackerEvent::Buffer(buffer)).is_err() {
                            log::debug!("Event receiver gone");
                            break;
                        }
                    }
                    Err(e) => log::error!("Dropping round: {e}"),
                },
                Handoff::EndOfStream => {
                    log::debug!("Worker reached end of stream");
                    let _ = events.send(PackerEvent::Eos);
                    break;
                }
            }
        }
        log::debug!("Worker exiting");
    }
}

fn discard_queued(handoff: &Receiver<Handoff>) {
    let discarded = handoff.try_iter().count();
    log::debug!("Stopping, discarded {discarded} queued message(s)");
}
