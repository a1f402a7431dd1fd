//! The streaming session: outstanding-command window, replay queue,
//! windowed dispatch, and acknowledgment reconciliation.

use std::collections::VecDeque;
use std::io;
use std::thread;

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::gcode::Command;
use crate::protocol::{ResponseScanner, ScanEvent};
use crate::transport::Channel;

/// Upper bound on the one-shot read that clears stale device chatter
/// before the wake command goes out.
const STALE_READ_LIMIT: usize = 100;

/// Counters kept across one streaming run.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub commands_sent: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub acks_received: u64,
    pub device_errors: u64,
    pub commands_replayed: u64,
    pub waits_exhausted: u64,
}

/// Protocol state for one streaming run.
///
/// The window holds commands written to the device but not yet
/// acknowledged. The replay queue holds window snapshots captured when the
/// device reported an error, because the device's buffer state after an
/// error is not trusted. Both are strictly FIFO.
pub struct StreamSession {
    config: StreamConfig,
    window: VecDeque<Command>,
    replay: VecDeque<VecDeque<Command>>,
    stats: SessionStats,
}

impl StreamSession {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            window: VecDeque::new(),
            replay: VecDeque::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Clears any stale device chatter, then sends the wake command
    /// through the normal dispatch path.
    pub fn wake<C: Channel>(&mut self, channel: &mut C) -> Result<(), StreamError> {
        let mut stale = [0u8; STALE_READ_LIMIT];
        let n = channel.recv(&mut stale)?;
        if n > 0 {
            self.stats.bytes_received += n as u64;
            tracing::debug!("Discarded {} stale bytes", n);
        }
        self.send(channel, &Command::wake(), self.config.safe_retries)?;
        Ok(())
    }

    /// Streams every command from `commands`, always draining pending
    /// replay snapshots ahead of new input, then waits out the remaining
    /// window before returning.
    pub fn stream<C, I>(&mut self, channel: &mut C, commands: I) -> Result<(), StreamError>
    where
        C: Channel,
        I: IntoIterator<Item = Result<Command, StreamError>>,
    {
        let mut source = commands.into_iter().fuse();
        loop {
            let (command, replayed) = match self.next_replay() {
                Some(command) => (command, true),
                None => match source.next() {
                    Some(next) => (next?, false),
                    None => {
                        // Input exhausted. Errors observed while settling
                        // can still queue snapshots; loop back for those.
                        self.settle(channel)?;
                        if self.has_replay() {
                            continue;
                        }
                        break;
                    }
                },
            };
            if replayed {
                self.stats.commands_replayed += 1;
                tracing::debug!("Replaying: {}", command);
            }
            let retries = if command.is_safe_to_retry() {
                self.config.safe_retries
            } else {
                0
            };
            self.send(channel, &command, retries)?;
        }
        tracing::info!(
            "Stream complete: {} commands sent ({} replayed), {} acks, {} device errors, {} bytes out, {} bytes in",
            self.stats.commands_sent,
            self.stats.commands_replayed,
            self.stats.acks_received,
            self.stats.device_errors,
            self.stats.bytes_sent,
            self.stats.bytes_received,
        );
        Ok(())
    }

    /// Dispatches one command: frames it, writes it, tracks it in the
    /// window, and drains acknowledgments once the window is over
    /// capacity. Returns the bytes read back during the drain, for
    /// diagnostics only.
    pub fn send<C: Channel>(
        &mut self,
        channel: &mut C,
        command: &Command,
        retries: u32,
    ) -> Result<Vec<u8>, StreamError> {
        let wire = command.wire_bytes();
        self.transmit(channel, &wire, retries)?;
        self.stats.commands_sent += 1;
        self.stats.bytes_sent += wire.len() as u64;
        tracing::debug!("TX: {}", command);
        self.window.push_back(command.clone());

        let response = if self.window.len() > self.config.window_size {
            self.drain(channel, command.is_short())?
        } else {
            Vec::new()
        };
        tracing::debug!("RX: {:?}", String::from_utf8_lossy(&response));
        Ok(response)
    }

    /// Writes the framed bytes, re-attempting up to `retries` times when
    /// the write itself fails transiently. Only allow-listed commands get
    /// a non-zero budget.
    fn transmit<C: Channel>(
        &mut self,
        channel: &mut C,
        wire: &[u8],
        retries: u32,
    ) -> Result<(), StreamError> {
        let mut attempt = 0;
        loop {
            match channel.send(wire) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < retries && is_transient(&e) => {
                    attempt += 1;
                    tracing::warn!("Write failed ({}), retry {}/{}", e, attempt, retries);
                    thread::sleep(self.config.retry_delay());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Bounded acknowledgment wait: reads fixed-size chunks, applying
    /// every completed line to the window in arrival order, until the
    /// response ends with the completion sentinel or the poll budget is
    /// spent. Giving up is not an error; the device is assumed to catch
    /// up eventually.
    fn drain<C: Channel>(
        &mut self,
        channel: &mut C,
        short_command: bool,
    ) -> Result<Vec<u8>, StreamError> {
        let mut scanner = ResponseScanner::new();
        let mut chunk = vec![0u8; self.config.read_chunk];
        let mut complete = false;
        for _ in 0..self.config.max_polls() {
            let n = channel.recv(&mut chunk)?;
            if n > 0 {
                self.stats.bytes_received += n as u64;
                scanner.extend(&chunk[..n]);
                for event in scanner.take_events() {
                    self.apply(event);
                }
            }
            if scanner.is_complete(short_command) {
                complete = true;
                break;
            }
        }
        if !complete {
            if let Some(event) = scanner.unterminated_error() {
                self.apply(event);
            }
            self.stats.waits_exhausted += 1;
            tracing::warn!(
                "Gave up waiting for acknowledgment ({} outstanding)",
                self.window.len()
            );
        }
        Ok(scanner.into_bytes())
    }

    /// The single reconciliation path: an acknowledgment pops one window
    /// entry, an error line snapshots the whole window for replay.
    fn apply(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::Ack => {
                self.stats.acks_received += 1;
                self.window.pop_front();
            }
            ScanEvent::DeviceError(line) => {
                self.stats.device_errors += 1;
                tracing::warn!(
                    "Device error: {} ({} commands queued for replay)",
                    line,
                    self.window.len()
                );
                self.replay.push_back(self.window.clone());
            }
        }
    }

    /// Next command owed from the replay queue, oldest snapshot first,
    /// preserving each snapshot's internal order.
    fn next_replay(&mut self) -> Option<Command> {
        loop {
            let snapshot = self.replay.front_mut()?;
            match snapshot.pop_front() {
                Some(command) => return Some(command),
                None => {
                    self.replay.pop_front();
                }
            }
        }
    }

    fn has_replay(&self) -> bool {
        self.replay.iter().any(|snapshot| !snapshot.is_empty())
    }

    /// After the source is exhausted, waits for the device to acknowledge
    /// everything still in the window. Runs one bounded drain cycle at a
    /// time and stops once a full cycle brings no sentinel progress.
    fn settle<C: Channel>(&mut self, channel: &mut C) -> Result<(), StreamError> {
        while !self.window.is_empty() {
            let before = (self.stats.acks_received, self.stats.device_errors);
            let short = self.window.back().map(Command::is_short).unwrap_or(false);
            self.drain(channel, short)?;
            if (self.stats.acks_received, self.stats.device_errors) == before {
                tracing::warn!("{} commands never acknowledged", self.window.len());
                break;
            }
        }
        Ok(())
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
