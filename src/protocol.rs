//! Wire sentinels and the response scanner.
//!
//! The controller acknowledges each accepted line with `ok` CR LF and
//! reports rejection with a line starting `error`. Single-character
//! control commands are echoed with a doubled acknowledgment, so the
//! completion shape depends on the command that was sent.

/// Line terminator for both directions of the wire.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Exact content of an acknowledgment line.
pub const ACK_TOKEN: &[u8] = b"ok";

/// Prefix of a rejection line.
pub const ERROR_TOKEN: &[u8] = b"error";

const ACK_SENTINEL: &[u8] = b"ok\r\n";
const ACK_SENTINEL_DOUBLED: &[u8] = b"ok\r\nok\r\n";

/// Sentinel a response must end with before the pending command counts as
/// fully acknowledged.
pub fn completion_sentinel(short_command: bool) -> &'static [u8] {
    if short_command {
        ACK_SENTINEL_DOUBLED
    } else {
        ACK_SENTINEL
    }
}

/// One complete response line classified by the scanner, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A line that is exactly the acknowledgment token.
    Ack,
    /// A line starting with the error token; carries the full line text.
    DeviceError(String),
}

/// Accumulates response bytes and classifies each completed line exactly
/// once.
///
/// The cursor only advances past fully terminated lines, so a line split
/// across reads is classified once, when its terminator arrives, and never
/// re-examined on later reads. That makes this the sole reconciliation
/// authority: callers pop or snapshot per event, nothing is recounted.
#[derive(Debug, Default)]
pub struct ResponseScanner {
    buffer: Vec<u8>,
    scanned: usize,
}

impl ResponseScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes to the response buffer.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// True once the accumulated response ends with the completion
    /// sentinel for the pending command.
    pub fn is_complete(&self, short_command: bool) -> bool {
        self.buffer.ends_with(completion_sentinel(short_command))
    }

    /// Classifies every line completed since the previous call. Lines
    /// matching neither sentinel (power-up banners, status chatter) are
    /// skipped.
    pub fn take_events(&mut self) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        while let Some(offset) = find_terminator(&self.buffer[self.scanned..]) {
            let line = &self.buffer[self.scanned..self.scanned + offset];
            if line == ACK_TOKEN {
                events.push(ScanEvent::Ack);
            } else if line.starts_with(ERROR_TOKEN) {
                events.push(ScanEvent::DeviceError(
                    String::from_utf8_lossy(line).into_owned(),
                ));
            }
            self.scanned += offset + LINE_TERMINATOR.len();
        }
        events
    }

    /// The unterminated tail, if it already reads as an error line.
    /// Consulted once a drain cycle gives up, so a rejection whose
    /// terminator never arrived still gets captured. An unterminated `ok`
    /// is not an acknowledgment.
    pub fn unterminated_error(&mut self) -> Option<ScanEvent> {
        let tail = &self.buffer[self.scanned..];
        if tail.starts_with(ERROR_TOKEN) {
            let event = ScanEvent::DeviceError(String::from_utf8_lossy(tail).into_owned());
            self.scanned = self.buffer.len();
            Some(event)
        } else {
            None
        }
    }

    /// Everything read so far, for diagnostics.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

fn find_terminator(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(LINE_TERMINATOR.len())
        .position(|window| window == LINE_TERMINATOR)
}
