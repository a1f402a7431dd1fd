use std::collections::VecDeque;
use std::fs;
use std::io;

use grbl_streamer::{Channel, Command, GcodeSource, StreamConfig, StreamSession};

/// Channel fed from a script of read chunks. An exhausted script behaves
/// like a silent device (every read times out).
struct ScriptedChannel {
    written: Vec<u8>,
    replies: VecDeque<Vec<u8>>,
    recv_calls: usize,
}

impl ScriptedChannel {
    fn new(replies: &[&[u8]]) -> Self {
        Self {
            written: Vec::new(),
            replies: replies.iter().map(|r| r.to_vec()).collect(),
            recv_calls: 0,
        }
    }
}

impl Channel for ScriptedChannel {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.written.extend_from_slice(bytes);
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv_calls += 1;
        match self.replies.pop_front() {
            Some(reply) => {
                let n = reply.len().min(buf.len());
                buf[..n].copy_from_slice(&reply[..n]);
                if n < reply.len() {
                    self.replies.push_front(reply[n..].to_vec());
                }
                Ok(n)
            }
            None => Ok(0),
        }
    }
}

fn lockstep_config() -> StreamConfig {
    StreamConfig {
        window_size: 0,
        ..StreamConfig::default()
    }
}

#[test]
fn test_streams_file_in_order_skipping_comments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.gcode");
    fs::write(&path, "G1 X1\n;comment\nG28\n").unwrap();

    let mut channel = ScriptedChannel::new(&[
        b"",             // stale purge times out
        b"ok\r\nok\r\n", // doubled ack for the wake command
        b"ok\r\n",       // G1 X1
        b"ok\r\n",       // G28
    ]);
    let mut session = StreamSession::new(lockstep_config());
    session.wake(&mut channel).unwrap();
    let source = GcodeSource::open(&path).unwrap();
    session.stream(&mut channel, source).unwrap();

    assert_eq!(channel.written, b"~\r\nG1 X1\r\nG28\r\n");
    assert_eq!(session.window_len(), 0);
    assert_eq!(session.stats().commands_sent, 3);
    assert_eq!(session.stats().acks_received, 4);
    assert_eq!(session.stats().device_errors, 0);
    // Every drain completed on its sentinel, so each send left an empty
    // window in lockstep mode.
    assert_eq!(session.stats().waits_exhausted, 0);
}

#[test]
fn test_default_window_admits_ten_before_first_drain() {
    let mut channel = ScriptedChannel::new(&[b"ok\r\n"]);
    let mut session = StreamSession::new(StreamConfig::default());

    for i in 0..10 {
        let command = Command::parse(&format!("G1 X{i}")).unwrap();
        session.send(&mut channel, &command, 0).unwrap();
    }
    assert_eq!(channel.recv_calls, 0);
    assert_eq!(session.window_len(), 10);

    // The 11th send crosses capacity and must block on the drain loop.
    let command = Command::parse("G1 X10").unwrap();
    session.send(&mut channel, &command, 0).unwrap();
    assert!(channel.recv_calls > 0);
    assert_eq!(session.stats().acks_received, 1);
    assert_eq!(session.window_len(), 10);
}

#[test]
fn test_error_replays_outstanding_window_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.gcode");
    fs::write(&path, "G1 X1\nG1 X2\nG1 X3\n").unwrap();

    let mut channel = ScriptedChannel::new(&[
        b"error:20\r\nok\r\n", // third send: snapshot [X1 X2 X3], then ack
        b"ok\r\n",             // replayed X1
        b"ok\r\n",             // replayed X2
        b"ok\r\n",             // replayed X3
        b"ok\r\n",             // settle
        b"ok\r\n",             // settle
    ]);
    let config = StreamConfig {
        window_size: 2,
        ..StreamConfig::default()
    };
    let mut session = StreamSession::new(config);
    let source = GcodeSource::open(&path).unwrap();
    session.stream(&mut channel, source).unwrap();

    let sent = String::from_utf8(channel.written.clone()).unwrap();
    assert_eq!(
        sent,
        "G1 X1\r\nG1 X2\r\nG1 X3\r\nG1 X1\r\nG1 X2\r\nG1 X3\r\n"
    );
    assert_eq!(session.stats().device_errors, 1);
    assert_eq!(session.stats().commands_replayed, 3);
    assert_eq!(session.window_len(), 0);
}

#[test]
fn test_silent_device_does_not_hang_the_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.gcode");
    fs::write(&path, "G1 X1\nG1 X2\n").unwrap();

    let mut channel = ScriptedChannel::new(&[]);
    let mut session = StreamSession::new(lockstep_config());
    let source = GcodeSource::open(&path).unwrap();
    session.stream(&mut channel, source).unwrap();

    // Both drains and the settle pass ran out their poll budgets without
    // ever blocking forever.
    assert_eq!(session.stats().commands_sent, 2);
    assert!(session.stats().waits_exhausted >= 2);
    assert_eq!(session.window_len(), 2);
}

#[test]
fn test_source_reads_commands_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.gcode");
    fs::write(&path, "; header\nG21\n\nG90 ; absolute\n  \nM5\n").unwrap();

    let source = GcodeSource::open(&path).unwrap();
    let commands: Vec<String> = source
        .map(|c| c.unwrap().text().to_string())
        .collect();
    assert_eq!(commands, vec!["G21", "G90", "M5"]);
}
