//! Frame capture via a `tcpdump` child process
//!
//! Spawns `tcpdump -w -` on the monitor interface and decodes the pcap stream
//! it writes to stdout on a dedicated reader thread. Frames are handed to the
//! capture loop through a bounded channel, so `dispatch_one` is a plain
//! `try_recv` and never waits on the process.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use tracing::{debug, error, info, trace, warn};

use super::pcap_stream::{PcapRecord, PcapStreamReader};
use super::FrameSource;
use crate::error::{Result, SnifferError};
use crate::frame::LinkType;

/// Frames buffered between the reader thread and the capture loop
const FRAME_QUEUE_LEN: usize = 1000;

/// Reader-side counters
#[derive(Debug, Default)]
struct ReaderStats {
    frames_read: AtomicU64,
    frames_dropped: AtomicU64,
}

/// `FrameSource` backed by a `tcpdump` child process
pub struct TcpdumpSource {
    interface: String,
    child: Child,
    frame_rx: Receiver<PcapRecord>,
    link_type: LinkType,
    non_blocking: bool,
    disconnected: bool,
    stats: Arc<ReaderStats>,
}

impl TcpdumpSource {
    /// Start `tcpdump` on `interface` and read the stream header.
    ///
    /// Fails (fatally) if the process can't be spawned or never produces a
    /// valid pcap header.
    pub fn open_live(tcpdump_path: &Path, interface: &str, snaplen: u32) -> Result<Self> {
        let open_err = |reason: String| SnifferError::OpenCapture {
            interface: interface.to_string(),
            reason,
        };

        let mut cmd = Command::new(tcpdump_path);
        cmd.arg("-i").arg(interface)
           .arg("-U")
           .arg("-s").arg(snaplen.to_string())
           .arg("-w").arg("-");

        cmd.stdin(Stdio::null())
           .stdout(Stdio::piped())
           .stderr(Stdio::piped());

        info!("Executing: {:?}", cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| open_err(format!("failed to spawn {}: {}", tcpdump_path.display(), e)))?;

        // Spawn stderr reader for logging
        if let Some(stderr) = child.stderr.take() {
            thread::spawn(move || {
                let reader = BufReader::new(stderr);
                for line in reader.lines().map_while(std::result::Result::ok) {
                    if !line.trim().is_empty() {
                        debug!("[tcpdump] {}", line.trim());
                    }
                }
            });
        }

        let stdout = match child.stdout.take() {
            Some(s) => s,
            None => {
                let _ = child.kill();
                return Err(open_err("failed to capture tcpdump stdout".to_string()));
            }
        };

        let stream = match PcapStreamReader::new(stdout) {
            Ok(s) => s,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(open_err(format!("no pcap stream from tcpdump: {}", e)));
            }
        };
        let link_type = stream.link_type();
        debug!("tcpdump stream: link type {}, snaplen {}", link_type.dlt(), stream.snaplen());

        let (frame_tx, frame_rx) = bounded::<PcapRecord>(FRAME_QUEUE_LEN);
        let stats = Arc::new(ReaderStats::default());

        let thread_stats = stats.clone();
        let spawned = thread::Builder::new()
            .name("pcap-reader".to_string())
            .spawn(move || read_frames(stream, frame_tx, thread_stats));
        if let Err(e) = spawned {
            let _ = child.kill();
            return Err(open_err(format!("failed to spawn reader thread: {}", e)));
        }

        Ok(Self {
            interface: interface.to_string(),
            child,
            frame_rx,
            link_type,
            non_blocking: false,
            disconnected: false,
            stats,
        })
    }
}

impl FrameSource for TcpdumpSource {
    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn set_non_blocking(&mut self) -> Result<()> {
        // Dispatch only ever polls the channel; just check the child is alive
        match self.child.try_wait() {
            Ok(None) => {
                self.non_blocking = true;
                Ok(())
            }
            Ok(Some(status)) => Err(SnifferError::NonBlocking {
                interface: self.interface.clone(),
                reason: format!("tcpdump already exited with {}", status),
            }),
            Err(e) => Err(SnifferError::NonBlocking {
                interface: self.interface.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn dispatch_one(&mut self, on_frame: &mut dyn FnMut(&[u8], usize)) -> usize {
        if self.disconnected {
            return 0;
        }

        let received = if self.non_blocking {
            self.frame_rx.try_recv()
        } else {
            self.frame_rx.recv().map_err(|_| TryRecvError::Disconnected)
        };

        match received {
            Ok(record) => {
                on_frame(&record.data, record.orig_len);
                1
            }
            Err(TryRecvError::Empty) => 0,
            Err(TryRecvError::Disconnected) => {
                warn!("tcpdump frame stream closed; no further frames on {}", self.interface);
                self.disconnected = true;
                0
            }
        }
    }
}

impl Drop for TcpdumpSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        debug!(
            "tcpdump stopped. Frames read: {}, dropped: {}",
            self.stats.frames_read.load(Ordering::Relaxed),
            self.stats.frames_dropped.load(Ordering::Relaxed)
        );
    }
}

/// Reader loop (runs in dedicated thread)
fn read_frames(
    mut stream: PcapStreamReader<ChildStdout>,
    frame_tx: Sender<PcapRecord>,
    stats: Arc<ReaderStats>,
) {
    loop {
        match stream.next_record() {
            Ok(Some(record)) => {
                trace!(
                    "frame at {:?}: {} of {} bytes",
                    record.timestamp,
                    record.data.len(),
                    record.orig_len
                );
                stats.frames_read.fetch_add(1, Ordering::Relaxed);
                match frame_tx.try_send(record) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                        debug!("Frame queue full, dropping frame");
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
            Ok(None) => {
                info!("tcpdump stdout closed");
                break;
            }
            Err(e) => {
                error!("Error reading tcpdump output: {}", e);
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_fails_open() {
        let err = TcpdumpSource::open_live(Path::new("/nonexistent/tcpdump"), "wlan0", 8192)
            .err()
            .unwrap();
        assert!(matches!(err, SnifferError::OpenCapture { .. }));
    }

    #[test]
    fn test_silent_process_fails_open() {
        // `true` exits without writing a pcap header
        let err = TcpdumpSource::open_live(Path::new("true"), "wlan0", 8192)
            .err()
            .unwrap();
        match err {
            SnifferError::OpenCapture { interface, reason } => {
                assert_eq!(interface, "wlan0");
                assert!(reason.contains("no pcap stream"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    const FRAME: [u8; 10] = [0x08, 0x02, 0x00, 0x00, 1, 2, 3, 4, 5, 6];
    const FRAME_WIRE_LEN: u32 = 99;

    /// Little-endian microsecond pcap stream holding `FRAME` as its only record
    fn one_frame_stream() -> Vec<u8> {
        let mut stream = Vec::new();
        stream.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
        stream.extend_from_slice(&2u16.to_le_bytes());
        stream.extend_from_slice(&4u16.to_le_bytes());
        stream.extend_from_slice(&[0u8; 8]);
        stream.extend_from_slice(&65535u32.to_le_bytes());
        stream.extend_from_slice(&(LinkType::DLT_IEEE802_11 as u32).to_le_bytes());

        stream.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        stream.extend_from_slice(&250u32.to_le_bytes());
        stream.extend_from_slice(&(FRAME.len() as u32).to_le_bytes());
        stream.extend_from_slice(&FRAME_WIRE_LEN.to_le_bytes());
        stream.extend_from_slice(&FRAME);
        stream
    }

    /// Stand-in for tcpdump: writes the stream, then runs `tail` (if any)
    fn fake_tcpdump(dir: &tempfile::TempDir, tail: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let capture = dir.path().join("capture.pcap");
        std::fs::write(&capture, one_frame_stream()).unwrap();

        let script = dir.path().join("tcpdump");
        std::fs::write(
            &script,
            format!("#!/bin/sh\ncat '{}'\n{}\n", capture.display(), tail),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    fn open(script: &Path) -> TcpdumpSource {
        // A freshly written script can briefly be "text file busy" while a
        // concurrently forked test process still holds the write handle
        for _ in 0..50 {
            match TcpdumpSource::open_live(script, "wlan0", 8192) {
                Ok(source) => return source,
                Err(SnifferError::OpenCapture { reason, .. }) if reason.contains("busy") => {
                    thread::sleep(std::time::Duration::from_millis(20));
                }
                Err(e) => panic!("open failed: {e}"),
            }
        }
        panic!("script stayed busy");
    }

    fn collect(source: &mut TcpdumpSource) -> (usize, Vec<(Vec<u8>, usize)>) {
        let mut frames = Vec::new();
        let delivered = source.dispatch_one(&mut |bytes, wire_len| frames.push((bytes.to_vec(), wire_len)));
        (delivered, frames)
    }

    #[test]
    fn test_dispatch_passes_wire_length_then_disconnects() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = open(&fake_tcpdump(&dir, ""));
        assert_eq!(source.link_type(), LinkType::Ieee80211);

        let (delivered, frames) = collect(&mut source);
        assert_eq!(delivered, 1);
        assert_eq!(frames, vec![(FRAME.to_vec(), FRAME_WIRE_LEN as usize)]);

        // Stream ended with the script
        let (delivered, frames) = collect(&mut source);
        assert_eq!(delivered, 0);
        assert!(frames.is_empty());
        assert!(source.disconnected);

        assert_eq!(collect(&mut source).0, 0);
    }

    #[test]
    fn test_non_blocking_fails_after_exit() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = open(&fake_tcpdump(&dir, ""));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while source.child.try_wait().unwrap().is_none() {
            assert!(std::time::Instant::now() < deadline, "script never exited");
            thread::sleep(std::time::Duration::from_millis(10));
        }

        let err = source.set_non_blocking().unwrap_err();
        match err {
            SnifferError::NonBlocking { interface, reason } => {
                assert_eq!(interface, "wlan0");
                assert!(reason.contains("already exited"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_blocking_dispatch_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = open(&fake_tcpdump(&dir, "exec sleep 30"));
        source.set_non_blocking().unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        let frames = loop {
            let (delivered, frames) = collect(&mut source);
            if delivered == 1 {
                break frames;
            }
            assert!(std::time::Instant::now() < deadline, "frame never arrived");
            thread::sleep(std::time::Duration::from_millis(10));
        };
        assert_eq!(frames[0].1, FRAME_WIRE_LEN as usize);

        // Still running, so nothing more and no disconnect
        assert_eq!(collect(&mut source).0, 0);
        assert!(!source.disconnected);
    }
}
