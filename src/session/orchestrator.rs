//! Capture orchestrator - the channel-hopping poll loop
//!
//! Single-threaded busy polling: each pass checks the session budget,
//! dispatches at most one frame without blocking, and checks whether the
//! current channel's dwell slice is used up. Probabilities are recalculated
//! only when leaving the last channel, and a stop requested by the budget is
//! honoured only there, so every run ends on a complete sweep.

use tracing::{debug, info, warn};

use crate::capture::FrameSource;
use crate::clock::Clock;
use crate::error::{Result, SnifferError};
use crate::radio::RadioController;
use crate::scheduler::{Channel, SchedulerParams};

use super::state::{CaptureSession, SessionOutcome};

/// Drives a `FrameSource` and a `RadioController` through a capture session
pub struct CaptureOrchestrator<S, R, C> {
    session: CaptureSession,
    source: S,
    radio: R,
    clock: C,
}

impl<S, R, C> CaptureOrchestrator<S, R, C>
where
    S: FrameSource,
    R: RadioController,
    C: Clock,
{
    /// Put the interface in monitor mode and open a non-blocking capture on it.
    ///
    /// Every failure here is fatal.
    pub fn initialize<F>(
        interface: &str,
        mut radio: R,
        open_source: F,
        clock: C,
        params: SchedulerParams,
    ) -> Result<Self>
    where
        F: FnOnce(&str) -> Result<S>,
    {
        radio
            .enter_monitor_mode(interface)
            .map_err(|e| SnifferError::MonitorMode {
                interface: interface.to_string(),
                reason: e.to_string(),
            })?;

        let mut source = open_source(interface)?;
        source.set_non_blocking()?;

        let link_type = source.link_type();
        info!("Opened interface {}.", interface);
        debug!("Datalink is {}.", link_type.dlt());

        let session = CaptureSession::new(interface, link_type, params, clock.now());

        Ok(Self {
            session,
            source,
            radio,
            clock,
        })
    }

    /// Run the capture until the budget has elapsed and a sweep completes.
    ///
    /// Consumes the orchestrator; the frame source is closed on return and
    /// the session is handed back for reporting.
    pub fn run(mut self) -> Result<(CaptureSession, SessionOutcome)> {
        let budget = self.session.scheduler.params().session_budget;

        self.session.started_at = chrono::Utc::now();
        self.session.session_timer.reset(self.clock.now());

        let scheduler = &self.session.scheduler;
        info!(
            "Sweeping channels 1-{} ({:.0}s rounds)",
            scheduler.num_channels(),
            scheduler.params().round_secs()
        );
        let first = scheduler.first_channel();
        let mut channel = self.rotate_to(first.number() as u32)?;
        let mut end_requested = false;

        loop {
            if !end_requested && self.session.session_timer.elapsed(self.clock.now()) >= budget {
                info!("Capture budget of {:?} reached; finishing current sweep", budget);
                end_requested = true;
            }

            let session = &mut self.session;
            let delivered = self
                .source
                .dispatch_one(&mut |frame, wire_len| session.handle_frame(channel, frame, wire_len));

            if delivered > 0 {
                self.session.stats.frames_dispatched += delivered as u64;
                let now = self.clock.now();
                debug!(
                    "<<<Channel {:02} timer: {:.3}; Total timer: {:.3}>>>",
                    channel,
                    self.session.dwell_timer.elapsed_secs(now),
                    self.session.session_timer.elapsed_secs(now)
                );
            }

            let dwell = self.session.dwell_timer.elapsed_secs(self.clock.now());
            let scheduler = &mut self.session.scheduler;
            if !scheduler.should_rotate(channel, dwell) {
                continue;
            }

            scheduler.mark_elapsed(channel, dwell);
            if scheduler.is_last(channel) {
                scheduler.recalculate_probabilities();
                self.session.stats.sweeps_completed += 1;
                if end_requested {
                    break;
                }
            }

            let next = self.session.scheduler.next_channel(channel);
            channel = self.rotate_to(next.number() as u32)?;
        }

        let session_secs = self.session.session_timer.elapsed_secs(self.clock.now());
        let outcome = SessionOutcome {
            sweeps_completed: self.session.stats.sweeps_completed,
            frames_dispatched: self.session.stats.frames_dispatched,
            channel_switch_failures: self.session.stats.channel_switch_failures,
            session_secs,
            overrun_secs: (session_secs - budget.as_secs_f64()).max(0.0),
        };

        info!(
            "Capture finished: {} sweeps, {} frames in {:.2}s",
            outcome.sweeps_completed, outcome.frames_dispatched, outcome.session_secs
        );

        Ok((self.session, outcome))
    }

    /// Tune to `number` and restart the dwell timer.
    ///
    /// A number outside the channel table is an internal bug and fatal; a
    /// failed switch command is only logged.
    fn rotate_to(&mut self, number: u32) -> Result<Channel> {
        let channel = self.session.scheduler.channel(number)?;

        match self.radio.set_channel(&self.session.interface, channel) {
            Ok(()) => info!("Changed to channel {}", channel),
            Err(e) => {
                self.session.stats.channel_switch_failures += 1;
                warn!("Failed to switch to channel {}: {}", channel, e);
            }
        }

        self.session.dwell_timer.reset(self.clock.now());
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::LinkType;
    use crate::radio::RadioError;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::time::Duration;

    const POLL_STEP: Duration = Duration::from_millis(10);

    #[derive(Clone, Default)]
    struct ManualClock(Rc<Cell<Duration>>);

    impl Clock for ManualClock {
        fn now(&self) -> Duration {
            self.0.get()
        }
    }

    /// Channel the fake hardware is tuned to, shared by radio and source
    type Tuned = Rc<Cell<u8>>;

    struct ScriptedSource {
        clock: ManualClock,
        tuned: Tuned,
        busy_channel: Option<u8>,
        frame: Vec<u8>,
        fail_non_blocking: bool,
    }

    impl FrameSource for ScriptedSource {
        fn link_type(&self) -> LinkType {
            LinkType::Ieee80211
        }

        fn set_non_blocking(&mut self) -> Result<()> {
            if self.fail_non_blocking {
                return Err(SnifferError::NonBlocking {
                    interface: "wlan0".into(),
                    reason: "refused".into(),
                });
            }
            Ok(())
        }

        fn dispatch_one(&mut self, on_frame: &mut dyn FnMut(&[u8], usize)) -> usize {
            let clock = &self.clock.0;
            clock.set(clock.get() + POLL_STEP);
            if Some(self.tuned.get()) == self.busy_channel {
                on_frame(&self.frame, self.frame.len());
                1
            } else {
                0
            }
        }
    }

    #[derive(Default)]
    struct RecordingRadio {
        tuned: Tuned,
        switches: Rc<RefCell<Vec<u8>>>,
        fail_channel: Option<u8>,
        fail_monitor: bool,
    }

    fn failed(command: &str) -> RadioError {
        RadioError::Spawn {
            command: command.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such tool"),
        }
    }

    impl RadioController for RecordingRadio {
        fn enter_monitor_mode(&mut self, _interface: &str) -> std::result::Result<(), RadioError> {
            if self.fail_monitor {
                return Err(failed("iwconfig wlan0 mode monitor"));
            }
            Ok(())
        }

        fn set_channel(&mut self, _interface: &str, channel: Channel) -> std::result::Result<(), RadioError> {
            self.switches.borrow_mut().push(channel.number());
            if Some(channel.number()) == self.fail_channel {
                return Err(failed("iwconfig wlan0 channel"));
            }
            self.tuned.set(channel.number());
            Ok(())
        }
    }

    struct Harness {
        clock: ManualClock,
        tuned: Tuned,
        switches: Rc<RefCell<Vec<u8>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                clock: ManualClock::default(),
                tuned: Rc::new(Cell::new(0)),
                switches: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn radio(&self) -> RecordingRadio {
            RecordingRadio {
                tuned: self.tuned.clone(),
                switches: self.switches.clone(),
                ..RecordingRadio::default()
            }
        }

        fn source(&self, busy_channel: Option<u8>) -> ScriptedSource {
            ScriptedSource {
                clock: self.clock.clone(),
                tuned: self.tuned.clone(),
                busy_channel,
                // addr1 broadcast, addr2 fixed station
                frame: hex::decode("08020000ffffffffffff0200000000aa").unwrap(),
                fail_non_blocking: false,
            }
        }

        fn orchestrator(
            &self,
            radio: RecordingRadio,
            source: ScriptedSource,
        ) -> Result<CaptureOrchestrator<ScriptedSource, RecordingRadio, ManualClock>> {
            CaptureOrchestrator::initialize(
                "wlan0",
                radio,
                move |_| Ok(source),
                self.clock.clone(),
                SchedulerParams::default(),
            )
        }
    }

    #[test]
    fn test_ends_on_sweep_boundary_after_budget() {
        let h = Harness::new();
        let orch = h.orchestrator(h.radio(), h.source(None)).unwrap();
        let (_, outcome) = orch.run().unwrap();

        let switches = h.switches.borrow();
        assert!(outcome.session_secs >= 60.0);
        // At most one extra sweep (12 s of slices plus poll granularity)
        assert!(outcome.overrun_secs < 12.5, "overrun {}", outcome.overrun_secs);
        assert!(outcome.sweeps_completed >= 5);
        assert_eq!(switches.len() as u64, outcome.sweeps_completed * 12);
        assert_eq!(*switches.last().unwrap(), 12);
    }

    #[test]
    fn test_visits_channels_in_cyclic_order() {
        let h = Harness::new();
        let orch = h.orchestrator(h.radio(), h.source(Some(6))).unwrap();
        orch.run().unwrap();

        for (i, ch) in h.switches.borrow().iter().enumerate() {
            assert_eq!(*ch as usize, i % 12 + 1);
        }
    }

    #[test]
    fn test_busy_channel_gets_larger_share() {
        let h = Harness::new();
        let orch = h.orchestrator(h.radio(), h.source(Some(6))).unwrap();
        let (session, outcome) = orch.run().unwrap();

        let scheduler = &session.scheduler;
        let busy = scheduler.channel(6).unwrap();
        let quiet = scheduler.channel(2).unwrap();
        assert!(scheduler.stats(busy).probability > 0.9);
        assert!(scheduler.stats(busy).dwell_secs > scheduler.stats(quiet).dwell_secs);
        assert!(scheduler.stats(quiet).dwell_secs > 0.0);

        let packets = scheduler.stats(busy).packets_seen;
        assert_eq!(packets, outcome.frames_dispatched);
        assert_eq!(scheduler.total_packets(), packets);

        let agg = &session.aggregator;
        assert_eq!(agg.channels(), vec![busy]);
        assert_eq!(agg.unique_mac_count(busy), 2);
        assert_eq!(agg.total_sightings(busy), packets * 2);
    }

    #[test]
    fn test_failed_channel_switch_is_not_fatal() {
        let h = Harness::new();
        let radio = RecordingRadio {
            fail_channel: Some(4),
            ..h.radio()
        };
        let orch = h.orchestrator(radio, h.source(None)).unwrap();
        let (_, outcome) = orch.run().unwrap();

        assert_eq!(outcome.channel_switch_failures, outcome.sweeps_completed);
    }

    #[test]
    fn test_monitor_mode_failure_is_fatal() {
        let h = Harness::new();
        let radio = RecordingRadio {
            fail_monitor: true,
            ..h.radio()
        };
        let err = h.orchestrator(radio, h.source(None)).err().unwrap();
        assert!(matches!(err, SnifferError::MonitorMode { .. }));
    }

    #[test]
    fn test_open_failure_is_fatal() {
        let h = Harness::new();
        let result: Result<CaptureOrchestrator<ScriptedSource, _, _>> = CaptureOrchestrator::initialize(
            "wlan0",
            h.radio(),
            |iface| {
                Err(SnifferError::OpenCapture {
                    interface: iface.to_string(),
                    reason: "no such device".into(),
                })
            },
            h.clock.clone(),
            SchedulerParams::default(),
        );
        assert!(matches!(result.err().unwrap(), SnifferError::OpenCapture { .. }));
    }

    #[test]
    fn test_non_blocking_failure_is_fatal() {
        let h = Harness::new();
        let mut source = h.source(None);
        source.fail_non_blocking = true;
        let err = h.orchestrator(h.radio(), source).err().unwrap();
        assert!(matches!(err, SnifferError::NonBlocking { .. }));
    }

    #[test]
    fn test_rotate_out_of_range_is_fatal() {
        let h = Harness::new();
        let mut orch = h.orchestrator(h.radio(), h.source(None)).unwrap();
        assert!(matches!(
            orch.rotate_to(13),
            Err(SnifferError::ChannelOutOfRange { channel: 13, .. })
        ));
        assert!(h.switches.borrow().is_empty());
    }
}
