//! In-process capture through libpcap

use pcap::{Active, Capture};
use tracing::warn;

use super::FrameSource;
use crate::error::{Result, SnifferError};
use crate::frame::LinkType;

/// Read timeout handed to `pcap_open_live`, in milliseconds
const READ_TIMEOUT_MS: i32 = 1000;

/// `FrameSource` backed by a live libpcap handle
pub struct PcapSource {
    interface: String,
    // `setnonblock` consumes the handle; `None` only after a failed switch
    capture: Option<Capture<Active>>,
    link_type: LinkType,
}

impl PcapSource {
    pub fn open_live(interface: &str, snaplen: u32) -> Result<Self> {
        let capture = Capture::from_device(interface)
            .and_then(|c| {
                c.promisc(true)
                    .snaplen(clamp_snaplen(snaplen))
                    .timeout(READ_TIMEOUT_MS)
                    .open()
            })
            .map_err(|e| SnifferError::OpenCapture {
                interface: interface.to_string(),
                reason: e.to_string(),
            })?;

        let link_type = LinkType::from(capture.get_datalink().0);

        Ok(Self {
            interface: interface.to_string(),
            capture: Some(capture),
            link_type,
        })
    }
}

/// libpcap takes a signed snapshot length
fn clamp_snaplen(snaplen: u32) -> i32 {
    i32::try_from(snaplen).unwrap_or(i32::MAX)
}

impl FrameSource for PcapSource {
    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn set_non_blocking(&mut self) -> Result<()> {
        let capture = self.capture.take().ok_or_else(|| SnifferError::NonBlocking {
            interface: self.interface.clone(),
            reason: "capture handle already closed".to_string(),
        })?;

        let capture = capture.setnonblock().map_err(|e| SnifferError::NonBlocking {
            interface: self.interface.clone(),
            reason: e.to_string(),
        })?;
        self.capture = Some(capture);
        Ok(())
    }

    fn dispatch_one(&mut self, on_frame: &mut dyn FnMut(&[u8], usize)) -> usize {
        let Some(capture) = self.capture.as_mut() else {
            return 0;
        };

        match capture.next_packet() {
            Ok(packet) => {
                on_frame(packet.data, packet.header.len as usize);
                1
            }
            Err(pcap::Error::TimeoutExpired) => 0,
            Err(e) => {
                warn!("pcap dispatch on {} failed: {}", self.interface, e);
                0
            }
        }
    }
}
