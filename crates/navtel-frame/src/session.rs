use crate::crash::{CompletedCrash, CrashTransfer};
use crate::error::{FrameError, Result};
use crate::layout::FieldMask;

/// Something a handler wants the connection driver to report once the
/// current message has been answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A crash file finished transferring.
    CrashTransferComplete(CompletedCrash),
}

/// Mutable per-connection context.
///
/// Owned by exactly one connection loop and passed by `&mut` into every
/// handler call, so no locking is needed.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Envelope addressee, captured from the latest NTCB header.
    pub receiver_id: u32,
    /// Envelope originator, captured from the latest NTCB header.
    pub sender_id: u32,
    /// Device IMEI from the identity handshake.
    pub device_identifier: Option<String>,
    /// FLEX protocol version from negotiation.
    pub protocol_version: u8,
    /// FLEX structure version from negotiation.
    pub struct_version: u8,
    field_mask: Option<FieldMask>,
    crash_transfer: Option<CrashTransfer>,
    events: Vec<SessionEvent>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Negotiated field mask, if FLEX negotiation has run.
    pub fn field_mask(&self) -> Option<&FieldMask> {
        self.field_mask.as_ref()
    }

    /// Replace the negotiated field mask and versions.
    pub fn set_negotiated(&mut self, protocol_version: u8, struct_version: u8, mask: FieldMask) {
        self.protocol_version = protocol_version;
        self.struct_version = struct_version;
        self.field_mask = Some(mask);
    }

    pub fn is_negotiated(&self) -> bool {
        self.field_mask.is_some()
    }

    /// Record size under the negotiated mask.
    pub fn record_size(&self) -> Result<usize> {
        self.field_mask
            .as_ref()
            .map(FieldMask::record_size)
            .ok_or_else(|| {
                FrameError::Protocol("FLEX telemetry received before negotiation".to_string())
            })
    }

    pub fn crash_transfer(&self) -> Option<&CrashTransfer> {
        self.crash_transfer.as_ref()
    }

    pub fn crash_transfer_mut(&mut self) -> Option<&mut CrashTransfer> {
        self.crash_transfer.as_mut()
    }

    /// Start a crash transfer, replacing any transfer already in flight.
    pub fn begin_crash_transfer(&mut self, transfer: CrashTransfer) -> Option<CrashTransfer> {
        self.crash_transfer.replace(transfer)
    }

    /// Clear the active transfer and queue its completion event.
    pub fn complete_crash_transfer(&mut self) {
        if let Some(transfer) = self.crash_transfer.take() {
            self.events
                .push(SessionEvent::CrashTransferComplete(transfer.into_completed()));
        }
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Drain queued events in the order they were raised.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }
}
