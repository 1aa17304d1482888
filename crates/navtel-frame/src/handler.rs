use crate::error::Result;
use crate::response::ResponseBuffer;
use crate::session::SessionState;

/// A top-level message handler selected by the first byte of a message.
///
/// The connection driver calls [`pending_bytes`](Self::pending_bytes) with
/// everything received for the current message so far, appends exactly the
/// returned number of bytes, and calls again until it returns zero. At that
/// point `response` holds the bytes to send back.
///
/// Implementations must not perform I/O and must decide purely from the
/// buffer length until the terminal call, so a driver may abandon a message
/// at any read boundary without leaving partial session updates behind.
pub trait PacketHandler: Send + Sync {
    /// First byte this handler is registered under.
    fn identifier(&self) -> u8;

    /// Number of additional bytes needed, or zero when the message is done.
    fn pending_bytes(
        &self,
        state: &mut SessionState,
        received: &[u8],
        response: &mut ResponseBuffer,
    ) -> Result<usize>;
}
