use crate::error::Result;
use crate::handler::PacketHandler;
use crate::response::ResponseBuffer;
use crate::session::SessionState;
use crate::PING_PREFIX;

/// Keep-alive: a single `0x7F` byte, never answered.
#[derive(Debug, Clone, Copy, Default)]
pub struct PingHandler;

impl PacketHandler for PingHandler {
    fn identifier(&self) -> u8 {
        PING_PREFIX
    }

    fn pending_bytes(
        &self,
        _state: &mut SessionState,
        _received: &[u8],
        _response: &mut ResponseBuffer,
    ) -> Result<usize> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_completes_without_reply() {
        let mut state = SessionState::new();
        let mut response = ResponseBuffer::new();
        let need = PingHandler
            .pending_bytes(&mut state, &[PING_PREFIX], &mut response)
            .unwrap();
        assert_eq!(need, 0);
        assert!(response.is_empty());
    }
}
