use tracing::info;

use super::BodyHandler;
use crate::codec::WireCursor;
use crate::error::Result;
use crate::response::ResponseBuffer;
use crate::session::SessionState;

const PREFIX: &str = "*>S:";
const IMEI_LEN: usize = 15;
const ACK: &[u8] = b"*<S";

/// Identity handshake: `*>S:` followed by the 15-digit device IMEI.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityBody;

impl BodyHandler for IdentityBody {
    fn identifier(&self) -> &'static str {
        "*>S"
    }

    fn handle(
        &self,
        state: &mut SessionState,
        body: &mut WireCursor<'_>,
        response: &mut ResponseBuffer,
    ) -> Result<()> {
        body.expect_literal(PREFIX, "NTCB identity prefix")?;
        let imei = String::from_utf8_lossy(body.take(IMEI_LEN)?).into_owned();

        info!(imei = %imei, "device identified");
        state.device_identifier = Some(imei);

        response.put_slice(ACK);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, FrameError};

    #[test]
    fn stores_imei_and_acks() {
        let mut state = SessionState::new();
        let mut response = ResponseBuffer::new();
        let mut body = WireCursor::new(b"*>S:356307042441013");

        IdentityBody.handle(&mut state, &mut body, &mut response).unwrap();

        assert_eq!(state.device_identifier.as_deref(), Some("356307042441013"));
        assert_eq!(response.as_slice(), b"*<S");
    }

    #[test]
    fn missing_colon_is_framing_error() {
        let mut state = SessionState::new();
        let mut response = ResponseBuffer::new();
        let mut body = WireCursor::new(b"*>S#356307042441013");

        let err = IdentityBody
            .handle(&mut state, &mut body, &mut response)
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidPreamble { .. }));
        assert_eq!(err.kind(), ErrorKind::Framing);
    }

    #[test]
    fn short_imei_is_truncated() {
        let mut state = SessionState::new();
        let mut response = ResponseBuffer::new();
        let mut body = WireCursor::new(b"*>S:3563");

        let err = IdentityBody
            .handle(&mut state, &mut body, &mut response)
            .unwrap_err();
        assert!(matches!(err, FrameError::Truncated { .. }));
        assert!(state.device_identifier.is_none());
    }
}
