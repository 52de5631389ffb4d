use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::registers::{Address, Operation};

/// The air unit always answers with a fixed size frame, regardless of what was asked.
pub const RESPONSE_LENGTH: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub operation: Operation,
    pub address: Address,
    /// Payload of a write. Reads carry none.
    pub value: Option<u8>,
}

impl Request {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5);
        bytes.extend(self.operation.code());
        bytes.extend(self.address.0);
        bytes.extend(self.value);
        bytes
    }
}

pub struct FrameCodec {}

impl Encoder<Request> for FrameCodec {
    type Error = std::io::Error;
    fn encode(&mut self, req: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend(req.to_bytes());
        trace!(message = "sending encoded", buffer = ?dst);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Vec<u8>;
    type Error = std::io::Error;
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        trace!(message = "attempt at decoding", buffer = ?src);
        if src.len() < RESPONSE_LENGTH {
            src.reserve(RESPONSE_LENGTH - src.len());
            return Ok(None);
        }
        Ok(Some(src.split_to(RESPONSE_LENGTH).to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers;

    #[test]
    fn read_request_layout() {
        let mut buffer = BytesMut::new();
        FrameCodec {}.encode(registers::UNIT_NAME.read_request(), &mut buffer).unwrap();
        assert_eq!(&buffer[..], &[0x01, 0x04, 0x15, 0xe5]);
    }

    #[test]
    fn write_request_layout() {
        let mut buffer = BytesMut::new();
        let request = registers::MANUAL_FAN_STEP.write_request(7).unwrap();
        FrameCodec {}.encode(request, &mut buffer).unwrap();
        assert_eq!(&buffer[..], &[0x01, 0x06, 0x15, 0x61, 0x07]);
    }

    #[test]
    fn waits_for_a_complete_response() {
        let mut codec = FrameCodec {};
        let mut buffer = BytesMut::from(&[0xaa; 40][..]);
        assert!(codec.decode(&mut buffer).unwrap().is_none());
        buffer.extend_from_slice(&[0xbb; 30]);
        let frame = codec.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(frame.len(), RESPONSE_LENGTH);
        assert_eq!(frame[39], 0xaa);
        assert_eq!(frame[40], 0xbb);
        assert_eq!(buffer.len(), 7);
    }

    #[test]
    fn truncated_response_at_eof_is_an_error() {
        let mut codec = FrameCodec {};
        let mut buffer = BytesMut::from(&[0x00; 10][..]);
        assert!(codec.decode_eof(&mut buffer).is_err());
    }
}
