//! Length-prefixed JSON framing for control traffic.
//!
//! A thin typed layer over `LengthDelimitedCodec`: 4-byte big-endian length,
//! then a JSON document. Works over any AsyncRead/AsyncWrite; the channel
//! implementation layers it on Unix stream halves.

use std::io;
use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Control messages are tiny; anything near this size is a protocol bug and
/// is rejected instead of buffered.
const MAX_FRAME_LEN: usize = 1 << 20;

pub struct FrameCodec<T> {
    inner: LengthDelimitedCodec,
    _marker: PhantomData<T>,
}

impl<T> FrameCodec<T> {
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(4)
                .max_frame_length(MAX_FRAME_LEN)
                .new_codec(),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for FrameCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Decoder for FrameCodec<T> {
    type Item = T;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(frame) => {
                let item = serde_json::from_slice(&frame)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}

impl<T: Serialize> Encoder<T> for FrameCodec<T> {
    type Error = io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        tracing::trace!(frame_bytes = payload.len(), "encoding control frame");
        self.inner.encode(Bytes::from(payload), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::{ControlRequest, ServiceEvent};

    #[test]
    fn request_frames_roundtrip() {
        let mut codec = FrameCodec::<ControlRequest>::new();
        let mut buf = BytesMut::new();

        let req = ControlRequest::EnableFeature {
            user: "alice".to_string(),
            access_token: "a".to_string(),
            relay_token: "b".to_string(),
        };
        codec.encode(req.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded, req);
        assert!(buf.is_empty());
    }

    #[test]
    fn event_frames_roundtrip() {
        let mut codec = FrameCodec::<ServiceEvent>::new();
        let mut buf = BytesMut::new();

        let event = ServiceEvent::Status {
            enabled: true,
            identity: "alice@example.com".to_string(),
        };
        codec.encode(event.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded, event);
    }

    #[test]
    fn partial_frame_decodes_to_none() {
        let mut codec = FrameCodec::<ControlRequest>::new();
        let mut buf = BytesMut::new();
        codec.encode(ControlRequest::Hello, &mut buf).unwrap();

        let tail = buf.split_off(buf.len() / 2);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.unsplit(tail);
        assert_eq!(
            codec.decode(&mut buf).unwrap().unwrap(),
            ControlRequest::Hello
        );
    }

    #[test]
    fn back_to_back_frames_decode_in_order() {
        let mut codec = FrameCodec::<ControlRequest>::new();
        let mut buf = BytesMut::new();
        codec.encode(ControlRequest::Hello, &mut buf).unwrap();
        codec.encode(ControlRequest::QueryStatus, &mut buf).unwrap();

        assert_eq!(
            codec.decode(&mut buf).unwrap().unwrap(),
            ControlRequest::Hello
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap().unwrap(),
            ControlRequest::QueryStatus
        );
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let mut encoder = LengthDelimitedCodec::builder()
            .length_field_length(4)
            .new_codec();
        let mut buf = BytesMut::new();
        encoder
            .encode(Bytes::from_static(b"not json"), &mut buf)
            .unwrap();

        let mut codec = FrameCodec::<ControlRequest>::new();
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
