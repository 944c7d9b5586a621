// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Framing of the ingest stream: `kind (u8) || varint body length || protobuf body`.

use crate::errors::FrameError;
use crate::message::{PAgentHandshake, PApiMetaData, PSpan, PSpanChunk, PSqlMetaData, PStringMetaData};
use bytes::{Buf, BufMut, BytesMut};
use prost::Message;
use tokio_util::codec::{Decoder, Encoder};

pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;
const MAX_VARINT_LENGTH: usize = 10;

const KIND_HANDSHAKE: u8 = 0;
const KIND_SPAN: u8 = 1;
const KIND_SPAN_CHUNK: u8 = 2;
const KIND_API_METADATA: u8 = 3;
const KIND_STRING_METADATA: u8 = 4;
const KIND_SQL_METADATA: u8 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Handshake(PAgentHandshake),
    Span(PSpan),
    SpanChunk(PSpanChunk),
    ApiMetaData(PApiMetaData),
    StringMetaData(PStringMetaData),
    SqlMetaData(PSqlMetaData),
}

impl Frame {
    pub fn kind(&self) -> u8 {
        match self {
            Frame::Handshake(_) => KIND_HANDSHAKE,
            Frame::Span(_) => KIND_SPAN,
            Frame::SpanChunk(_) => KIND_SPAN_CHUNK,
            Frame::ApiMetaData(_) => KIND_API_METADATA,
            Frame::StringMetaData(_) => KIND_STRING_METADATA,
            Frame::SqlMetaData(_) => KIND_SQL_METADATA,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Frame::Handshake(_) => "handshake",
            Frame::Span(_) => "span",
            Frame::SpanChunk(_) => "span chunk",
            Frame::ApiMetaData(_) => "api metadata",
            Frame::StringMetaData(_) => "string metadata",
            Frame::SqlMetaData(_) => "sql metadata",
        }
    }

    fn body_len(&self) -> usize {
        match self {
            Frame::Handshake(m) => m.encoded_len(),
            Frame::Span(m) => m.encoded_len(),
            Frame::SpanChunk(m) => m.encoded_len(),
            Frame::ApiMetaData(m) => m.encoded_len(),
            Frame::StringMetaData(m) => m.encoded_len(),
            Frame::SqlMetaData(m) => m.encoded_len(),
        }
    }

    fn encode_body(&self, dst: &mut BytesMut) -> Result<(), prost::EncodeError> {
        match self {
            Frame::Handshake(m) => m.encode(dst),
            Frame::Span(m) => m.encode(dst),
            Frame::SpanChunk(m) => m.encode(dst),
            Frame::ApiMetaData(m) => m.encode(dst),
            Frame::StringMetaData(m) => m.encode(dst),
            Frame::SqlMetaData(m) => m.encode(dst),
        }
    }

    fn decode_body(kind: u8, body: &[u8]) -> Result<Frame, FrameError> {
        Ok(match kind {
            KIND_HANDSHAKE => Frame::Handshake(PAgentHandshake::decode(body)?),
            KIND_SPAN => Frame::Span(PSpan::decode(body)?),
            KIND_SPAN_CHUNK => Frame::SpanChunk(PSpanChunk::decode(body)?),
            KIND_API_METADATA => Frame::ApiMetaData(PApiMetaData::decode(body)?),
            KIND_STRING_METADATA => Frame::StringMetaData(PStringMetaData::decode(body)?),
            KIND_SQL_METADATA => Frame::SqlMetaData(PSqlMetaData::decode(body)?),
            unknown => return Err(FrameError::UnknownKind(unknown)),
        })
    }
}

/// Reads a varint without consuming it. `Ok(None)` means more bytes are needed.
fn peek_varint(buf: &[u8]) -> Result<Option<(u64, usize)>, FrameError> {
    let mut value = 0u64;
    for (i, byte) in buf.iter().take(MAX_VARINT_LENGTH).enumerate() {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if buf.len() >= MAX_VARINT_LENGTH {
        return Err(FrameError::InvalidLength);
    }
    Ok(None)
}

#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        let Some(&kind) = src.first() else {
            return Ok(None);
        };
        let Some((len, len_size)) = peek_varint(&src[1..])? else {
            return Ok(None);
        };
        let len = usize::try_from(len).map_err(|_| FrameError::InvalidLength)?;
        if len > self.max_frame_size {
            return Err(FrameError::TooLarge {
                len,
                max: self.max_frame_size,
            });
        }
        let header = 1 + len_size;
        if src.len() < header + len {
            src.reserve(header + len - src.len());
            return Ok(None);
        }
        src.advance(header);
        let body = src.split_to(len);
        Frame::decode_body(kind, &body).map(Some)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let len = frame.body_len();
        if len > self.max_frame_size {
            return Err(FrameError::TooLarge {
                len,
                max: self.max_frame_size,
            });
        }
        dst.reserve(1 + prost::encoding::encoded_len_varint(len as u64) + len);
        dst.put_u8(frame.kind());
        prost::encoding::encode_varint(len as u64, dst);
        frame.encode_body(dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::PTransactionId;

    fn span() -> Frame {
        Frame::Span(PSpan {
            version: 1,
            transaction_id: Some(PTransactionId {
                agent_id: "agent-1".to_string(),
                agent_start_time: 1,
                sequence: 2,
            }),
            span_id: 99,
            parent_span_id: -1,
            elapsed: 120,
            ..Default::default()
        })
    }

    fn encoded(frame: Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameCodec::default()
            .encode(frame, &mut buf)
            .expect("encodes");
        buf
    }

    #[test]
    fn test_decode_partial_buffers() {
        let full = encoded(span());
        let mut codec = FrameCodec::default();
        let mut src = BytesMut::new();
        for byte in &full[..full.len() - 1] {
            src.put_u8(*byte);
            assert_eq!(codec.decode(&mut src).expect("no error"), None);
        }
        src.put_u8(full[full.len() - 1]);
        assert_eq!(codec.decode(&mut src).expect("no error"), Some(span()));
        assert!(src.is_empty());
    }

    #[test]
    fn test_decode_back_to_back_frames() {
        let mut src = encoded(span());
        src.extend_from_slice(&encoded(Frame::SqlMetaData(PSqlMetaData {
            sql_id: 3,
            sql: "SELECT 1".to_string(),
        })));
        let mut codec = FrameCodec::default();
        assert_eq!(codec.decode(&mut src).expect("decodes"), Some(span()));
        assert!(matches!(
            codec.decode(&mut src).expect("decodes"),
            Some(Frame::SqlMetaData(PSqlMetaData { sql_id: 3, .. }))
        ));
        assert_eq!(codec.decode(&mut src).expect("empty"), None);
    }

    #[test]
    fn test_unknown_kind() {
        let mut src = BytesMut::from(&[42u8, 0][..]);
        assert!(matches!(
            FrameCodec::default().decode(&mut src),
            Err(FrameError::UnknownKind(42))
        ));
    }

    #[test]
    fn test_frame_too_large() {
        let mut src = BytesMut::new();
        src.put_u8(KIND_SPAN);
        prost::encoding::encode_varint(1024, &mut src);
        assert!(matches!(
            FrameCodec::new(16).decode(&mut src),
            Err(FrameError::TooLarge { len: 1024, max: 16 })
        ));
        assert!(matches!(
            FrameCodec::new(16).encode(span(), &mut BytesMut::new()),
            Err(FrameError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_malformed_varint() {
        let mut src = BytesMut::from(&[KIND_SPAN, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff][..]);
        assert!(matches!(
            FrameCodec::default().decode(&mut src),
            Err(FrameError::InvalidLength)
        ));
    }
}
