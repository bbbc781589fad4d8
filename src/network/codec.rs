// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{NetError, NetResult};

/// Fixed-size prefix of every frame on the wire.
///
/// Layout is big-endian, payload length first:
/// `[payload_len: u32][msg_id: u32][payload: payload_len bytes]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub payload_len: u32,
    pub msg_id: u32,
}

impl FrameHeader {
    pub const SIZE: usize = 8;
}

/// One complete protocol unit: header plus optional payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_id: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(msg_id: u32, payload: Bytes) -> Frame {
        Frame { msg_id, payload }
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Translates between in-memory [`Frame`] values and their binary encoding.
///
/// The size limit is a per-instance value handed in by the server, so a codec
/// behaves the same regardless of any process-wide state.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> FrameCodec {
        FrameCodec { max_frame_size }
    }

    pub const fn header_size(&self) -> usize {
        FrameHeader::SIZE
    }

    /// Interprets exactly [`FrameHeader::SIZE`] leading bytes as a header.
    ///
    /// A declared payload length above the size limit is a protocol error;
    /// the caller is expected to drop the connection rather than resync.
    pub fn decode_header(&self, buf: &[u8]) -> NetResult<FrameHeader> {
        if buf.len() < FrameHeader::SIZE {
            return Err(NetError::MalformedHeader(format!(
                "need {} bytes for a header, got {}",
                FrameHeader::SIZE,
                buf.len()
            )));
        }
        let mut cursor = &buf[..FrameHeader::SIZE];
        let payload_len = cursor.get_u32();
        let msg_id = cursor.get_u32();
        if payload_len as usize > self.max_frame_size {
            return Err(NetError::MalformedHeader(format!(
                "frame of length {} is too large, limit is {}",
                payload_len, self.max_frame_size
            )));
        }
        Ok(FrameHeader { payload_len, msg_id })
    }

    /// Produces `header_size() + payload.len()` bytes, header first.
    pub fn encode(&self, msg_id: u32, payload: &[u8]) -> NetResult<BytesMut> {
        if payload.len() > self.max_frame_size {
            return Err(NetError::MalformedHeader(format!(
                "frame of length {} is too large, limit is {}",
                payload.len(),
                self.max_frame_size
            )));
        }
        let mut buf = BytesMut::with_capacity(FrameHeader::SIZE + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.put_u32(msg_id);
        buf.put_slice(payload);
        Ok(buf)
    }
}
