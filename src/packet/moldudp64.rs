/// MoldUDP64 and SoupBinTCP session framing for ITTO
///
/// MoldUDP64 (big-endian): session(10) sequence(8) count(2), then `count`
/// length-prefixed messages. SoupBinTCP (big-endian): back-to-back frames of
/// len(2) type(1) payload, where `len` excludes itself.

use super::{ensure, DecodeError, DecodeResult, LayerType, NextLayers, Reader};
use byteorder::{BigEndian, ByteOrder};

pub const MOLD_HEADER: usize = 20;
pub const MOLD_HEARTBEAT: u16 = 0;
pub const MOLD_END_OF_SESSION: u16 = 0xffff;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoldUdp64Layer {
    pub session: [u8; 10],
    pub sequence: u64,
    pub count: u16,
    /// Messages actually present. Lower than `count` when the batch
    /// continues in the next packet.
    pub delivered: u16,
    /// Bytes after the last declared message
    pub trailing: usize,
}

impl MoldUdp64Layer {
    pub fn is_heartbeat(&self) -> bool {
        self.count == MOLD_HEARTBEAT
    }

    pub fn is_end_of_session(&self) -> bool {
        self.count == MOLD_END_OF_SESSION
    }

    pub fn decode(&mut self, data: &[u8], next: &mut NextLayers<'_>) -> DecodeResult<()> {
        ensure(data, MOLD_HEADER)?;
        let mut r = Reader::<BigEndian>::new(data);
        self.session = r.bytes()?;
        self.sequence = r.u64()?;
        self.count = r.u16()?;
        self.delivered = 0;
        self.trailing = 0;

        let mut pos = MOLD_HEADER;
        if self.is_heartbeat() || self.is_end_of_session() {
            self.trailing = data.len() - pos;
            return Ok(());
        }
        while self.delivered < self.count && pos < data.len() {
            ensure(data, pos + 2)?;
            let len = BigEndian::read_u16(&data[pos..pos + 2]) as usize;
            let start = pos + 2;
            if start + len > data.len() {
                return Err(DecodeError::TruncatedMessage {
                    declared: len,
                    actual: data.len() - start,
                });
            }
            next.push(LayerType::Itto, start..start + len);
            pos = start + len;
            self.delivered += 1;
        }
        self.trailing = data.len() - pos;
        Ok(())
    }
}

pub const SOUP_HEADER: usize = 3;

pub const SOUP_SEQUENCED_DATA: u8 = b'S';
pub const SOUP_LOGIN_ACCEPTED: u8 = b'A';

/// One SoupBinTCP frame. Further frames in the same segment become siblings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoupBinTcpLayer {
    pub packet_type: u8,
    pub length: usize,
    /// Session name from a login-accepted frame
    pub session: [u8; 10],
    /// Next sequence number announced by a login-accepted frame
    pub login_sequence: Option<u64>,
    /// Bytes of an incomplete frame left at the end of the segment
    pub trailing: usize,
}

fn soup_frame_len(data: &[u8]) -> Option<usize> {
    if data.len() < SOUP_HEADER {
        return None;
    }
    let total = BigEndian::read_u16(&data[..2]) as usize + 2;
    (total >= SOUP_HEADER && total <= data.len()).then_some(total)
}

fn parse_ascii_number(field: &[u8]) -> Option<u64> {
    std::str::from_utf8(field).ok()?.trim().parse().ok()
}

impl SoupBinTcpLayer {
    pub fn decode(&mut self, data: &[u8], next: &mut NextLayers<'_>) -> DecodeResult<()> {
        ensure(data, SOUP_HEADER)?;
        let declared = BigEndian::read_u16(&data[..2]) as usize;
        if declared < 1 {
            return Err(DecodeError::BadLength(declared));
        }
        let total = declared + 2;
        if total > data.len() {
            return Err(DecodeError::TruncatedMessage {
                declared: total,
                actual: data.len(),
            });
        }
        self.packet_type = data[2];
        self.length = total;
        self.login_sequence = None;
        self.trailing = 0;

        match self.packet_type {
            SOUP_SEQUENCED_DATA if total > SOUP_HEADER => next.push(LayerType::Itto, SOUP_HEADER..total),
            SOUP_LOGIN_ACCEPTED => {
                ensure(&data[..total], SOUP_HEADER + 30)?;
                self.session.copy_from_slice(&data[3..13]);
                self.login_sequence = parse_ascii_number(&data[13..33]);
            }
            _ => {}
        }

        let rest = &data[total..];
        if soup_frame_len(rest).is_some() {
            next.push_sibling(LayerType::SoupBinTcp, total..data.len());
        } else {
            self.trailing = rest.len();
        }
        Ok(())
    }
}
