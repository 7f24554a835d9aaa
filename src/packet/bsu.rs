/// BATS Sequenced Unit header
///
/// Little-endian: length(2, whole packet) count(1) unit(1) sequence(4),
/// followed by `count` PITCH messages each prefixed by its own length byte.

use super::{ensure, DecodeError, DecodeResult, LayerType, NextLayers, Reader};
use byteorder::LittleEndian;

pub const BSU_HEADER: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BsuLayer {
    pub length: u16,
    pub count: u8,
    pub unit: u8,
    pub sequence: u32,
    pub trailing: usize,
}

impl BsuLayer {
    pub fn is_heartbeat(&self) -> bool {
        self.count == 0
    }

    pub fn decode(&mut self, data: &[u8], next: &mut NextLayers<'_>) -> DecodeResult<()> {
        ensure(data, BSU_HEADER)?;
        let mut r = Reader::<LittleEndian>::new(data);
        self.length = r.u16()?;
        self.count = r.u8()?;
        self.unit = r.u8()?;
        self.sequence = r.u32()?;

        let end = self.length as usize;
        if end < BSU_HEADER {
            return Err(DecodeError::BadLength(end));
        }
        if end > data.len() {
            return Err(DecodeError::TruncatedMessage {
                declared: end,
                actual: data.len(),
            });
        }

        let mut pos = BSU_HEADER;
        for _ in 0..self.count {
            if pos >= end {
                return Err(DecodeError::BufferTooSmall { need: pos + 1, have: end });
            }
            let len = data[pos] as usize;
            if len < 2 {
                return Err(DecodeError::BadLength(len));
            }
            if pos + len > end {
                return Err(DecodeError::TruncatedMessage {
                    declared: len,
                    actual: end - pos,
                });
            }
            next.push(LayerType::Pitch, pos..pos + len);
            pos += len;
        }
        self.trailing = data.len() - pos;
        Ok(())
    }
}
