/// MIAX Mach (UDP) and SesM (TCP) session framing for TOM
///
/// Mach, little-endian: sequence(8) length(2, whole packet) type(1)
/// session(1). One application message per packet; a datagram carries
/// back-to-back packets which decode as siblings.
///
/// SesM, little-endian: length(2, excludes itself) type(1). Sequenced data
/// frames carry sequence(8) then one TOM message.

use super::{ensure, DecodeError, DecodeResult, LayerType, NextLayers, Reader};
use byteorder::{ByteOrder, LittleEndian};

pub const MACH_HEADER: usize = 12;

pub const MACH_HEARTBEAT: u8 = 0;
pub const MACH_START_OF_SESSION: u8 = 1;
pub const MACH_END_OF_SESSION: u8 = 2;
pub const MACH_APPLICATION_DATA: u8 = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachLayer {
    pub sequence: u64,
    pub length: u16,
    pub packet_type: u8,
    pub session: u8,
    /// Bytes after this packet too short to hold another one
    pub trailing: usize,
}

fn mach_packet_fits(rest: &[u8]) -> bool {
    rest.len() >= MACH_HEADER && {
        let len = LittleEndian::read_u16(&rest[8..10]) as usize;
        len >= MACH_HEADER && len <= rest.len()
    }
}

impl MachLayer {
    pub fn decode(&mut self, data: &[u8], next: &mut NextLayers<'_>) -> DecodeResult<()> {
        ensure(data, MACH_HEADER)?;
        let mut r = Reader::<LittleEndian>::new(data);
        self.sequence = r.u64()?;
        self.length = r.u16()?;
        self.packet_type = r.u8()?;
        self.session = r.u8()?;
        self.trailing = 0;

        let end = self.length as usize;
        if end < MACH_HEADER {
            return Err(DecodeError::BadLength(end));
        }
        if end > data.len() {
            return Err(DecodeError::TruncatedMessage {
                declared: end,
                actual: data.len(),
            });
        }
        if self.packet_type == MACH_APPLICATION_DATA && end > MACH_HEADER {
            next.push(LayerType::Tom, MACH_HEADER..end);
        }

        let rest = &data[end..];
        if mach_packet_fits(rest) {
            next.push_sibling(LayerType::Mach, end..data.len());
        } else {
            self.trailing = rest.len();
        }
        Ok(())
    }
}

pub const SESM_HEADER: usize = 3;

pub const SESM_SEQUENCED_DATA: u8 = b'S';
pub const SESM_UNSEQUENCED_DATA: u8 = b'U';

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SesMLayer {
    pub packet_type: u8,
    pub length: usize,
    pub sequence: Option<u64>,
    pub trailing: usize,
}

fn sesm_frame_fits(rest: &[u8]) -> bool {
    rest.len() >= SESM_HEADER && {
        let total = LittleEndian::read_u16(&rest[..2]) as usize + 2;
        total >= SESM_HEADER && total <= rest.len()
    }
}

impl SesMLayer {
    pub fn decode(&mut self, data: &[u8], next: &mut NextLayers<'_>) -> DecodeResult<()> {
        ensure(data, SESM_HEADER)?;
        let declared = LittleEndian::read_u16(&data[..2]) as usize;
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
        self.sequence = None;
        self.trailing = 0;

        if self.packet_type == SESM_SEQUENCED_DATA {
            let frame = &data[..total];
            ensure(frame, SESM_HEADER + 8)?;
            self.sequence = Some(LittleEndian::read_u64(&frame[3..11]));
            if total > SESM_HEADER + 8 {
                next.push(LayerType::Tom, SESM_HEADER + 8..total);
            }
        }

        let rest = &data[total..];
        if sesm_frame_fits(rest) {
            next.push_sibling(LayerType::SesM, total..data.len());
        } else {
            self.trailing = rest.len();
        }
        Ok(())
    }
}
