/// Packet capture sources
///
/// Classic libpcap files in either byte order with microsecond or nanosecond
/// timestamps, plus an in-memory source used by tests and benchmarks.

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const PCAP_MAGIC_MICROS: u32 = 0xa1b2_c3d4;
pub const PCAP_MAGIC_NANOS: u32 = 0xa1b2_3c4d;
pub const LINKTYPE_ETHERNET: u32 = 1;

const GLOBAL_HEADER: usize = 24;
const RECORD_HEADER: usize = 16;
const MAX_SNAPLEN: u32 = 256 * 1024;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture i/o error")]
    Io(#[from] io::Error),

    #[error("failed to open capture '{path}'")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("not a pcap file: magic {0:#010x}")]
    BadMagic(u32),

    #[error("unsupported link type {0}")]
    UnsupportedLinkType(u32),

    #[error("truncated capture: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("record length {0} exceeds snap length limit")]
    RecordTooLarge(u32),
}

/// One captured frame, borrowed from the source until the next call
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    pub data: &'a [u8],
    pub timestamp: Duration,
}

pub trait CaptureSource {
    /// Next frame, or `None` at the end of the capture.
    fn next_packet(&mut self) -> Result<Option<Packet<'_>>, CaptureError>;
}

/// Fills `buf` unless the stream ends first; returns the bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u32(self, b: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(b),
            Endian::Big => BigEndian::read_u32(b),
        }
    }
}

/// Streaming reader for classic pcap
pub struct PcapReader<R> {
    reader: R,
    endian: Endian,
    nanos: bool,
    link_type: u32,
    header: [u8; RECORD_HEADER],
    buf: Vec<u8>,
}

pub type PcapFile = PcapReader<BufReader<File>>;

impl PcapFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CaptureError::Open {
            path: path.display().to_string(),
            source,
        })?;
        PcapReader::new(BufReader::new(file))
    }
}

impl<R: Read> PcapReader<R> {
    pub fn new(mut reader: R) -> Result<Self, CaptureError> {
        let mut global = [0u8; GLOBAL_HEADER];
        let got = read_full(&mut reader, &mut global)?;
        if got < GLOBAL_HEADER {
            return Err(CaptureError::Truncated {
                expected: GLOBAL_HEADER,
                got,
            });
        }

        let (endian, nanos) = match (LittleEndian::read_u32(&global[..4]), BigEndian::read_u32(&global[..4])) {
            (PCAP_MAGIC_MICROS, _) => (Endian::Little, false),
            (PCAP_MAGIC_NANOS, _) => (Endian::Little, true),
            (_, PCAP_MAGIC_MICROS) => (Endian::Big, false),
            (_, PCAP_MAGIC_NANOS) => (Endian::Big, true),
            (magic, _) => return Err(CaptureError::BadMagic(magic)),
        };
        let link_type = endian.u32(&global[20..24]);
        if link_type != LINKTYPE_ETHERNET {
            return Err(CaptureError::UnsupportedLinkType(link_type));
        }

        Ok(PcapReader {
            reader,
            endian,
            nanos,
            link_type,
            header: [0u8; RECORD_HEADER],
            buf: Vec::with_capacity(2048),
        })
    }

    pub fn link_type(&self) -> u32 {
        self.link_type
    }

    pub fn is_nanosecond(&self) -> bool {
        self.nanos
    }
}

impl<R: Read> CaptureSource for PcapReader<R> {
    fn next_packet(&mut self) -> Result<Option<Packet<'_>>, CaptureError> {
        let got = read_full(&mut self.reader, &mut self.header)?;
        if got == 0 {
            return Ok(None);
        }
        if got < RECORD_HEADER {
            return Err(CaptureError::Truncated {
                expected: RECORD_HEADER,
                got,
            });
        }

        let secs = self.endian.u32(&self.header[0..4]) as u64;
        let frac = self.endian.u32(&self.header[4..8]);
        let incl_len = self.endian.u32(&self.header[8..12]);
        if incl_len > MAX_SNAPLEN {
            return Err(CaptureError::RecordTooLarge(incl_len));
        }

        let len = incl_len as usize;
        self.buf.resize(len, 0);
        let got = read_full(&mut self.reader, &mut self.buf)?;
        if got < len {
            return Err(CaptureError::Truncated { expected: len, got });
        }

        let timestamp = if self.nanos {
            Duration::new(secs, frac)
        } else {
            Duration::new(secs, frac.saturating_mul(1_000))
        };
        Ok(Some(Packet {
            data: &self.buf,
            timestamp,
        }))
    }
}

/// Writes little-endian, microsecond-resolution Ethernet captures.
pub struct PcapWriter<W: Write> {
    writer: W,
}

impl PcapWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| CaptureError::Open {
            path: path.display().to_string(),
            source,
        })?;
        PcapWriter::new(BufWriter::new(file))
    }
}

impl<W: Write> PcapWriter<W> {
    pub fn new(mut writer: W) -> Result<Self, CaptureError> {
        writer.write_u32::<LittleEndian>(PCAP_MAGIC_MICROS)?;
        writer.write_u16::<LittleEndian>(2)?;
        writer.write_u16::<LittleEndian>(4)?;
        writer.write_i32::<LittleEndian>(0)?;
        writer.write_u32::<LittleEndian>(0)?;
        writer.write_u32::<LittleEndian>(MAX_SNAPLEN)?;
        writer.write_u32::<LittleEndian>(LINKTYPE_ETHERNET)?;
        Ok(PcapWriter { writer })
    }

    pub fn write_packet(&mut self, data: &[u8], timestamp: Duration) -> Result<(), CaptureError> {
        self.writer.write_u32::<LittleEndian>(timestamp.as_secs() as u32)?;
        self.writer.write_u32::<LittleEndian>(timestamp.subsec_micros())?;
        self.writer.write_u32::<LittleEndian>(data.len() as u32)?;
        self.writer.write_u32::<LittleEndian>(data.len() as u32)?;
        self.writer.write_all(data)?;
        Ok(())
    }

    pub fn into_inner(mut self) -> Result<W, CaptureError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Pre-buffered packets. Rewinding replays the same frames, which keeps
/// file i/o out of benchmark loops.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    packets: Vec<(Vec<u8>, Duration)>,
    pos: usize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains `source` into memory.
    pub fn load<S: CaptureSource + ?Sized>(source: &mut S) -> Result<Self, CaptureError> {
        let mut mem = MemorySource::new();
        while let Some(p) = source.next_packet()? {
            mem.push(p.data.to_vec(), p.timestamp);
        }
        Ok(mem)
    }

    pub fn push(&mut self, data: Vec<u8>, timestamp: Duration) {
        self.packets.push((data, timestamp));
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

impl CaptureSource for MemorySource {
    fn next_packet(&mut self) -> Result<Option<Packet<'_>>, CaptureError> {
        let Some((data, timestamp)) = self.packets.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;
        Ok(Some(Packet {
            data,
            timestamp: *timestamp,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn written(frames: &[(&[u8], Duration)]) -> Vec<u8> {
        let mut w = PcapWriter::new(Vec::new()).unwrap();
        for (data, ts) in frames {
            w.write_packet(data, *ts).unwrap();
        }
        w.into_inner().unwrap()
    }

    #[test]
    fn test_roundtrip_through_writer() {
        let bytes = written(&[(b"abc", Duration::from_micros(1_500_000)), (b"defg", Duration::from_secs(2))]);
        let mut reader = PcapReader::new(Cursor::new(bytes)).unwrap();
        let p = reader.next_packet().unwrap().unwrap();
        assert_eq!(p.data, b"abc");
        assert_eq!(p.timestamp, Duration::from_millis(1500));
        let p = reader.next_packet().unwrap().unwrap();
        assert_eq!(p.data, b"defg");
        assert!(reader.next_packet().unwrap().is_none());
    }

    #[test]
    fn test_big_endian_nanosecond_capture() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&PCAP_MAGIC_NANOS.to_be_bytes());
        bytes.extend_from_slice(&[0, 2, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff, 0, 0, 0, 1]);
        bytes.extend_from_slice(&3u32.to_be_bytes());
        bytes.extend_from_slice(&250u32.to_be_bytes());
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&[9, 9]);
        let mut reader = PcapReader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.is_nanosecond());
        let p = reader.next_packet().unwrap().unwrap();
        assert_eq!(p.timestamp, Duration::new(3, 250));
        assert_eq!(p.data, &[9, 9]);
    }

    #[test]
    fn test_bad_magic() {
        let res = PcapReader::new(Cursor::new(vec![0u8; 24]));
        assert!(matches!(res, Err(CaptureError::BadMagic(0))));
    }

    #[test]
    fn test_truncated_record() {
        let mut bytes = written(&[(b"abcdef", Duration::ZERO)]);
        bytes.truncate(bytes.len() - 2);
        let mut reader = PcapReader::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            reader.next_packet(),
            Err(CaptureError::Truncated { expected: 6, got: 4 })
        ));
    }

    #[test]
    fn test_memory_source_rewind() {
        let mut mem = MemorySource::new();
        mem.push(vec![1], Duration::ZERO);
        mem.push(vec![2], Duration::ZERO);
        let mut seen = 0;
        while mem.next_packet().unwrap().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 2);
        mem.rewind();
        assert_eq!(mem.next_packet().unwrap().unwrap().data, &[1]);
    }
}
