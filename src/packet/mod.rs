/// Layer algebra shared by the decode engine and every wire codec
///
/// A packet is decoded as a tree of layers. Each layer decodes its own bytes
/// in place (instances are recycled across packets) and reports the spans it
/// carries through a `NextLayers` sink: one span for stacked protocols,
/// several for batch framings, plus an optional sibling span for stream
/// framings that hold back-to-back frames.

pub mod bsu;
pub mod itto;
pub mod link;
pub mod mach;
pub mod moldudp64;
pub mod pitch;
pub mod tom;

use byteorder::ByteOrder;
use std::marker::PhantomData;
use std::ops::Range;
use thiserror::Error;

pub use bsu::BsuLayer;
pub use link::{Dot1QLayer, EthernetLayer, Ipv4Layer, TcpLayer, UdpLayer};
pub use mach::{MachLayer, SesMLayer};
pub use moldudp64::{MoldUdp64Layer, SoupBinTcpLayer};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    #[error("truncated message: declared length {declared} exceeds buffer {actual}")]
    TruncatedMessage { declared: usize, actual: usize },

    #[error("declared length {0} is shorter than the fixed header")]
    BadLength(usize),

    #[error("unsupported ethertype {0:#06x}")]
    UnsupportedEtherType(u16),

    #[error("unsupported ip version {0}")]
    UnsupportedIpVersion(u8),

    #[error("unsupported ip protocol {0}")]
    UnsupportedIpProtocol(u8),

    #[error("fragmented ip datagram")]
    Fragmented,

    #[error("no decoder registered for {0:?}")]
    Unregistered(LayerType),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Every layer kind the engine knows how to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerType {
    Ethernet,
    Dot1Q,
    Ipv4,
    Udp,
    Tcp,
    MoldUdp64,
    SoupBinTcp,
    Bsu,
    Mach,
    SesM,
    Itto,
    Pitch,
    Tom,
    Payload,
    Failure,
}

impl LayerType {
    pub const COUNT: usize = 15;

    pub const ALL: [LayerType; LayerType::COUNT] = [
        LayerType::Ethernet,
        LayerType::Dot1Q,
        LayerType::Ipv4,
        LayerType::Udp,
        LayerType::Tcp,
        LayerType::MoldUdp64,
        LayerType::SoupBinTcp,
        LayerType::Bsu,
        LayerType::Mach,
        LayerType::SesM,
        LayerType::Itto,
        LayerType::Pitch,
        LayerType::Tom,
        LayerType::Payload,
        LayerType::Failure,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Parses the protocol names used in configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        let t = match name.to_ascii_lowercase().as_str() {
            "ethernet" => LayerType::Ethernet,
            "moldudp64" => LayerType::MoldUdp64,
            "soupbintcp" => LayerType::SoupBinTcp,
            "bsu" => LayerType::Bsu,
            "mach" => LayerType::Mach,
            "sesm" => LayerType::SesM,
            "itto" => LayerType::Itto,
            "pitch" => LayerType::Pitch,
            "tom" => LayerType::Tom,
            _ => return None,
        };
        Some(t)
    }
}

/// How the first frame of a byte-stream framing lines up with a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFrame {
    Complete(usize),
    /// The frame continues in a later TCP segment
    Partial,
    /// Declared length shorter than the header; it never completes
    Malformed,
}

impl LayerType {
    /// Framings that run over TCP and may split a frame across segments
    pub fn is_stream_framing(self) -> bool {
        matches!(self, LayerType::SoupBinTcp | LayerType::SesM)
    }
}

/// Locates the end of the first SoupBinTCP or SesM frame in `data`.
pub fn stream_frame(framing: LayerType, data: &[u8]) -> StreamFrame {
    if data.len() < 2 {
        return StreamFrame::Partial;
    }
    let declared = match framing {
        LayerType::SoupBinTcp => byteorder::BigEndian::read_u16(&data[..2]),
        LayerType::SesM => byteorder::LittleEndian::read_u16(&data[..2]),
        _ => return StreamFrame::Malformed,
    } as usize;
    if declared < 1 {
        return StreamFrame::Malformed;
    }
    let total = declared + 2;
    if total > data.len() {
        StreamFrame::Partial
    } else {
        StreamFrame::Complete(total)
    }
}

/// Length of the longest prefix of `data` made of whole frames. A malformed
/// frame claims the rest of the buffer so it is decoded and reported now.
pub fn complete_frames(framing: LayerType, data: &[u8]) -> usize {
    let mut pos = 0;
    while pos < data.len() {
        match stream_frame(framing, &data[pos..]) {
            StreamFrame::Complete(n) => pos += n,
            StreamFrame::Partial => break,
            StreamFrame::Malformed => return data.len(),
        }
    }
    pos
}

/// Decoded application message of any of the three feeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Itto(itto::Message),
    Pitch(pitch::Message),
    Tom(tom::Message),
}

impl Message {
    pub fn decode(&mut self, data: &[u8]) -> DecodeResult<()> {
        match self {
            Message::Itto(m) => m.decode(data),
            Message::Pitch(m) => m.decode(data),
            Message::Tom(m) => m.decode(data),
        }
    }

    /// Raw message type tag as it appeared on the wire
    pub fn msg_type(&self) -> u8 {
        match self {
            Message::Itto(m) => m.msg_type(),
            Message::Pitch(m) => m.msg_type(),
            Message::Tom(m) => m.msg_type(),
        }
    }
}

/// Terminal layer for transport payloads no endpoint rule claims
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadLayer {
    pub len: usize,
}

/// Placeholder for a span whose decoder rejected it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureLayer {
    pub failed: LayerType,
    pub error: Option<DecodeError>,
    pub len: usize,
}

impl Default for FailureLayer {
    fn default() -> Self {
        FailureLayer {
            failed: LayerType::Payload,
            error: None,
            len: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Ethernet(EthernetLayer),
    Dot1Q(Dot1QLayer),
    Ipv4(Ipv4Layer),
    Udp(UdpLayer),
    Tcp(TcpLayer),
    MoldUdp64(MoldUdp64Layer),
    SoupBinTcp(SoupBinTcpLayer),
    Bsu(BsuLayer),
    Mach(MachLayer),
    SesM(SesMLayer),
    App(Message),
    Payload(PayloadLayer),
    Failure(FailureLayer),
}

impl Layer {
    /// Fresh instance for `t`. Used as the default factory of the registry.
    pub fn new(t: LayerType) -> Layer {
        match t {
            LayerType::Ethernet => Layer::Ethernet(EthernetLayer::default()),
            LayerType::Dot1Q => Layer::Dot1Q(Dot1QLayer::default()),
            LayerType::Ipv4 => Layer::Ipv4(Ipv4Layer::default()),
            LayerType::Udp => Layer::Udp(UdpLayer::default()),
            LayerType::Tcp => Layer::Tcp(TcpLayer::default()),
            LayerType::MoldUdp64 => Layer::MoldUdp64(MoldUdp64Layer::default()),
            LayerType::SoupBinTcp => Layer::SoupBinTcp(SoupBinTcpLayer::default()),
            LayerType::Bsu => Layer::Bsu(BsuLayer::default()),
            LayerType::Mach => Layer::Mach(MachLayer::default()),
            LayerType::SesM => Layer::SesM(SesMLayer::default()),
            LayerType::Itto => Layer::App(Message::Itto(itto::Message::default())),
            LayerType::Pitch => Layer::App(Message::Pitch(pitch::Message::default())),
            LayerType::Tom => Layer::App(Message::Tom(tom::Message::default())),
            LayerType::Payload => Layer::Payload(PayloadLayer::default()),
            LayerType::Failure => Layer::Failure(FailureLayer::default()),
        }
    }

    pub fn layer_type(&self) -> LayerType {
        match self {
            Layer::Ethernet(_) => LayerType::Ethernet,
            Layer::Dot1Q(_) => LayerType::Dot1Q,
            Layer::Ipv4(_) => LayerType::Ipv4,
            Layer::Udp(_) => LayerType::Udp,
            Layer::Tcp(_) => LayerType::Tcp,
            Layer::MoldUdp64(_) => LayerType::MoldUdp64,
            Layer::SoupBinTcp(_) => LayerType::SoupBinTcp,
            Layer::Bsu(_) => LayerType::Bsu,
            Layer::Mach(_) => LayerType::Mach,
            Layer::SesM(_) => LayerType::SesM,
            Layer::App(Message::Itto(_)) => LayerType::Itto,
            Layer::App(Message::Pitch(_)) => LayerType::Pitch,
            Layer::App(Message::Tom(_)) => LayerType::Tom,
            Layer::Payload(_) => LayerType::Payload,
            Layer::Failure(_) => LayerType::Failure,
        }
    }

    /// Decode `data` into this instance, overwriting its previous contents.
    pub fn decode(&mut self, data: &[u8], next: &mut NextLayers<'_>) -> DecodeResult<()> {
        match self {
            Layer::Ethernet(l) => l.decode(data, next),
            Layer::Dot1Q(l) => l.decode(data, next),
            Layer::Ipv4(l) => l.decode(data, next),
            Layer::Udp(l) => l.decode(data, next),
            Layer::Tcp(l) => l.decode(data, next),
            Layer::MoldUdp64(l) => l.decode(data, next),
            Layer::SoupBinTcp(l) => l.decode(data, next),
            Layer::Bsu(l) => l.decode(data, next),
            Layer::Mach(l) => l.decode(data, next),
            Layer::SesM(l) => l.decode(data, next),
            Layer::App(m) => m.decode(data),
            Layer::Payload(l) => {
                l.len = data.len();
                Ok(())
            }
            Layer::Failure(l) => {
                l.len = data.len();
                Ok(())
            }
        }
    }

    pub fn is_session_framing(&self) -> bool {
        matches!(
            self,
            Layer::MoldUdp64(_) | Layer::SoupBinTcp(_) | Layer::Bsu(_) | Layer::Mach(_) | Layer::SesM(_)
        )
    }

    /// Sequence number of the first message a session-framing layer carries.
    /// `None` for framings that number messages implicitly (SoupBinTCP).
    pub fn first_sequence(&self) -> Option<u64> {
        match self {
            Layer::MoldUdp64(l) => Some(l.sequence),
            Layer::Bsu(l) => Some(l.sequence as u64),
            Layer::Mach(l) => Some(l.sequence),
            Layer::SesM(l) => l.sequence,
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match self {
            Layer::App(m) => Some(m),
            _ => None,
        }
    }
}

/// Transport carrying a payload, used to match endpoint rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Transport {
    #[default]
    Udp,
    Tcp,
}

/// "Payload of traffic to `port` over `transport` is `layer`"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointRule {
    pub transport: Transport,
    pub port: u16,
    pub layer: LayerType,
}

/// Ordered list of endpoint rules. Destination port wins over source port.
#[derive(Debug, Clone, Default)]
pub struct EndpointTable {
    rules: Vec<EndpointRule>,
}

impl EndpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rule: EndpointRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[EndpointRule] {
        &self.rules
    }

    pub fn lookup(&self, transport: Transport, src_port: u16, dst_port: u16) -> Option<LayerType> {
        let find = |port: u16| {
            self.rules
                .iter()
                .find(|r| r.transport == transport && r.port == port)
                .map(|r| r.layer)
        };
        find(dst_port).or_else(|| find(src_port))
    }
}

/// Pending span waiting to be decoded. Offsets are absolute in the packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub layer: LayerType,
    pub range: Range<usize>,
    pub parent: Option<usize>,
}

/// Sink through which a layer reports the spans it carries.
pub struct NextLayers<'a> {
    spans: &'a mut Vec<Span>,
    endpoints: &'a EndpointTable,
    base: usize,
    this: Option<usize>,
    parent: Option<usize>,
}

impl<'a> NextLayers<'a> {
    /// `base` is the absolute offset of the span being decoded, `this` its
    /// index in the decoded list and `parent` the index of its parent.
    pub fn new(
        spans: &'a mut Vec<Span>,
        endpoints: &'a EndpointTable,
        base: usize,
        this: Option<usize>,
        parent: Option<usize>,
    ) -> Self {
        NextLayers {
            spans,
            endpoints,
            base,
            this,
            parent,
        }
    }

    /// Child span nested inside the current layer. `range` is relative.
    pub fn push(&mut self, layer: LayerType, range: Range<usize>) {
        self.spans.push(Span {
            layer,
            range: self.base + range.start..self.base + range.end,
            parent: self.this,
        });
    }

    /// Sibling span following the current layer at the same nesting level.
    pub fn push_sibling(&mut self, layer: LayerType, range: Range<usize>) {
        self.spans.push(Span {
            layer,
            range: self.base + range.start..self.base + range.end,
            parent: self.parent,
        });
    }

    /// Transport payload whose type comes from the endpoint rules.
    pub fn push_transport(&mut self, transport: Transport, src_port: u16, dst_port: u16, range: Range<usize>) {
        let layer = self
            .endpoints
            .lookup(transport, src_port, dst_port)
            .unwrap_or(LayerType::Payload);
        self.push(layer, range);
    }
}

/// Bounds-checked cursor over a message body with protocol-fixed byte order
pub(crate) struct Reader<'a, E> {
    data: &'a [u8],
    pos: usize,
    _order: PhantomData<E>,
}

impl<'a, E: ByteOrder> Reader<'a, E> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Reader {
            data,
            pos: 0,
            _order: PhantomData,
        }
    }

    #[inline]
    fn take(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(DecodeError::BufferTooSmall {
                need: end,
                have: self.data.len(),
            });
        }
        let s = &self.data[self.pos..end];
        self.pos = end;
        Ok(s)
    }

    pub(crate) fn skip(&mut self, n: usize) -> DecodeResult<()> {
        self.take(n).map(|_| ())
    }

    pub(crate) fn u8(&mut self) -> DecodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> DecodeResult<u16> {
        Ok(E::read_u16(self.take(2)?))
    }

    pub(crate) fn u32(&mut self) -> DecodeResult<u32> {
        Ok(E::read_u32(self.take(4)?))
    }

    pub(crate) fn u64(&mut self) -> DecodeResult<u64> {
        Ok(E::read_u64(self.take(8)?))
    }

    pub(crate) fn bytes<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Compact or wide price, normalised to 4 decimals.
    pub(crate) fn price(&mut self, wide: bool) -> DecodeResult<crate::protocol::Price> {
        if wide {
            Ok(crate::protocol::price_from_4dp(self.u32()? as u64))
        } else {
            Ok(crate::protocol::price_from_2dp(self.u16()? as u64))
        }
    }

    /// Compact (16 bit) or wide (32 bit) size.
    pub(crate) fn size(&mut self, wide: bool) -> DecodeResult<u32> {
        if wide {
            self.u32()
        } else {
            Ok(self.u16()? as u32)
        }
    }
}

/// Fails with `BufferTooSmall` unless `data` holds at least `need` bytes.
#[inline]
pub(crate) fn ensure(data: &[u8], need: usize) -> DecodeResult<()> {
    if data.len() < need {
        return Err(DecodeError::BufferTooSmall {
            need,
            have: data.len(),
        });
    }
    Ok(())
}
