/// Packet processors
///
/// A processor pulls frames from a `CaptureSource`, decodes them, numbers
/// every application message within its session and hands it to a `Handler`.
/// `ReusingProcessor` runs the pooled `Decoder`; `CopyingProcessor` parses the
/// network headers with etherparse into owned values and builds fresh layer
/// values for every framing and message. Both report the same message stream.

use crate::capture::{CaptureError, CaptureSource};
use crate::decoder::{ancestor, DecodedLayer, Decoder, LayerRegistry};
use crate::packet::{
    complete_frames, EndpointRule, EndpointTable, Layer, LayerType, Message, NextLayers, Span, Transport,
};
use crate::session::{Flow, SessionId, SessionTable};
use crate::stats::FeedStats;
use etherparse::{NetHeaders, PacketHeaders, TransportHeader};
use std::net::Ipv4Addr;
use std::ops::Range;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// One numbered application message
#[derive(Debug, Clone, Copy)]
pub struct MessageEvent<'a> {
    pub session: SessionId,
    pub flow: Flow,
    pub sequence: u64,
    /// Capture timestamp of the carrying packet
    pub timestamp: Duration,
    pub message: &'a Message,
}

pub trait Handler {
    /// Called once per frame before it is decoded.
    fn handle_packet(&mut self, _data: &[u8], _timestamp: Duration) -> Result<(), HandlerError> {
        Ok(())
    }

    fn handle_message(&mut self, event: &MessageEvent<'_>) -> Result<(), HandlerError>;
}

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("capture source failed")]
    Capture(#[from] CaptureError),

    #[error("handler failed at packet {packet}")]
    Handler {
        packet: u64,
        #[source]
        source: HandlerError,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub packets: u64,
    /// Frames whose link layer could not be decoded
    pub skipped: u64,
    pub messages: u64,
    /// Inner spans replaced by failure placeholders
    pub decode_failures: u64,
    pub sessions: usize,
    pub gaps: u64,
    pub missing: u64,
    pub duplicates: u64,
    /// Messages dropped because their sequence number overflowed
    pub unsequenced: u64,
    /// Bytes of partial stream frames still waiting for their next segment
    pub buffered: u64,
}

pub trait PacketProcessor {
    /// Stop after `packets` frames; 0 means run to the end of the source.
    fn limit(&mut self, packets: u64);

    fn add_endpoint(&mut self, rule: EndpointRule);

    fn run<S, H>(&mut self, source: &mut S, handler: &mut H) -> Result<RunSummary, ProcessorError>
    where
        S: CaptureSource + ?Sized,
        H: Handler + ?Sized;
}

/// Partial SoupBinTCP / SesM frames held per flow until the next segment
#[derive(Debug, Default)]
struct StreamCarry {
    pending: Vec<(Flow, Vec<u8>)>,
}

impl StreamCarry {
    fn take(&mut self, flow: &Flow) -> Vec<u8> {
        match self.pending.iter().position(|(f, _)| f == flow) {
            Some(i) => self.pending.swap_remove(i).1,
            None => Vec::new(),
        }
    }

    fn keep(&mut self, flow: &Flow, rest: Vec<u8>) {
        if !rest.is_empty() {
            self.pending.push((*flow, rest));
        }
    }

    fn buffered(&self) -> u64 {
        self.pending.iter().map(|(_, b)| b.len() as u64).sum()
    }
}

/// Stream payload after joining it with what its flow left over
enum Segment {
    /// Whole frames only and nothing carried: decode the packet as it is
    Whole,
    /// Complete frames to decode in place of the payload; may be empty
    Joined(Vec<u8>),
}

/// Session bookkeeping shared by both processors
#[derive(Debug, Default)]
struct Dispatch {
    sessions: SessionTable,
    stats: FeedStats,
    carry: StreamCarry,
}

impl Dispatch {
    fn begin(&self, limit: u64) -> RunSummary {
        info!(limit, sessions = self.sessions.len(), "replay started");
        RunSummary::default()
    }

    fn finish(&self, mut summary: RunSummary) -> RunSummary {
        summary.sessions = self.sessions.len();
        summary.missing = self.sessions.total_missing();
        summary.duplicates = self.sessions.total_duplicates();
        summary.buffered = self.carry.buffered();
        info!(
            packets = summary.packets,
            messages = summary.messages,
            skipped = summary.skipped,
            failures = summary.decode_failures,
            sessions = summary.sessions,
            gaps = summary.gaps,
            buffered = summary.buffered,
            "replay finished"
        );
        summary
    }

    /// Joins a TCP payload of a stream framing with the partial frame its
    /// flow left behind, and holds back any new partial tail.
    fn reassemble(&mut self, flow: &Flow, framing: LayerType, payload: &[u8]) -> Segment {
        let mut joined = self.carry.take(flow);
        if joined.is_empty() {
            let complete = complete_frames(framing, payload);
            if complete == payload.len() {
                return Segment::Whole;
            }
            self.carry.keep(flow, payload[complete..].to_vec());
            return Segment::Joined(payload[..complete].to_vec());
        }
        joined.extend_from_slice(payload);
        let complete = complete_frames(framing, &joined);
        let rest = joined.split_off(complete);
        debug!(flow = %flow, joined = joined.len(), held = rest.len(), "stream frame reassembled");
        self.carry.keep(flow, rest);
        Segment::Joined(joined)
    }

    /// Numbers and delivers every application message in `layers`.
    fn deliver<H: Handler + ?Sized>(
        &mut self,
        layers: &[DecodedLayer],
        flow: &Flow,
        timestamp: Duration,
        summary: &mut RunSummary,
        handler: &mut H,
    ) -> Result<(), HandlerError> {
        for (i, entry) in layers.iter().enumerate() {
            match &entry.layer {
                Layer::SoupBinTcp(soup) => {
                    if let Some(next) = soup.login_sequence {
                        let id = self.sessions.lookup_or_insert(flow);
                        self.sessions.restart(id, next);
                    }
                }
                Layer::App(message) => {
                    let session = self.sessions.lookup_or_insert(flow);
                    let first = ancestor(layers, i, Layer::is_session_framing)
                        .and_then(|f| layers[f].layer.first_sequence());
                    let Some(numbered) = self.sessions.sequence(session, first, entry.ordinal) else {
                        summary.unsequenced += 1;
                        continue;
                    };
                    if let Some((start, end)) = numbered.gap {
                        summary.gaps += 1;
                        self.stats.record_gap(end - start + 1);
                    }
                    summary.messages += 1;
                    self.stats.record_message();
                    handler.handle_message(&MessageEvent {
                        session,
                        flow: *flow,
                        sequence: numbered.sequence,
                        timestamp,
                        message,
                    })?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn count_failures(layers: &[DecodedLayer]) -> u64 {
    layers.iter().filter(|l| matches!(l.layer, Layer::Failure(_))).count() as u64
}

/// Stream framing directly above TCP and the byte range it was given
fn stream_payload(layers: &[DecodedLayer]) -> Option<(LayerType, Range<usize>)> {
    let tcp = layers.iter().position(|l| matches!(l.layer, Layer::Tcp(_)))?;
    let child = layers.iter().find(|l| l.parent == Some(tcp))?;
    let framing = match &child.layer {
        Layer::Failure(f) => f.failed,
        other => other.layer_type(),
    };
    framing.is_stream_framing().then(|| (framing, child.span.clone()))
}

/// Flow of the first IPv4 + UDP/TCP pair in the packet
fn flow_of(layers: &[DecodedLayer]) -> Flow {
    let mut flow = Flow::default();
    for entry in layers {
        match &entry.layer {
            Layer::Ipv4(ip) => {
                flow.src = ip.src;
                flow.dst = ip.dst;
            }
            Layer::Udp(udp) => {
                flow.src_port = udp.src_port;
                flow.dst_port = udp.dst_port;
                flow.transport = Transport::Udp;
                break;
            }
            Layer::Tcp(tcp) => {
                flow.src_port = tcp.src_port;
                flow.dst_port = tcp.dst_port;
                flow.transport = Transport::Tcp;
                break;
            }
            _ => {}
        }
    }
    flow
}

/// Replays through the pooled multi-layer decoder
pub struct ReusingProcessor {
    decoder: Decoder,
    root: LayerType,
    limit: u64,
    dispatch: Dispatch,
}

impl ReusingProcessor {
    pub fn new(registry: LayerRegistry) -> Self {
        ReusingProcessor {
            decoder: Decoder::new(registry),
            root: LayerType::Ethernet,
            limit: 0,
            dispatch: Dispatch::default(),
        }
    }

    /// Layer type of the first byte of every frame (Ethernet by default)
    pub fn with_root(mut self, root: LayerType) -> Self {
        self.root = root;
        self
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.dispatch.sessions
    }

    pub fn stats(&self) -> &FeedStats {
        &self.dispatch.stats
    }
}

impl Default for ReusingProcessor {
    fn default() -> Self {
        Self::new(LayerRegistry::standard())
    }
}

impl PacketProcessor for ReusingProcessor {
    fn limit(&mut self, packets: u64) {
        self.limit = packets;
    }

    fn add_endpoint(&mut self, rule: EndpointRule) {
        self.decoder.add_endpoint(rule);
    }

    fn run<S, H>(&mut self, source: &mut S, handler: &mut H) -> Result<RunSummary, ProcessorError>
    where
        S: CaptureSource + ?Sized,
        H: Handler + ?Sized,
    {
        let mut summary = self.dispatch.begin(self.limit);
        while self.limit == 0 || summary.packets < self.limit {
            let Some(packet) = source.next_packet()? else {
                break;
            };
            let started = Instant::now();
            summary.packets += 1;
            self.dispatch.stats.record_packet(packet.data.len());
            let packet_no = summary.packets;
            handler
                .handle_packet(packet.data, packet.timestamp)
                .map_err(|source| ProcessorError::Handler { packet: packet_no, source })?;

            let layers = self.decoder.decode(self.root, packet.data);
            if matches!(layers[0].layer, Layer::Failure(_)) {
                debug!(packet = packet_no, "link layer undecodable, packet skipped");
                summary.skipped += 1;
                continue;
            }

            let flow = flow_of(&layers);
            let segment = stream_payload(&layers)
                .map(|(framing, range)| (framing, self.dispatch.reassemble(&flow, framing, &packet.data[range])));
            let delivered = match segment {
                Some((framing, Segment::Joined(frames))) => {
                    drop(layers);
                    if frames.is_empty() {
                        Ok(())
                    } else {
                        let layers = self.decoder.decode(framing, &frames);
                        summary.decode_failures += count_failures(&layers);
                        self.dispatch.deliver(&layers, &flow, packet.timestamp, &mut summary, handler)
                    }
                }
                _ => {
                    summary.decode_failures += count_failures(&layers);
                    self.dispatch.deliver(&layers, &flow, packet.timestamp, &mut summary, handler)
                }
            };
            delivered.map_err(|source| ProcessorError::Handler { packet: packet_no, source })?;
            self.dispatch.stats.record_packet_latency(started.elapsed());
        }
        Ok(self.dispatch.finish(summary))
    }
}

/// Replays by copying: etherparse for the network headers, fresh values for
/// everything above them.
#[derive(Debug, Default)]
pub struct CopyingProcessor {
    endpoints: EndpointTable,
    limit: u64,
    dispatch: Dispatch,
}

impl CopyingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.dispatch.sessions
    }

    pub fn stats(&self) -> &FeedStats {
        &self.dispatch.stats
    }

    /// Owned flow and transport payload of an Ethernet frame
    fn split_frame(data: &[u8]) -> Option<(Flow, Vec<u8>)> {
        let headers = match PacketHeaders::from_ethernet_slice(data) {
            Ok(h) => h,
            Err(e) => {
                debug!(error = %e, "etherparse rejected frame");
                return None;
            }
        };
        let (src, dst) = match &headers.net {
            Some(NetHeaders::Ipv4(ip, _)) if !ip.is_fragmenting_payload() => {
                (Ipv4Addr::from(ip.source), Ipv4Addr::from(ip.destination))
            }
            _ => return None,
        };
        let payload = headers.payload.slice();
        let (src_port, dst_port, transport, payload) = match &headers.transport {
            Some(TransportHeader::Udp(udp)) => {
                let len = (udp.length as usize).saturating_sub(8).min(payload.len());
                (udp.source_port, udp.destination_port, Transport::Udp, &payload[..len])
            }
            Some(TransportHeader::Tcp(tcp)) => (tcp.source_port, tcp.destination_port, Transport::Tcp, payload),
            _ => return None,
        };
        let flow = Flow {
            src,
            dst,
            src_port,
            dst_port,
            transport,
        };
        Some((flow, payload.to_vec()))
    }

    /// Decodes a transport payload into freshly built layers.
    fn decode_payload(&self, root: LayerType, payload: &[u8]) -> Vec<DecodedLayer> {
        let mut pending = vec![Span {
            layer: root,
            range: 0..payload.len(),
            parent: None,
        }];
        let mut layers: Vec<DecodedLayer> = Vec::new();
        let mut children: Vec<usize> = Vec::new();
        let mut head = 0;

        while head < pending.len() {
            let span = pending[head].clone();
            head += 1;
            let index = layers.len();
            let ordinal = span.parent.map_or(0, |p| {
                children[p] += 1;
                children[p] - 1
            });
            children.push(0);

            let bytes = &payload[span.range.clone()];
            let mark = pending.len();
            let mut layer = Layer::new(span.layer);
            let result = {
                let mut next = NextLayers::new(&mut pending, &self.endpoints, span.range.start, Some(index), span.parent);
                layer.decode(bytes, &mut next)
            };
            if let Err(error) = result {
                debug!(layer = ?span.layer, %error, "span decode failed");
                pending.truncate(mark);
                layer = Layer::Failure(crate::packet::FailureLayer {
                    failed: span.layer,
                    error: Some(error),
                    len: bytes.len(),
                });
            }
            layers.push(DecodedLayer {
                layer,
                parent: span.parent,
                ordinal,
                span: span.range,
            });
        }
        layers
    }
}

impl PacketProcessor for CopyingProcessor {
    fn limit(&mut self, packets: u64) {
        self.limit = packets;
    }

    fn add_endpoint(&mut self, rule: EndpointRule) {
        self.endpoints.add(rule);
    }

    fn run<S, H>(&mut self, source: &mut S, handler: &mut H) -> Result<RunSummary, ProcessorError>
    where
        S: CaptureSource + ?Sized,
        H: Handler + ?Sized,
    {
        let mut summary = self.dispatch.begin(self.limit);
        while self.limit == 0 || summary.packets < self.limit {
            let Some(packet) = source.next_packet()? else {
                break;
            };
            let started = Instant::now();
            summary.packets += 1;
            self.dispatch.stats.record_packet(packet.data.len());
            let packet_no = summary.packets;
            handler
                .handle_packet(packet.data, packet.timestamp)
                .map_err(|source| ProcessorError::Handler { packet: packet_no, source })?;

            let Some((flow, payload)) = Self::split_frame(packet.data) else {
                summary.skipped += 1;
                continue;
            };
            let Some(root) = self.endpoints.lookup(flow.transport, flow.src_port, flow.dst_port) else {
                continue;
            };
            let payload = if root.is_stream_framing() {
                match self.dispatch.reassemble(&flow, root, &payload) {
                    Segment::Whole => payload,
                    Segment::Joined(frames) if frames.is_empty() => continue,
                    Segment::Joined(frames) => frames,
                }
            } else {
                payload
            };
            let layers = self.decode_payload(root, &payload);
            summary.decode_failures += count_failures(&layers);
            self.dispatch
                .deliver(&layers, &flow, packet.timestamp, &mut summary, handler)
                .map_err(|source| ProcessorError::Handler { packet: packet_no, source })?;
            self.dispatch.stats.record_packet_latency(started.elapsed());
        }
        Ok(self.dispatch.finish(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MemorySource;

    #[derive(Default)]
    struct Collect {
        packets: usize,
        events: Vec<(SessionId, u64, u8)>,
    }

    impl Handler for Collect {
        fn handle_packet(&mut self, _data: &[u8], _timestamp: Duration) -> Result<(), HandlerError> {
            self.packets += 1;
            Ok(())
        }

        fn handle_message(&mut self, event: &MessageEvent<'_>) -> Result<(), HandlerError> {
            self.events.push((event.session, event.sequence, event.message.msg_type()));
            Ok(())
        }
    }

    fn mach_frame(packets: &[(u64, &[u8])]) -> Vec<u8> {
        let mut payload = Vec::new();
        for (seq, msg) in packets {
            payload.extend_from_slice(&seq.to_le_bytes());
            payload.extend_from_slice(&((12 + msg.len()) as u16).to_le_bytes());
            payload.push(3);
            payload.push(1);
            payload.extend_from_slice(msg);
        }
        let udp_len = 8 + payload.len();
        let total = 20 + udp_len;
        let mut f = vec![0x01, 0, 0x5e, 0, 0, 1, 0x02, 0, 0, 0, 0, 1, 0x08, 0x00];
        f.extend_from_slice(&[0x45, 0, (total >> 8) as u8, total as u8, 0, 0, 0x40, 0, 64, 17, 0, 0]);
        f.extend_from_slice(&[10, 0, 0, 1, 239, 0, 0, 1]);
        f.extend_from_slice(&[0x13, 0x88, 0x4e, 0x20, (udp_len >> 8) as u8, udp_len as u8, 0, 0]);
        f.extend_from_slice(&payload);
        f
    }

    #[test]
    fn test_mach_sequences_follow_each_packet() {
        let mut source = MemorySource::new();
        source.push(mach_frame(&[(5, b"1\x01\0\0\0"), (6, b"1\x02\0\0\0")]), Duration::ZERO);
        source.push(mach_frame(&[(9, b"1\x03\0\0\0")]), Duration::ZERO);

        let mut processor = ReusingProcessor::default();
        processor.add_endpoint(EndpointRule { transport: Transport::Udp, port: 20000, layer: LayerType::Mach });
        let mut handler = Collect::default();
        let summary = processor.run(&mut source, &mut handler).unwrap();

        assert_eq!(handler.packets, 2);
        let seqs: Vec<u64> = handler.events.iter().map(|e| e.1).collect();
        assert_eq!(seqs, vec![5, 6, 9]);
        assert_eq!(summary.messages, 3);
        assert_eq!(summary.gaps, 1);
        assert_eq!(summary.missing, 2);
        assert_eq!(summary.sessions, 1);
    }

    #[test]
    fn test_limit_stops_early() {
        let mut source = MemorySource::new();
        for seq in 0..5u64 {
            source.push(mach_frame(&[(seq, b"1\x01\0\0\0")]), Duration::ZERO);
        }
        let mut processor = CopyingProcessor::new();
        processor.add_endpoint(EndpointRule { transport: Transport::Udp, port: 20000, layer: LayerType::Mach });
        processor.limit(2);
        let mut handler = Collect::default();
        let summary = processor.run(&mut source, &mut handler).unwrap();
        assert_eq!(summary.packets, 2);
        assert_eq!(handler.events.len(), 2);
    }

    #[test]
    fn test_garbage_frame_is_skipped() {
        let mut source = MemorySource::new();
        source.push(vec![0u8; 6], Duration::ZERO);
        let mut processor = ReusingProcessor::default();
        let summary = processor.run(&mut source, &mut Collect::default()).unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.messages, 0);
    }

    struct Failing;

    impl Handler for Failing {
        fn handle_message(&mut self, _event: &MessageEvent<'_>) -> Result<(), HandlerError> {
            Err("boom".into())
        }
    }

    #[test]
    fn test_handler_error_aborts() {
        let mut source = MemorySource::new();
        source.push(mach_frame(&[(1, b"1\x01\0\0\0")]), Duration::ZERO);
        source.push(mach_frame(&[(2, b"1\x01\0\0\0")]), Duration::ZERO);
        let mut processor = ReusingProcessor::default();
        processor.add_endpoint(EndpointRule { transport: Transport::Udp, port: 20000, layer: LayerType::Mach });
        let err = processor.run(&mut source, &mut Failing).unwrap_err();
        assert!(matches!(err, ProcessorError::Handler { packet: 1, .. }));
    }
}
