/// Packet processor tests: sequencing, gaps and variant equivalence

mod common;

use common::*;
use feed_sim::capture::PcapReader;
use feed_sim::{
    CaptureSource, CopyingProcessor, EndpointRule, Handler, HandlerError, LayerType, MemorySource, Message,
    MessageEvent, OptionId, PacketProcessor, PcapWriter, ReusingProcessor, SessionId, Side, Simulator,
    Subscription, Transport,
};
use std::io::Cursor;
use std::time::Duration;

const MOLD_PORT: u16 = 18000;
const SOUP_PORT: u16 = 18001;
const BSU_PORT: u16 = 30001;
const MACH_PORT: u16 = 51000;
const SESM_PORT: u16 = 51001;

fn rules() -> Vec<EndpointRule> {
    vec![
        EndpointRule { transport: Transport::Udp, port: MOLD_PORT, layer: LayerType::MoldUdp64 },
        EndpointRule { transport: Transport::Tcp, port: SOUP_PORT, layer: LayerType::SoupBinTcp },
        EndpointRule { transport: Transport::Udp, port: BSU_PORT, layer: LayerType::Bsu },
        EndpointRule { transport: Transport::Udp, port: MACH_PORT, layer: LayerType::Mach },
        EndpointRule { transport: Transport::Tcp, port: SESM_PORT, layer: LayerType::SesM },
    ]
}

#[derive(Default)]
struct Recorder {
    packets: usize,
    events: Vec<(SessionId, u64, Message)>,
}

impl Handler for Recorder {
    fn handle_packet(&mut self, _data: &[u8], _timestamp: Duration) -> Result<(), HandlerError> {
        self.packets += 1;
        Ok(())
    }

    fn handle_message(&mut self, event: &MessageEvent<'_>) -> Result<(), HandlerError> {
        self.events.push((event.session, event.sequence, event.message.clone()));
        Ok(())
    }
}

/// One capture exercising every framing
fn mixed_capture() -> MemorySource {
    let mut src = MemorySource::new();
    let mut ts = Duration::from_secs(1_700_000_000);
    let mut push = |frame: Vec<u8>| {
        ts += Duration::from_micros(10);
        src.push(frame, ts);
    };

    push(udp_frame(5000, MOLD_PORT, &moldudp64(1, &[itto_add(1, b'B', 42, 150, 10), itto_add(2, b'S', 42, 160, 5)])));
    push(udp_frame(5000, MOLD_PORT, &moldudp64(3, &[itto_executed(1, 4)])));

    let mut soup = soup_login_accepted(100);
    soup.extend_from_slice(&soup_sequenced(&itto_add(9, b'B', 43, 120, 7)));
    push(tcp_frame(40000, SOUP_PORT, 1, &soup));
    push(tcp_frame(40000, SOUP_PORT, 40, &soup_sequenced(&itto_delete(9))));

    push(udp_frame(5000, BSU_PORT, &bsu(500, &[pitch_add_short(77, b'B', 3, b"SPY   ", 410), pitch_delete(77)])));

    let mut mach_payload = mach(20, &tom_top(b'B', 7, 100, 3));
    mach_payload.extend_from_slice(&mach(21, &tom_top(b'O', 7, 105, 2)));
    push(udp_frame(5000, MACH_PORT, &mach_payload));

    push(tcp_frame(40001, SESM_PORT, 1, &sesm_sequenced(60, &tom_double(8, (99, 1), (101, 1)))));

    // ignored traffic
    push(udp_frame(5000, 9999, b"noise"));
    src
}

#[test]
fn test_reusing_and_copying_agree() {
    let mut reusing = ReusingProcessor::default();
    let mut copying = CopyingProcessor::new();
    for rule in rules() {
        reusing.add_endpoint(rule);
        copying.add_endpoint(rule);
    }

    let mut source = mixed_capture();
    let mut a = Recorder::default();
    let summary_a = reusing.run(&mut source, &mut a).unwrap();
    source.rewind();
    let mut b = Recorder::default();
    let summary_b = copying.run(&mut source, &mut b).unwrap();

    assert_eq!(a.packets, 8);
    assert_eq!(a.events.len(), 10);
    assert_eq!(a.events, b.events);
    assert_eq!(summary_a, summary_b);
    assert_eq!(summary_a.sessions, 5);
}

#[test]
fn test_sequence_numbers_per_framing() {
    let mut processor = ReusingProcessor::default();
    for rule in rules() {
        processor.add_endpoint(rule);
    }
    let mut rec = Recorder::default();
    processor.run(&mut mixed_capture(), &mut rec).unwrap();

    let seqs: Vec<(usize, u64)> = rec.events.iter().map(|(s, seq, _)| (s.0, *seq)).collect();
    assert_eq!(
        seqs,
        vec![
            (0, 1),
            (0, 2),
            (0, 3),
            // SoupBinTCP numbers from the login
            (1, 100),
            (1, 101),
            (2, 500),
            (2, 501),
            (3, 20),
            (3, 21),
            (4, 60),
        ]
    );
}

#[test]
fn test_gaps_are_counted() {
    let mut processor = ReusingProcessor::default();
    processor.add_endpoint(rules()[0]);
    let mut src = MemorySource::new();
    src.push(udp_frame(5000, MOLD_PORT, &moldudp64(1, &[itto_delete(1), itto_delete(2)])), Duration::ZERO);
    src.push(udp_frame(5000, MOLD_PORT, &moldudp64(6, &[itto_delete(3)])), Duration::ZERO);
    src.push(udp_frame(5000, MOLD_PORT, &moldudp64(2, &[itto_delete(4)])), Duration::ZERO);

    let summary = processor.run(&mut src, &mut Recorder::default()).unwrap();
    assert_eq!(summary.messages, 4);
    assert_eq!(summary.gaps, 1);
    assert_eq!(summary.missing, 3);
    assert_eq!(summary.duplicates, 1);
    let session = processor.sessions().get(SessionId(0)).unwrap();
    assert_eq!(session.gaps().gaps(), &[(3, 5)]);
}

#[test]
fn test_sequence_overflow_drops_message() {
    let mut processor = ReusingProcessor::default();
    processor.add_endpoint(rules()[0]);
    let mut src = MemorySource::new();
    src.push(udp_frame(5000, MOLD_PORT, &moldudp64(u64::MAX, &[itto_delete(1), itto_delete(2)])), Duration::ZERO);

    let mut rec = Recorder::default();
    let summary = processor.run(&mut src, &mut rec).unwrap();
    assert_eq!(summary.messages, 1);
    assert_eq!(summary.unsequenced, 1);
    assert_eq!(rec.events.len(), 1);
    assert_eq!(rec.events[0].1, u64::MAX);
}

/// `frame` cut at each of `cuts`, one TCP segment per piece
fn split_stream(port: u16, frame: &[u8], cuts: &[usize]) -> MemorySource {
    let mut src = MemorySource::new();
    let mut start = 0;
    for end in cuts.iter().copied().chain([frame.len()]) {
        src.push(tcp_frame(40000, port, start as u32 + 1, &frame[start..end]), Duration::ZERO);
        start = end;
    }
    src
}

fn run_both(source: &mut MemorySource) -> [(feed_sim::RunSummary, Recorder); 2] {
    let mut reusing = ReusingProcessor::default();
    let mut copying = CopyingProcessor::new();
    for rule in rules() {
        reusing.add_endpoint(rule);
        copying.add_endpoint(rule);
    }
    let mut a = Recorder::default();
    let summary_a = reusing.run(&mut *source, &mut a).unwrap();
    source.rewind();
    let mut b = Recorder::default();
    let summary_b = copying.run(&mut *source, &mut b).unwrap();
    [(summary_a, a), (summary_b, b)]
}

#[test]
fn test_stream_frame_split_across_segments() {
    let mut soup = soup_sequenced(&itto_add(9, b'B', 43, 120, 7));
    let first_len = soup.len();
    soup.extend_from_slice(&soup_sequenced(&itto_delete(9)));
    // inside the length prefix, inside the body, inside the second frame
    for cuts in [vec![1], vec![10], vec![1, 10, first_len + 3]] {
        let mut src = split_stream(SOUP_PORT, &soup, &cuts);
        for (summary, rec) in run_both(&mut src) {
            assert_eq!(summary.packets, cuts.len() as u64 + 1);
            assert_eq!(summary.messages, 2, "cuts {cuts:?}");
            assert_eq!(summary.decode_failures, 0);
            assert_eq!(summary.buffered, 0);
            let kinds: Vec<u8> = rec.events.iter().map(|(_, _, m)| m.msg_type()).collect();
            assert_eq!(kinds, vec![b'a', b'D']);
        }
    }
}

#[test]
fn test_sesm_frame_split_across_segments() {
    let frame = sesm_sequenced(60, &tom_double(8, (99, 1), (101, 1)));
    let mut src = split_stream(SESM_PORT, &frame, &[5]);
    for (summary, rec) in run_both(&mut src) {
        assert_eq!(summary.messages, 1);
        assert_eq!(summary.decode_failures, 0);
        assert_eq!(rec.events[0].1, 60);
    }
}

#[test]
fn test_unfinished_stream_frame_is_reported() {
    let soup = soup_sequenced(&itto_delete(9));
    let mut src = split_stream(SOUP_PORT, &soup[..6], &[]);
    for (summary, rec) in run_both(&mut src) {
        assert!(rec.events.is_empty());
        assert_eq!(summary.decode_failures, 0);
        assert_eq!(summary.buffered, 6);
    }
}

#[test]
fn test_pcap_roundtrip_through_simulator() {
    let mut writer = PcapWriter::new(Vec::new()).unwrap();
    let mut mem = mixed_capture();
    while let Some(p) = mem.next_packet().unwrap() {
        writer.write_packet(p.data, p.timestamp).unwrap();
    }
    let bytes = writer.into_inner().unwrap();

    let mut reader = PcapReader::new(Cursor::new(bytes)).unwrap();
    let mut processor = ReusingProcessor::default();
    for rule in rules() {
        processor.add_endpoint(rule);
    }
    let mut sim = Simulator::new(Subscription::auto());
    let summary = processor.run(&mut reader, &mut sim).unwrap();
    assert_eq!(summary.packets, 8);

    let book = sim.book();
    // ITTO: bid 6 left after a partial execution, ask untouched
    assert_eq!(book.best(OptionId(42), Side::Bid).map(|l| (l.price, l.size)), Some((15_000, 6)));
    assert_eq!(book.best(OptionId(42), Side::Ask).map(|l| (l.price, l.size)), Some((16_000, 5)));
    // SoupBinTCP add then delete, PITCH add then delete
    assert_eq!(book.best(OptionId(43), Side::Bid), None);
    assert_eq!(book.best(OptionId::from_symbol(b"SPY   "), Side::Bid), None);
    // TOM levels are absolute
    assert_eq!(book.best(OptionId(7), Side::Ask).map(|l| l.price), Some(10_500));
    assert_eq!(book.best(OptionId(8), Side::Bid).map(|l| l.price), Some(9_900));
    assert_eq!(sim.stats().not_found, 0);
}

#[test]
fn test_limit_applies_to_both_variants() {
    for copying in [false, true] {
        let mut src = mixed_capture();
        let mut rec = Recorder::default();
        let summary = if copying {
            let mut p = CopyingProcessor::new();
            p.limit(3);
            p.run(&mut src, &mut rec).unwrap()
        } else {
            let mut p = ReusingProcessor::default();
            p.limit(3);
            p.run(&mut src, &mut rec).unwrap()
        };
        assert_eq!(summary.packets, 3);
        assert_eq!(rec.packets, 3);
        // no endpoints, nothing decodes past the transport
        assert!(rec.events.is_empty());
    }
}
