/// Decode throughput and latency benchmarks

use byteorder::{BigEndian, WriteBytesExt};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use feed_sim::packet::itto;
use feed_sim::{
    CopyingProcessor, Decoder, EndpointRule, Handler, HandlerError, LayerType, MemorySource, MessageEvent,
    PacketProcessor, ReusingProcessor, Transport,
};
use std::time::Duration;

const MOLD_PORT: u16 = 18000;

fn itto_add(order_id: u32) -> Vec<u8> {
    let mut m = vec![b'a'];
    m.write_u32::<BigEndian>(0).unwrap();
    m.write_u32::<BigEndian>(order_id).unwrap();
    m.push(if order_id % 2 == 0 { b'B' } else { b'S' });
    m.write_u32::<BigEndian>(1 + order_id % 64).unwrap();
    m.write_u16::<BigEndian>(100 + (order_id % 50) as u16).unwrap();
    m.write_u16::<BigEndian>(10).unwrap();
    m
}

/// Ethernet/IPv4/UDP/MoldUDP64 frame carrying `count` ITTO adds
fn mold_frame(seq: u64, count: usize) -> Vec<u8> {
    let mut mold = b"SESSION001".to_vec();
    mold.write_u64::<BigEndian>(seq).unwrap();
    mold.write_u16::<BigEndian>(count as u16).unwrap();
    for i in 0..count {
        let msg = itto_add(seq as u32 + i as u32);
        mold.write_u16::<BigEndian>(msg.len() as u16).unwrap();
        mold.extend_from_slice(&msg);
    }

    let udp_len = 8 + mold.len();
    let mut f = vec![0x01, 0x00, 0x5e, 0, 0, 1, 0x02, 0, 0, 0, 0, 1, 0x08, 0x00];
    f.extend_from_slice(&[0x45, 0]);
    f.write_u16::<BigEndian>((20 + udp_len) as u16).unwrap();
    f.extend_from_slice(&[0, 0, 0x40, 0, 64, 17, 0, 0, 10, 0, 0, 1, 233, 54, 12, 1]);
    f.write_u16::<BigEndian>(5000).unwrap();
    f.write_u16::<BigEndian>(MOLD_PORT).unwrap();
    f.write_u16::<BigEndian>(udp_len as u16).unwrap();
    f.write_u16::<BigEndian>(0).unwrap();
    f.extend_from_slice(&mold);
    f
}

fn mold_rule() -> EndpointRule {
    EndpointRule {
        transport: Transport::Udp,
        port: MOLD_PORT,
        layer: LayerType::MoldUdp64,
    }
}

struct Count(u64);

impl Handler for Count {
    fn handle_message(&mut self, _event: &MessageEvent<'_>) -> Result<(), HandlerError> {
        self.0 += 1;
        Ok(())
    }
}

fn bench_decode_packet(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_packet");

    for batch in [1usize, 8, 32].iter() {
        let frame = mold_frame(1, *batch);
        let mut decoder = Decoder::default();
        decoder.add_endpoint(mold_rule());

        group.throughput(Throughput::Elements(*batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, _| {
            b.iter(|| {
                let packet = decoder.decode(LayerType::Ethernet, black_box(&frame));
                packet.len()
            });
        });
    }
    group.finish();
}

fn bench_decode_message(c: &mut Criterion) {
    let add = itto_add(42);
    let mut msg = itto::Message::default();

    c.bench_function("itto_add_order", |b| {
        b.iter(|| msg.decode(black_box(&add)))
    });
}

fn bench_processors(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");
    let mut source = MemorySource::new();
    for i in 0..1000u64 {
        source.push(mold_frame(1 + i * 8, 8), Duration::from_micros(i));
    }
    group.throughput(Throughput::Elements(8000));

    group.bench_function("reusing", |b| {
        let mut processor = ReusingProcessor::default();
        processor.add_endpoint(mold_rule());
        b.iter(|| {
            source.rewind();
            let mut count = Count(0);
            processor.run(&mut source, &mut count).unwrap();
            count.0
        });
    });

    group.bench_function("copying", |b| {
        let mut processor = CopyingProcessor::new();
        processor.add_endpoint(mold_rule());
        b.iter(|| {
            source.rewind();
            let mut count = Count(0);
            processor.run(&mut source, &mut count).unwrap();
            count.0
        });
    });
    group.finish();
}

criterion_group!(benches, bench_decode_packet, bench_decode_message, bench_processors);
criterion_main!(benches);
