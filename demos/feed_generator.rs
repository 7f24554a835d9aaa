/// Synthetic ITTO feed generator
///
/// Writes a pcap of Ethernet/IPv4/UDP/MoldUDP64 packets carrying realistic
/// ITTO order flow. Replay it with
/// `feed_replay <file> moldudp64:18000`.

use byteorder::{BigEndian, WriteBytesExt};
use feed_sim::PcapWriter;
use rand::Rng;
use std::env;
use std::time::Duration;

const MOLD_PORT: u16 = 18000;
const MAX_BATCH: usize = 8;

struct Resting {
    order_id: u32,
    size: u16,
}

fn frame(seq: u64, msgs: &[Vec<u8>]) -> Vec<u8> {
    let mut mold = b"GENERATED1".to_vec();
    mold.write_u64::<BigEndian>(seq).unwrap();
    mold.write_u16::<BigEndian>(msgs.len() as u16).unwrap();
    for m in msgs {
        mold.write_u16::<BigEndian>(m.len() as u16).unwrap();
        mold.extend_from_slice(m);
    }

    let udp_len = 8 + mold.len();
    let mut f = vec![0x01, 0x00, 0x5e, 0x36, 0x0c, 0x01, 0x02, 0, 0, 0, 0, 0x01, 0x08, 0x00];
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

fn header(msg_type: u8, timestamp: u32) -> Vec<u8> {
    let mut m = vec![msg_type];
    m.write_u32::<BigEndian>(timestamp).unwrap();
    m
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let output_path = if args.len() > 1 {
        args[1].clone()
    } else {
        "/tmp/feed_generator.pcap".to_string()
    };

    let message_count: usize = if args.len() > 2 {
        args[2].parse().unwrap_or(10000)
    } else {
        10000
    };

    let mut writer = PcapWriter::create(&output_path)?;
    let mut rng = rand::thread_rng();
    let mut resting: Vec<Resting> = Vec::new();
    let mut next_order_id = 1000u32;
    let mut sequence = 1u64;
    let mut clock = Duration::from_secs(1_700_000_000);

    println!("Generating {} ITTO messages to {}", message_count, output_path);

    let mut written = 0;
    let mut packets = 0;
    while written < message_count {
        let batch = rng.gen_range(1..=MAX_BATCH).min(message_count - written);
        let mut msgs = Vec::with_capacity(batch);
        let ts = clock.subsec_nanos();

        for _ in 0..batch {
            let action = if resting.is_empty() { 0 } else { rng.gen_range(0u8..4) };
            match action {
                // AddOrder
                0 | 1 => {
                    let order_id = next_order_id;
                    next_order_id += 1;
                    let size = rng.gen_range(1u16..500);
                    let mut m = header(b'a', ts);
                    m.write_u32::<BigEndian>(order_id)?;
                    m.push(if rng.gen_bool(0.5) { b'B' } else { b'S' });
                    m.write_u32::<BigEndian>(rng.gen_range(1u32..=16))?;
                    m.write_u16::<BigEndian>(rng.gen_range(90u16..110) * 5)?;
                    m.write_u16::<BigEndian>(size)?;
                    msgs.push(m);
                    resting.push(Resting { order_id, size });
                }
                // OrderCancel, partial
                2 => {
                    let i = rng.gen_range(0..resting.len());
                    let cancelled = rng.gen_range(1..=resting[i].size);
                    let mut m = header(b'X', ts);
                    m.write_u32::<BigEndian>(resting[i].order_id)?;
                    m.write_u32::<BigEndian>(cancelled as u32)?;
                    msgs.push(m);
                    resting[i].size -= cancelled;
                    if resting[i].size == 0 {
                        resting.swap_remove(i);
                    }
                }
                // SingleSideDelete
                _ => {
                    let gone = resting.swap_remove(rng.gen_range(0..resting.len()));
                    let mut m = header(b'D', ts);
                    m.write_u32::<BigEndian>(gone.order_id)?;
                    msgs.push(m);
                }
            }
        }

        writer.write_packet(&frame(sequence, &msgs), clock)?;
        sequence += msgs.len() as u64;
        written += msgs.len();
        packets += 1;
        clock += Duration::from_micros(rng.gen_range(1..200));
    }
    writer.into_inner()?;

    println!("Wrote {} packets, {} orders resting", packets, resting.len());
    Ok(())
}
