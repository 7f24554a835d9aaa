//! Hand-built wire packets shared by the integration tests
#![allow(dead_code)]

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

pub const SRC: [u8; 4] = [10, 0, 0, 1];
pub const GROUP: [u8; 4] = [233, 54, 12, 1];

fn ipv4(protocol: u8, src: [u8; 4], dst: [u8; 4], transport: &[u8]) -> Vec<u8> {
    let total = 20 + transport.len();
    let mut f = vec![0x01, 0x00, 0x5e, 0x36, 0x0c, 0x01, 0x02, 0, 0, 0, 0, 0x01];
    f.write_u16::<BigEndian>(0x0800).unwrap();
    f.extend_from_slice(&[0x45, 0]);
    f.write_u16::<BigEndian>(total as u16).unwrap();
    f.extend_from_slice(&[0, 0, 0x40, 0, 64, protocol, 0, 0]);
    f.extend_from_slice(&src);
    f.extend_from_slice(&dst);
    f.extend_from_slice(transport);
    f
}

/// Ethernet + IPv4 + UDP frame
pub fn udp_frame(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut udp = Vec::new();
    udp.write_u16::<BigEndian>(src_port).unwrap();
    udp.write_u16::<BigEndian>(dst_port).unwrap();
    udp.write_u16::<BigEndian>(8 + payload.len() as u16).unwrap();
    udp.write_u16::<BigEndian>(0).unwrap();
    udp.extend_from_slice(payload);
    ipv4(17, SRC, GROUP, &udp)
}

/// Ethernet + IPv4 + TCP frame (20 byte TCP header, PSH|ACK)
pub fn tcp_frame(src_port: u16, dst_port: u16, seq: u32, payload: &[u8]) -> Vec<u8> {
    let mut tcp = Vec::new();
    tcp.write_u16::<BigEndian>(src_port).unwrap();
    tcp.write_u16::<BigEndian>(dst_port).unwrap();
    tcp.write_u32::<BigEndian>(seq).unwrap();
    tcp.write_u32::<BigEndian>(0).unwrap();
    tcp.extend_from_slice(&[0x50, 0x18]);
    tcp.write_u16::<BigEndian>(65535).unwrap();
    tcp.extend_from_slice(&[0, 0, 0, 0]);
    tcp.extend_from_slice(payload);
    ipv4(6, [10, 0, 0, 2], [10, 0, 0, 3], &tcp)
}

pub fn moldudp64(seq: u64, msgs: &[Vec<u8>]) -> Vec<u8> {
    let mut p = b"SESSION001".to_vec();
    p.write_u64::<BigEndian>(seq).unwrap();
    p.write_u16::<BigEndian>(msgs.len() as u16).unwrap();
    for m in msgs {
        p.write_u16::<BigEndian>(m.len() as u16).unwrap();
        p.extend_from_slice(m);
    }
    p
}

pub fn soup_sequenced(msg: &[u8]) -> Vec<u8> {
    let mut p = Vec::new();
    p.write_u16::<BigEndian>(1 + msg.len() as u16).unwrap();
    p.push(b'S');
    p.extend_from_slice(msg);
    p
}

pub fn soup_login_accepted(next_sequence: u64) -> Vec<u8> {
    let mut p = Vec::new();
    p.write_u16::<BigEndian>(31).unwrap();
    p.push(b'A');
    p.extend_from_slice(b"SESSION001");
    p.extend_from_slice(format!("{:>20}", next_sequence).as_bytes());
    p
}

pub fn bsu(seq: u32, msgs: &[Vec<u8>]) -> Vec<u8> {
    let len = 8 + msgs.iter().map(Vec::len).sum::<usize>();
    let mut p = Vec::new();
    p.write_u16::<LittleEndian>(len as u16).unwrap();
    p.push(msgs.len() as u8);
    p.push(1);
    p.write_u32::<LittleEndian>(seq).unwrap();
    for m in msgs {
        p.extend_from_slice(m);
    }
    p
}

/// One Mach application-data packet
pub fn mach(seq: u64, msg: &[u8]) -> Vec<u8> {
    let mut p = Vec::new();
    p.write_u64::<LittleEndian>(seq).unwrap();
    p.write_u16::<LittleEndian>(12 + msg.len() as u16).unwrap();
    p.push(3);
    p.push(1);
    p.extend_from_slice(msg);
    p
}

pub fn sesm_sequenced(seq: u64, msg: &[u8]) -> Vec<u8> {
    let mut p = Vec::new();
    p.write_u16::<LittleEndian>(9 + msg.len() as u16).unwrap();
    p.push(b'S');
    p.write_u64::<LittleEndian>(seq).unwrap();
    p.extend_from_slice(msg);
    p
}

// ITTO (big-endian, compact prices in cents)

pub fn itto_add(order_id: u32, side: u8, option: u32, price_cents: u16, size: u16) -> Vec<u8> {
    let mut m = vec![b'a'];
    m.write_u32::<BigEndian>(0).unwrap();
    m.write_u32::<BigEndian>(order_id).unwrap();
    m.push(side);
    m.write_u32::<BigEndian>(option).unwrap();
    m.write_u16::<BigEndian>(price_cents).unwrap();
    m.write_u16::<BigEndian>(size).unwrap();
    m
}

pub fn itto_executed(order_id: u32, executed: u32) -> Vec<u8> {
    let mut m = vec![b'E'];
    m.write_u32::<BigEndian>(0).unwrap();
    m.write_u32::<BigEndian>(order_id).unwrap();
    m.write_u32::<BigEndian>(executed).unwrap();
    m.write_u32::<BigEndian>(0).unwrap();
    m.write_u32::<BigEndian>(0).unwrap();
    m
}

pub fn itto_cancel(order_id: u32, cancelled: u32) -> Vec<u8> {
    let mut m = vec![b'X'];
    m.write_u32::<BigEndian>(0).unwrap();
    m.write_u32::<BigEndian>(order_id).unwrap();
    m.write_u32::<BigEndian>(cancelled).unwrap();
    m
}

pub fn itto_replace(orig_id: u32, order_id: u32, price_cents: u16, size: u16) -> Vec<u8> {
    let mut m = vec![b'u'];
    m.write_u32::<BigEndian>(0).unwrap();
    m.write_u32::<BigEndian>(orig_id).unwrap();
    m.write_u32::<BigEndian>(order_id).unwrap();
    m.write_u16::<BigEndian>(price_cents).unwrap();
    m.write_u16::<BigEndian>(size).unwrap();
    m
}

/// Compact quote replace: bid half first, then ask
pub fn itto_quote_replace(bid: (u32, u32, u16, u16), ask: (u32, u32, u16, u16)) -> Vec<u8> {
    let mut m = vec![b'k'];
    m.write_u32::<BigEndian>(0).unwrap();
    for (orig_id, order_id, _, _) in [bid, ask] {
        m.write_u32::<BigEndian>(orig_id).unwrap();
        m.write_u32::<BigEndian>(order_id).unwrap();
    }
    for (_, _, price_cents, size) in [bid, ask] {
        m.write_u16::<BigEndian>(price_cents).unwrap();
        m.write_u16::<BigEndian>(size).unwrap();
    }
    m
}

pub fn itto_delete(order_id: u32) -> Vec<u8> {
    let mut m = vec![b'D'];
    m.write_u32::<BigEndian>(0).unwrap();
    m.write_u32::<BigEndian>(order_id).unwrap();
    m
}

pub fn itto_block_delete(order_ids: &[u32]) -> Vec<u8> {
    let mut m = vec![b'Z'];
    m.write_u32::<BigEndian>(0).unwrap();
    m.write_u16::<BigEndian>(order_ids.len() as u16).unwrap();
    for id in order_ids {
        m.write_u32::<BigEndian>(*id).unwrap();
    }
    m
}

pub fn itto_seconds(second: u32) -> Vec<u8> {
    let mut m = vec![b'T'];
    m.write_u32::<BigEndian>(second).unwrap();
    m
}

// PITCH (little-endian, length byte first)

pub fn pitch_add_short(order_id: u64, side: u8, size: u16, symbol: &[u8; 6], price_cents: u16) -> Vec<u8> {
    let mut m = vec![26, 0x22];
    m.write_u32::<LittleEndian>(0).unwrap();
    m.write_u64::<LittleEndian>(order_id).unwrap();
    m.push(side);
    m.write_u16::<LittleEndian>(size).unwrap();
    m.extend_from_slice(symbol);
    m.write_u16::<LittleEndian>(price_cents).unwrap();
    m.push(0);
    m
}

pub fn pitch_reduce_short(order_id: u64, cancelled: u16) -> Vec<u8> {
    let mut m = vec![16, 0x26];
    m.write_u32::<LittleEndian>(0).unwrap();
    m.write_u64::<LittleEndian>(order_id).unwrap();
    m.write_u16::<LittleEndian>(cancelled).unwrap();
    m
}

pub fn pitch_modify_long(order_id: u64, size: u32, price: u64) -> Vec<u8> {
    let mut m = vec![27, 0x27];
    m.write_u32::<LittleEndian>(0).unwrap();
    m.write_u64::<LittleEndian>(order_id).unwrap();
    m.write_u32::<LittleEndian>(size).unwrap();
    m.write_u64::<LittleEndian>(price).unwrap();
    m.push(0);
    m
}

pub fn pitch_delete(order_id: u64) -> Vec<u8> {
    let mut m = vec![14, 0x29];
    m.write_u32::<LittleEndian>(0).unwrap();
    m.write_u64::<LittleEndian>(order_id).unwrap();
    m
}

// TOM (little-endian, compact prices in cents)

pub fn tom_top(msg_type: u8, option: u32, price_cents: u16, size: u16) -> Vec<u8> {
    let mut m = vec![msg_type];
    m.write_u32::<LittleEndian>(0).unwrap();
    m.write_u32::<LittleEndian>(option).unwrap();
    m.write_u16::<LittleEndian>(price_cents).unwrap();
    m.write_u16::<LittleEndian>(size).unwrap();
    m.write_u16::<LittleEndian>(0).unwrap();
    m.push(b' ');
    m
}

pub fn tom_double(option: u32, bid: (u16, u16), ask: (u16, u16)) -> Vec<u8> {
    let mut m = vec![b'd'];
    m.write_u32::<LittleEndian>(0).unwrap();
    m.write_u32::<LittleEndian>(option).unwrap();
    for (price, size) in [bid, ask] {
        m.write_u16::<LittleEndian>(price).unwrap();
        m.write_u16::<LittleEndian>(size).unwrap();
        m.write_u16::<LittleEndian>(0).unwrap();
        m.push(b' ');
    }
    m
}
