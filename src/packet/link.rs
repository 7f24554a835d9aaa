/// Ethernet, 802.1Q, IPv4, UDP and TCP headers
///
/// Only what the feeds need: no options parsing, no reassembly. Every layer
/// bounds its payload by the length fields so link padding never reaches the
/// session decoders.

use super::{ensure, DecodeError, DecodeResult, LayerType, NextLayers, Reader, Transport};
use byteorder::BigEndian;
use std::net::Ipv4Addr;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_VLAN: u16 = 0x8100;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

const ETHERNET_HEADER: usize = 14;
const DOT1Q_HEADER: usize = 4;
const IPV4_MIN_HEADER: usize = 20;
const UDP_HEADER: usize = 8;
const TCP_MIN_HEADER: usize = 20;

fn next_for_ethertype(ethertype: u16) -> DecodeResult<LayerType> {
    match ethertype {
        ETHERTYPE_IPV4 => Ok(LayerType::Ipv4),
        ETHERTYPE_VLAN => Ok(LayerType::Dot1Q),
        other => Err(DecodeError::UnsupportedEtherType(other)),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EthernetLayer {
    pub dst: [u8; 6],
    pub src: [u8; 6],
    pub ethertype: u16,
}

impl EthernetLayer {
    pub fn decode(&mut self, data: &[u8], next: &mut NextLayers<'_>) -> DecodeResult<()> {
        ensure(data, ETHERNET_HEADER)?;
        let mut r = Reader::<BigEndian>::new(data);
        self.dst = r.bytes()?;
        self.src = r.bytes()?;
        self.ethertype = r.u16()?;
        next.push(next_for_ethertype(self.ethertype)?, ETHERNET_HEADER..data.len());
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dot1QLayer {
    pub priority: u8,
    pub vlan_id: u16,
    pub ethertype: u16,
}

impl Dot1QLayer {
    pub fn decode(&mut self, data: &[u8], next: &mut NextLayers<'_>) -> DecodeResult<()> {
        ensure(data, DOT1Q_HEADER)?;
        let mut r = Reader::<BigEndian>::new(data);
        let tci = r.u16()?;
        self.priority = (tci >> 13) as u8;
        self.vlan_id = tci & 0x0fff;
        self.ethertype = r.u16()?;
        next.push(next_for_ethertype(self.ethertype)?, DOT1Q_HEADER..data.len());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Layer {
    pub header_len: usize,
    pub total_len: usize,
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

impl Default for Ipv4Layer {
    fn default() -> Self {
        Ipv4Layer {
            header_len: 0,
            total_len: 0,
            protocol: 0,
            src: Ipv4Addr::UNSPECIFIED,
            dst: Ipv4Addr::UNSPECIFIED,
        }
    }
}

impl Ipv4Layer {
    pub fn decode(&mut self, data: &[u8], next: &mut NextLayers<'_>) -> DecodeResult<()> {
        ensure(data, IPV4_MIN_HEADER)?;
        let mut r = Reader::<BigEndian>::new(data);
        let vihl = r.u8()?;
        if vihl >> 4 != 4 {
            return Err(DecodeError::UnsupportedIpVersion(vihl >> 4));
        }
        self.header_len = ((vihl & 0x0f) as usize) * 4;
        r.skip(1)?; // dscp/ecn
        self.total_len = r.u16()? as usize;
        r.skip(2)?; // identification
        let frag = r.u16()?;
        r.skip(1)?; // ttl
        self.protocol = r.u8()?;
        r.skip(2)?; // checksum
        self.src = Ipv4Addr::from(r.bytes::<4>()?);
        self.dst = Ipv4Addr::from(r.bytes::<4>()?);

        if self.header_len < IPV4_MIN_HEADER || self.total_len < self.header_len {
            return Err(DecodeError::BadLength(self.total_len));
        }
        if self.total_len > data.len() {
            return Err(DecodeError::TruncatedMessage {
                declared: self.total_len,
                actual: data.len(),
            });
        }
        // more-fragments flag or a non-zero offset
        if frag & 0x3fff != 0 {
            return Err(DecodeError::Fragmented);
        }
        let payload = self.header_len..self.total_len;
        match self.protocol {
            IPPROTO_UDP => next.push(LayerType::Udp, payload),
            IPPROTO_TCP => next.push(LayerType::Tcp, payload),
            other => return Err(DecodeError::UnsupportedIpProtocol(other)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UdpLayer {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16,
}

impl UdpLayer {
    pub fn decode(&mut self, data: &[u8], next: &mut NextLayers<'_>) -> DecodeResult<()> {
        ensure(data, UDP_HEADER)?;
        let mut r = Reader::<BigEndian>::new(data);
        self.src_port = r.u16()?;
        self.dst_port = r.u16()?;
        self.length = r.u16()?;
        let len = self.length as usize;
        if len < UDP_HEADER {
            return Err(DecodeError::BadLength(len));
        }
        if len > data.len() {
            return Err(DecodeError::TruncatedMessage {
                declared: len,
                actual: data.len(),
            });
        }
        if len > UDP_HEADER {
            next.push_transport(Transport::Udp, self.src_port, self.dst_port, UDP_HEADER..len);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TcpLayer {
    pub src_port: u16,
    pub dst_port: u16,
    pub sequence: u32,
    pub header_len: usize,
    pub flags: u8,
}

impl TcpLayer {
    pub fn decode(&mut self, data: &[u8], next: &mut NextLayers<'_>) -> DecodeResult<()> {
        ensure(data, TCP_MIN_HEADER)?;
        let mut r = Reader::<BigEndian>::new(data);
        self.src_port = r.u16()?;
        self.dst_port = r.u16()?;
        self.sequence = r.u32()?;
        r.skip(4)?; // ack
        self.header_len = ((r.u8()? >> 4) as usize) * 4;
        self.flags = r.u8()?;
        if self.header_len < TCP_MIN_HEADER {
            return Err(DecodeError::BadLength(self.header_len));
        }
        ensure(data, self.header_len)?;
        if data.len() > self.header_len {
            next.push_transport(Transport::Tcp, self.src_port, self.dst_port, self.header_len..data.len());
        }
        Ok(())
    }
}
