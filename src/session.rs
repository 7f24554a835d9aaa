/// Feed sessions
///
/// A session is one transport flow. Sessions are created the first time a
/// flow carries an application message, are never removed, and are
/// identified by their creation index. Runs see a handful of flows, so
/// lookup is a linear scan.

use crate::gap_detector::GapDetector;
use crate::packet::Transport;
use std::fmt;
use std::net::Ipv4Addr;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SessionId(pub usize);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Flow {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub transport: Transport,
}

impl Default for Flow {
    fn default() -> Self {
        Flow {
            src: Ipv4Addr::UNSPECIFIED,
            dst: Ipv4Addr::UNSPECIFIED,
            src_port: 0,
            dst_port: 0,
            transport: Transport::Udp,
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let proto = match self.transport {
            Transport::Udp => "udp",
            Transport::Tcp => "tcp",
        };
        write!(f, "{} {}:{} -> {}:{}", proto, self.src, self.src_port, self.dst, self.dst_port)
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub flow: Flow,
    pub messages: u64,
    next_sequence: u64,
    gaps: GapDetector,
}

impl Session {
    pub fn gaps(&self) -> &GapDetector {
        &self.gaps
    }

    /// Sequence number the next implicitly numbered message will get
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }
}

/// Outcome of numbering one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequenced {
    pub sequence: u64,
    pub gap: Option<(u64, u64)>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionTable {
    sessions: Vec<Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, flow: &Flow) -> Option<SessionId> {
        self.sessions.iter().find(|s| s.flow == *flow).map(|s| s.id)
    }

    pub fn lookup_or_insert(&mut self, flow: &Flow) -> SessionId {
        if let Some(id) = self.find(flow) {
            return id;
        }
        let id = SessionId(self.sessions.len());
        info!(session = %id, flow = %flow, "new session");
        self.sessions.push(Session {
            id,
            flow: *flow,
            messages: 0,
            next_sequence: 1,
            gaps: GapDetector::new(),
        });
        id
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    /// A login or restart announced the next sequence number.
    pub fn restart(&mut self, id: SessionId, next: u64) {
        if let Some(s) = self.sessions.get_mut(id.0) {
            s.next_sequence = next;
            s.gaps.expect(next);
        }
    }

    /// Number a message. `first` is the framing's sequence of its first
    /// message and `ordinal` the message's position in the framing; without
    /// an explicit sequence the session's running counter continues.
    ///
    /// Returns `None` when a wire sequence runs past `u64::MAX`; such a
    /// message cannot be numbered and leaves the session untouched.
    pub fn sequence(&mut self, id: SessionId, first: Option<u64>, ordinal: usize) -> Option<Sequenced> {
        let s = self.sessions.get_mut(id.0)?;
        let sequence = match first {
            Some(first) => match first.checked_add(ordinal as u64) {
                Some(seq) => seq,
                None => {
                    warn!(session = %id, first, ordinal, "sequence number overflows");
                    return None;
                }
            },
            None => s.next_sequence,
        };
        s.next_sequence = s.next_sequence.max(sequence.saturating_add(1));
        s.messages += 1;

        let gap = s.gaps.process(sequence);
        if let Some((start, end)) = gap {
            warn!(session = %id, start, end, missing = end - start + 1, "sequence gap");
        }
        Some(Sequenced { sequence, gap })
    }

    pub fn total_missing(&self) -> u64 {
        self.sessions.iter().map(|s| s.gaps.total_missing()).sum()
    }

    pub fn total_duplicates(&self) -> u64 {
        self.sessions.iter().map(|s| s.gaps.duplicates()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(port: u16) -> Flow {
        Flow {
            src: Ipv4Addr::new(10, 0, 0, 1),
            dst: Ipv4Addr::new(233, 54, 12, 1),
            src_port: 5000,
            dst_port: port,
            transport: Transport::Udp,
        }
    }

    #[test]
    fn test_sessions_are_dense() {
        let mut table = SessionTable::new();
        assert_eq!(table.lookup_or_insert(&flow(1)), SessionId(0));
        assert_eq!(table.lookup_or_insert(&flow(2)), SessionId(1));
        assert_eq!(table.lookup_or_insert(&flow(1)), SessionId(0));
        assert_eq!(table.len(), 2);
    }

    fn seq(table: &mut SessionTable, id: SessionId, first: Option<u64>, ordinal: usize) -> u64 {
        table.sequence(id, first, ordinal).unwrap().sequence
    }

    #[test]
    fn test_explicit_sequence_plus_ordinal() {
        let mut table = SessionTable::new();
        let id = table.lookup_or_insert(&flow(1));
        assert_eq!(seq(&mut table, id, Some(100), 0), 100);
        assert_eq!(seq(&mut table, id, Some(100), 1), 101);
        let s = table.sequence(id, Some(105), 0).unwrap();
        assert_eq!(s.gap, Some((102, 104)));
        assert_eq!(table.total_missing(), 3);
    }

    #[test]
    fn test_implicit_sequence_follows_login() {
        let mut table = SessionTable::new();
        let id = table.lookup_or_insert(&flow(1));
        table.restart(id, 50);
        assert_eq!(seq(&mut table, id, None, 0), 50);
        assert_eq!(seq(&mut table, id, None, 0), 51);
        assert_eq!(table.get(id).map(|s| s.messages), Some(2));
    }

    #[test]
    fn test_sequence_at_u64_max() {
        let mut table = SessionTable::new();
        let id = table.lookup_or_insert(&flow(1));
        assert_eq!(seq(&mut table, id, Some(u64::MAX), 0), u64::MAX);
        assert_eq!(table.sequence(id, Some(u64::MAX), 1), None);
        assert_eq!(table.get(id).map(|s| (s.messages, s.next_sequence())), Some((1, u64::MAX)));
        assert_eq!(table.sequence(SessionId(7), Some(1), 0), None);
    }
}
