use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;
const RECEIVE_WINDOW: u32 = 256;

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[derive(Debug, Clone)]
pub struct PendingFrame {
    pub sequence: u32,
    pub bytes: Vec<u8>,
    pub first_sent: Instant,
    pub last_sent: Instant,
    pub attempts: u32,
}

/// Outgoing half of the reliable channel: numbers frames and keeps them
/// until the peer acknowledges them.
#[derive(Debug)]
pub struct ReliableSender {
    next_sequence: u32,
    pending: VecDeque<PendingFrame>,
    srtt: f32,
    rtt_var: f32,
}

impl Default for ReliableSender {
    fn default() -> Self {
        Self::new()
    }
}

impl ReliableSender {
    pub fn new() -> Self {
        Self {
            next_sequence: 0,
            pending: VecDeque::new(),
            srtt: 100.0,
            rtt_var: 50.0,
        }
    }

    pub fn next_sequence(&mut self) -> u32 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        sequence
    }

    pub fn track(&mut self, sequence: u32, bytes: Vec<u8>) {
        let now = Instant::now();
        self.pending.push_back(PendingFrame {
            sequence,
            bytes,
            first_sent: now,
            last_sent: now,
            attempts: 1,
        });
    }

    /// Returns false for acks of frames that are no longer pending.
    pub fn acknowledge(&mut self, sequence: u32) -> bool {
        let Some(index) = self.pending.iter().position(|p| p.sequence == sequence) else {
            return false;
        };
        let Some(frame) = self.pending.remove(index) else {
            return false;
        };

        // Karn: resent frames give ambiguous samples.
        if frame.attempts == 1 {
            let rtt = frame.first_sent.elapsed().as_secs_f32() * 1000.0;
            self.update_rtt(rtt);
        }
        true
    }

    /// Frames whose last transmission is older than `interval`. Their
    /// send time and attempt count are bumped as if already resent.
    pub fn due_for_resend(&mut self, now: Instant, interval: Duration) -> Vec<Vec<u8>> {
        let mut due = Vec::new();
        for frame in &mut self.pending {
            if now.duration_since(frame.last_sent) >= interval {
                frame.last_sent = now;
                frame.attempts += 1;
                due.push(frame.bytes.clone());
            }
        }
        due
    }

    fn update_rtt(&mut self, rtt: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        let diff = (rtt - self.srtt).abs();
        self.rtt_var = (1.0 - BETA) * self.rtt_var + BETA * diff;
        self.srtt = (1.0 - ALPHA) * self.srtt + ALPHA * rtt;
    }

    pub fn srtt(&self) -> f32 {
        self.srtt
    }

    pub fn rtt_var(&self) -> f32 {
        self.rtt_var
    }

    pub fn unacked_count(&self) -> usize {
        self.pending.len()
    }
}

/// Incoming half of the reliable channel. Frames that arrive early are
/// held back until the gap before them fills.
#[derive(Debug, Default)]
pub struct ReliableReceiver {
    expected: u32,
    buffered: BTreeMap<u32, Vec<u8>>,
}

impl ReliableReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the payloads that became deliverable, in order. Duplicates
    /// and frames too far ahead of the window yield nothing.
    pub fn accept(&mut self, sequence: u32, payload: Vec<u8>) -> Vec<Vec<u8>> {
        if sequence != self.expected {
            let ahead = sequence.wrapping_sub(self.expected);
            if sequence_greater_than(sequence, self.expected) && ahead < RECEIVE_WINDOW {
                self.buffered.entry(sequence).or_insert(payload);
            }
            return Vec::new();
        }

        let mut delivered = vec![payload];
        self.expected = self.expected.wrapping_add(1);
        while let Some(next) = self.buffered.remove(&self.expected) {
            delivered.push(next);
            self.expected = self.expected.wrapping_add(1);
        }
        delivered
    }

    pub fn buffered_count(&self) -> usize {
        self.buffered.len()
    }
}

/// Drops anything not newer than the last accepted sequence.
#[derive(Debug, Default)]
pub struct SequencedReceiver {
    latest: Option<u32>,
}

impl SequencedReceiver {
    pub fn accept(&mut self, sequence: u32) -> bool {
        match self.latest {
            Some(latest) if !sequence_greater_than(sequence, latest) => false,
            _ => {
                self.latest = Some(sequence);
                true
            }
        }
    }
}
