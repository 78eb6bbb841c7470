//! Ordered outbound queue.

use std::collections::BTreeMap;
use std::sync::Mutex;
use wirelink_protocol::WireFrame;

/// Outcome of taking the next frame to write.
pub(crate) enum PopOutcome {
    /// The next sequence is ready; write it.
    Frame(WireFrame),
    /// The next sequence was abandoned at admission; move on.
    Skip,
    /// Nothing contiguous to write; the dispatcher slot has been released.
    Idle,
}

/// Preserves caller-submission order across concurrent sends.
///
/// Sequences (and correlation ids, which must ascend with them on the wire)
/// are claimed together on entry to `send`. Prepared frames are inserted at
/// their sequence; a sequence whose call failed admission is inserted as an
/// abandonment marker so later sequences are not stalled behind the gap. The
/// single-flight dispatcher drains strictly contiguous sequences.
pub(crate) struct SendQueue {
    state: Mutex<QueueState>,
}

struct QueueState {
    entries: BTreeMap<u64, Option<WireFrame>>,
    next_seq: u64,
    next_correlation: u32,
    next_to_send: u64,
    dispatching: bool,
    closed: bool,
}

impl SendQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                entries: BTreeMap::new(),
                next_seq: 0,
                // Correlation ids start at 1 so 0 can serve as the read
                // loop's "nothing delivered yet" high-water mark.
                next_correlation: 1,
                next_to_send: 0,
                dispatching: false,
                closed: false,
            }),
        }
    }

    /// Claims the next sequence and correlation id as one atomic step.
    pub(crate) fn allocate(&self) -> (u64, u32) {
        let mut state = self.state.lock().unwrap();
        let seq = state.next_seq;
        state.next_seq += 1;
        let correlation = state.next_correlation;
        state.next_correlation = state.next_correlation.wrapping_add(1);
        (seq, correlation)
    }

    /// Inserts a prepared frame at its sequence. Returns false once the
    /// queue is closed (teardown already failed the call's slot).
    pub(crate) fn insert(&self, seq: u64, frame: WireFrame) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return false;
        }
        state.entries.insert(seq, Some(frame));
        true
    }

    /// Marks a claimed sequence as never-to-arrive.
    pub(crate) fn abandon(&self, seq: u64) {
        let mut state = self.state.lock().unwrap();
        if !state.closed {
            state.entries.insert(seq, None);
        }
    }

    /// Claims the dispatcher slot. Only one dispatcher runs at a time.
    pub(crate) fn try_begin_dispatch(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.dispatching || state.closed {
            return false;
        }
        state.dispatching = true;
        true
    }

    /// Takes the next contiguous sequence. Releasing the dispatcher slot on
    /// [`PopOutcome::Idle`] happens under the same lock as the emptiness
    /// check, so a concurrent insert either lands before the check or
    /// observes the released slot and starts a new dispatcher.
    pub(crate) fn pop_next(&self) -> PopOutcome {
        let mut state = self.state.lock().unwrap();
        let next = state.next_to_send;
        match state.entries.remove(&next) {
            Some(entry) => {
                state.next_to_send = next + 1;
                match entry {
                    Some(frame) => PopOutcome::Frame(frame),
                    None => PopOutcome::Skip,
                }
            }
            None => {
                state.dispatching = false;
                PopOutcome::Idle
            }
        }
    }

    /// Drops all queued frames and refuses further inserts.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.entries.clear();
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }
}
