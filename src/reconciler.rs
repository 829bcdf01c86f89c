//! Mapping of tool-local probe sequence numbers onto a logical sequence.
//!
//! The probe tool numbers its probes from a small value every time it
//! starts. The logical sequence keeps counting across tool restarts and
//! process restarts: on the first event after a (re)start the tool's
//! numbering is rebased on the last logical sequence number.
//!
//! A tool number can also repeat without a restart. Linux `ping` prints a
//! redirect or error line and then the reply for the same `icmp_seq`, and
//! a reply can arrive after its probe was already reported lost. Those
//! repeats map through the current offset and are reported as already
//! accounted.

/// How far a tool number may fall back and still count as a repeat.
///
/// A larger drop is a tool restart or a wrap of its 16-bit counter.
pub const REORDER_WINDOW: u64 = 64;

/// Per-target sequence reconciliation state.
#[derive(Debug, Clone, Default)]
pub struct SequenceReconciler {
    offset: u64,
    seen_first: bool,
    last_tool_seq: Option<u64>,
}

impl SequenceReconciler {
    /// Create a reconciler that has not seen any event yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current offset added to tool-local sequence numbers.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Forget the current tool numbering; the next event is rebased.
    ///
    /// Called when the probe process is respawned.
    pub fn reset(&mut self) {
        self.seen_first = false;
        self.last_tool_seq = None;
    }

    /// Translate `tool_seq` into a logical sequence number.
    ///
    /// `prior` is the last logical sequence number assigned to the target,
    /// if any. Returns a number strictly greater than `prior`, or `None` when
    /// `tool_seq` repeats a probe that was already accounted.
    pub fn reconcile(&mut self, tool_seq: u64, prior: Option<u64>) -> Option<u64> {
        if let Some(last) = self.last_tool_seq {
            if tool_seq <= last {
                if last - tool_seq <= REORDER_WINDOW {
                    return None;
                }
                self.seen_first = false;
            }
        }

        if !self.seen_first {
            self.offset = prior.unwrap_or(0);
            self.seen_first = true;
        }

        let mut logical = self.offset.saturating_add(tool_seq);
        if let Some(prior) = prior {
            if logical <= prior {
                // Tool numbering started at zero; continue right after prior
                self.offset = prior + 1 - tool_seq;
                logical = prior + 1;
            }
        }

        self.last_tool_seq = Some(tool_seq);
        Some(logical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `tool_seqs` in order, tracking the last logical number like a
    /// ledger does, and return what each one mapped to.
    fn run(r: &mut SequenceReconciler, mut prior: Option<u64>, tool_seqs: &[u64]) -> Vec<Option<u64>> {
        tool_seqs
            .iter()
            .map(|&seq| {
                let logical = r.reconcile(seq, prior);
                if logical.is_some() {
                    prior = logical;
                }
                logical
            })
            .collect()
    }

    #[test]
    fn fresh_start_uses_tool_numbering() {
        let mut r = SequenceReconciler::new();
        assert_eq!(r.reconcile(1, None), Some(1));
        assert_eq!(r.reconcile(2, Some(1)), Some(2));
        assert_eq!(r.offset(), 0);
    }

    #[test]
    fn restart_continues_from_persisted_seq() {
        let mut r = SequenceReconciler::new();
        assert_eq!(r.reconcile(1, Some(50)), Some(51));
        assert_eq!(r.reconcile(2, Some(51)), Some(52));
        assert_eq!(r.offset(), 50);
    }

    #[test]
    fn offset_is_fixed_after_first_event() {
        let mut r = SequenceReconciler::new();
        assert_eq!(r.reconcile(1, Some(50)), Some(51));
        // A skipped tool number still maps through the same offset
        assert_eq!(r.reconcile(5, Some(51)), Some(55));
    }

    #[test]
    fn reset_rebases_on_next_event() {
        let mut r = SequenceReconciler::new();
        run(&mut r, None, &[1, 2, 3]);

        r.reset();
        assert_eq!(r.reconcile(1, Some(3)), Some(4));
    }

    #[test]
    fn repeated_seq_is_already_accounted() {
        let mut r = SequenceReconciler::new();
        let seqs: Vec<u64> = (1..=999).chain([1000, 1000, 1001]).collect();
        let mapped = run(&mut r, None, &seqs);

        // Redirect line then reply for 1000: the second is a repeat
        assert_eq!(mapped[999], Some(1000));
        assert_eq!(mapped[1000], None);
        assert_eq!(mapped[1001], Some(1001));
        assert_eq!(r.offset(), 0);
    }

    #[test]
    fn late_reply_within_window_is_a_repeat() {
        let mut r = SequenceReconciler::new();
        let mapped = run(&mut r, Some(100), &[1, 2, 3, 5, 4, 6]);
        assert_eq!(
            mapped,
            vec![Some(101), Some(102), Some(103), Some(105), None, Some(106)]
        );
    }

    #[test]
    fn large_drop_is_a_tool_restart() {
        let mut r = SequenceReconciler::new();
        let seqs: Vec<u64> = (1..=200).collect();
        run(&mut r, None, &seqs);

        // Tool restarted without the supervisor noticing
        assert_eq!(r.reconcile(1, Some(200)), Some(201));
        assert_eq!(r.reconcile(2, Some(201)), Some(202));
    }

    #[test]
    fn wrap_to_zero_still_increases() {
        let mut r = SequenceReconciler::new();
        assert_eq!(r.reconcile(65535, Some(70000)), Some(135535));
        assert_eq!(r.reconcile(0, Some(135535)), Some(135536));
        assert_eq!(r.reconcile(1, Some(135536)), Some(135537));
    }

    #[test]
    fn first_event_at_zero_after_restart_does_not_repeat() {
        let mut r = SequenceReconciler::new();
        assert_eq!(r.reconcile(0, Some(50)), Some(51));
        assert_eq!(r.reconcile(1, Some(51)), Some(52));
    }
}
