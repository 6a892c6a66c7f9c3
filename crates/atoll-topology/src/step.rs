//! Transaction steps.
//!
//! A topology change walks a closed set of steps. The forward path carries
//! the ring from the old layout to the new one; the abort path is the
//! reverse sequence restoring the pre-change ring. Each step is durably
//! recorded on the transaction row, so any node can resume the machine from
//! wherever the previous coordinator stopped.

use std::fmt::{self, Display};

/// One step of a topology change.
///
/// Forward order: `Lock → MakeRing → AdvertiseRing → BeforeStreaming →
/// Streaming → AfterStreaming → UseOnlyNew → Cleanup → OnlyNewRing →
/// Unlock`.
///
/// Abort order: `AbortReadOld → AbortStopStreaming → AbortUseOnlyOld →
/// AbortCleanup → AbortOldRing → Unlock`, with `AbortLock → Unlock` as the
/// entry for a change still acquiring the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Acquire the global ring lock for this transaction.
    Lock,

    /// Compute the transitional ring and durably save it as the intent.
    MakeRing,

    /// Replicate the intent mutation to all participants.
    AdvertiseRing,

    /// Move every participant to write-both / read-old.
    BeforeStreaming,

    /// Read the table set, then stream data for those tables.
    Streaming,

    /// Move every participant to write-both / read-new.
    AfterStreaming,

    /// Move every participant to read and write the new ring only.
    UseOnlyNew,

    /// Old-ring replicas drop data they no longer own.
    Cleanup,

    /// Replicate the collapsed post-transition ring.
    OnlyNewRing,

    /// Release the ring lock and remove the transaction record. Terminal.
    Unlock,

    /// Invalidate any in-flight lock acquisition attempt.
    AbortLock,

    /// Return reads to the old ring (reverses `AfterStreaming`).
    AbortReadOld,

    /// Stop the streaming subsystem.
    AbortStopStreaming,

    /// Return reads and writes to the old ring only.
    AbortUseOnlyOld,

    /// New-ring replicas drop data streamed to them before the abort.
    AbortCleanup,

    /// Replicate the collapsed pre-transition ring.
    AbortOldRing,
}

impl Step {
    /// The stable tag stored in the transaction row.
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Lock => "lock",
            Step::MakeRing => "make_ring",
            Step::AdvertiseRing => "advertise_ring",
            Step::BeforeStreaming => "before_streaming",
            Step::Streaming => "streaming",
            Step::AfterStreaming => "after_streaming",
            Step::UseOnlyNew => "use_only_new",
            Step::Cleanup => "cleanup",
            Step::OnlyNewRing => "only_new_ring",
            Step::Unlock => "unlock",
            Step::AbortLock => "abort_lock",
            Step::AbortReadOld => "abort_read_old",
            Step::AbortStopStreaming => "abort_stop_streaming",
            Step::AbortUseOnlyOld => "abort_use_only_old",
            Step::AbortCleanup => "abort_cleanup",
            Step::AbortOldRing => "abort_old_ring",
        }
    }

    /// Parses a stored tag.
    pub fn parse(tag: &str) -> Option<Step> {
        Some(match tag {
            "lock" => Step::Lock,
            "make_ring" => Step::MakeRing,
            "advertise_ring" => Step::AdvertiseRing,
            "before_streaming" => Step::BeforeStreaming,
            "streaming" => Step::Streaming,
            "after_streaming" => Step::AfterStreaming,
            "use_only_new" => Step::UseOnlyNew,
            "cleanup" => Step::Cleanup,
            "only_new_ring" => Step::OnlyNewRing,
            "unlock" => Step::Unlock,
            "abort_lock" => Step::AbortLock,
            "abort_read_old" => Step::AbortReadOld,
            "abort_stop_streaming" => Step::AbortStopStreaming,
            "abort_use_only_old" => Step::AbortUseOnlyOld,
            "abort_cleanup" => Step::AbortCleanup,
            "abort_old_ring" => Step::AbortOldRing,
            _ => return None,
        })
    }

    /// Where an abort of a transaction currently at this step enters the
    /// reverse sequence. `None` past the point of no return: once reads
    /// have left the old ring for good, the forward path must complete.
    pub fn abort_entry(self) -> Option<Step> {
        match self {
            Step::Lock => Some(Step::AbortLock),
            Step::MakeRing => Some(Step::Unlock),
            Step::AdvertiseRing => Some(Step::AbortOldRing),
            Step::BeforeStreaming => Some(Step::AbortCleanup),
            Step::Streaming => Some(Step::AbortStopStreaming),
            Step::AfterStreaming => Some(Step::AbortReadOld),
            Step::UseOnlyNew
            | Step::Cleanup
            | Step::OnlyNewRing
            | Step::Unlock
            | Step::AbortLock
            | Step::AbortReadOld
            | Step::AbortStopStreaming
            | Step::AbortUseOnlyOld
            | Step::AbortCleanup
            | Step::AbortOldRing => None,
        }
    }
}

impl Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const ALL: [Step; 16] = [
        Step::Lock,
        Step::MakeRing,
        Step::AdvertiseRing,
        Step::BeforeStreaming,
        Step::Streaming,
        Step::AfterStreaming,
        Step::UseOnlyNew,
        Step::Cleanup,
        Step::OnlyNewRing,
        Step::Unlock,
        Step::AbortLock,
        Step::AbortReadOld,
        Step::AbortStopStreaming,
        Step::AbortUseOnlyOld,
        Step::AbortCleanup,
        Step::AbortOldRing,
    ];

    #[test]
    fn tags_roundtrip() {
        for step in ALL {
            assert_eq!(Step::parse(step.as_str()), Some(step));
        }
        assert_eq!(Step::parse("no_such_step"), None);
    }

    #[test_case(Step::Lock, Some(Step::AbortLock))]
    #[test_case(Step::MakeRing, Some(Step::Unlock))]
    #[test_case(Step::AdvertiseRing, Some(Step::AbortOldRing))]
    #[test_case(Step::BeforeStreaming, Some(Step::AbortCleanup))]
    #[test_case(Step::Streaming, Some(Step::AbortStopStreaming))]
    #[test_case(Step::AfterStreaming, Some(Step::AbortReadOld))]
    #[test_case(Step::UseOnlyNew, None)]
    #[test_case(Step::Cleanup, None)]
    #[test_case(Step::OnlyNewRing, None)]
    #[test_case(Step::Unlock, None)]
    fn abort_entries(step: Step, expected: Option<Step>) {
        assert_eq!(step.abort_entry(), expected);
    }

    #[test]
    fn abort_steps_cannot_be_aborted_again() {
        for step in [
            Step::AbortLock,
            Step::AbortReadOld,
            Step::AbortStopStreaming,
            Step::AbortUseOnlyOld,
            Step::AbortCleanup,
            Step::AbortOldRing,
        ] {
            assert_eq!(step.abort_entry(), None);
        }
    }
}
