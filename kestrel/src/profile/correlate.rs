//! Shadow-stack correlation.
//!
//! The instrument reports a flat stream of enter/exit events; ordered call
//! semantics are reconstructed here by replaying them against a shadow
//! stack. The stack is owned by the correlator alone and never shared —
//! events for one connection arrive in write order, and the correlator
//! depends on that order for correct pairing.
//!
//! A sampling-mode instrument sends pre-built stack snapshots instead;
//! those need no pairing and pass straight through as [`Sample`] units.

use kestrel_wire::{Event, EventKind, Frame, Record, StackRecord};
use log::debug;

use crate::domain::ProtocolError;

use super::{Call, Sample, Unit};

/// Converts an ordered record stream into completed [`Unit`]s.
///
/// A [`ProtocolError`] is fatal for the stream: the caller must stop
/// feeding this correlator and close its output so downstream stages can
/// flush what was accumulated.
#[derive(Debug, Default)]
pub struct Correlator {
    /// Open invocations, bottom of the target's stack first.
    shadow: Vec<(Frame, i64)>,
    /// Calls emitted so far, for end-of-stream reporting.
    pub calls_emitted: u64,
}

impl Correlator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one record, producing at most one completed unit.
    pub fn apply(&mut self, record: Record) -> Result<Option<Unit>, ProtocolError> {
        match record {
            Record::Event(event) => self.apply_event(event),
            Record::Stack(stack) => Ok(Some(Self::pass_through(stack))),
        }
    }

    fn apply_event(&mut self, event: Event) -> Result<Option<Unit>, ProtocolError> {
        match event.kind {
            EventKind::Enter => {
                self.shadow.push((event.frame, event.timestamp_ns));
                Ok(None)
            }
            EventKind::Exit => {
                let Some((entered, entered_at)) = self.shadow.pop() else {
                    return Err(ProtocolError::UnmatchedExit {
                        function_addr: event.frame.function_addr,
                    });
                };
                if entered != event.frame {
                    // Pairing is positional; a frame mismatch usually means
                    // the instrument inlined or skipped an exit hook.
                    debug!(
                        "exit frame 0x{:x} does not match entered frame 0x{:x}",
                        event.frame.function_addr, entered.function_addr
                    );
                }
                let duration_ns = event.timestamp_ns - entered_at;
                if duration_ns < 0 {
                    return Err(ProtocolError::TimeReversal { duration_ns });
                }

                // Root→leaf path at the moment the call completed: the
                // still-open enters plus the frame that just closed.
                let mut stack: Vec<Frame> = self.shadow.iter().map(|&(f, _)| f).collect();
                stack.push(entered);

                self.calls_emitted += 1;
                Ok(Some(Unit::Call(Call { stack, duration_ns })))
            }
        }
    }

    fn pass_through(stack: StackRecord) -> Unit {
        Unit::Sample(Sample { frames: stack.frames })
    }

    /// Enters still waiting for their exit.
    #[must_use]
    pub fn open_frames(&self) -> usize {
        self.shadow.len()
    }
}

#[cfg(test)]
mod tests {
    use kestrel_wire::SampledFrame;

    use super::*;

    fn enter(fn_addr: u64, cs_addr: u64, t: i64) -> Record {
        Record::Event(Event {
            frame: Frame::new(fn_addr, cs_addr),
            kind: EventKind::Enter,
            timestamp_ns: t,
        })
    }

    fn exit(fn_addr: u64, cs_addr: u64, t: i64) -> Record {
        Record::Event(Event {
            frame: Frame::new(fn_addr, cs_addr),
            kind: EventKind::Exit,
            timestamp_ns: t,
        })
    }

    #[test]
    fn nested_calls_pair_inner_first() {
        let mut corr = Correlator::new();

        assert_eq!(corr.apply(enter(42, 311, 100)).unwrap(), None);
        assert_eq!(corr.apply(enter(7, 42, 150)).unwrap(), None);

        let inner = corr.apply(exit(7, 42, 200)).unwrap().expect("inner call");
        assert_eq!(
            inner,
            Unit::Call(Call {
                stack: vec![Frame::new(42, 311), Frame::new(7, 42)],
                duration_ns: 50,
            })
        );

        let outer = corr.apply(exit(42, 311, 250)).unwrap().expect("outer call");
        assert_eq!(outer, Unit::Call(Call { stack: vec![Frame::new(42, 311)], duration_ns: 150 }));

        assert_eq!(corr.open_frames(), 0);
        assert_eq!(corr.calls_emitted, 2);
    }

    #[test]
    fn one_call_per_exit_for_well_nested_streams() {
        let mut corr = Correlator::new();
        let records = [
            enter(1, 0, 10),
            enter(2, 1, 20),
            exit(2, 1, 30),
            enter(3, 1, 40),
            exit(3, 1, 50),
            exit(1, 0, 60),
        ];
        let mut calls = 0;
        for rec in records {
            if corr.apply(rec).unwrap().is_some() {
                calls += 1;
            }
        }
        assert_eq!(calls, 3);
    }

    #[test]
    fn exit_on_empty_stack_is_fatal() {
        let mut corr = Correlator::new();
        let err = corr.apply(exit(42, 311, 100)).unwrap_err();
        assert!(matches!(err, ProtocolError::UnmatchedExit { function_addr: 42 }));
    }

    #[test]
    fn reversed_timestamps_never_yield_a_negative_call() {
        let mut corr = Correlator::new();
        corr.apply(enter(42, 311, 500)).unwrap();
        let err = corr.apply(exit(42, 311, 400)).unwrap_err();
        assert!(matches!(err, ProtocolError::TimeReversal { duration_ns: -100 }));
        assert_eq!(corr.calls_emitted, 0);
    }

    #[test]
    fn stack_records_pass_through_as_samples() {
        let mut corr = Correlator::new();
        let frames = vec![
            SampledFrame { frame: Frame::new(1, 0), ncalls: 4 },
            SampledFrame { frame: Frame::new(2, 1), ncalls: 0 },
        ];
        let unit = corr
            .apply(Record::Stack(StackRecord { frames: frames.clone() }))
            .unwrap()
            .expect("sample");
        assert_eq!(unit, Unit::Sample(Sample { frames }));
    }

    #[test]
    fn exit_pairs_positionally_even_on_frame_mismatch() {
        let mut corr = Correlator::new();
        corr.apply(enter(42, 311, 100)).unwrap();
        // Exit names a different frame; the open enter still closes.
        let unit = corr.apply(exit(99, 0, 180)).unwrap().expect("call");
        assert_eq!(unit, Unit::Call(Call { stack: vec![Frame::new(42, 311)], duration_ns: 80 }));
    }
}
