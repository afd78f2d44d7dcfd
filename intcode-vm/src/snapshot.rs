//! # Machine Snapshots
//!
//! A [`Snapshot`] is the complete state of a [`Machine`] at a suspension
//! point: pointer, relative base, every non-zero memory cell and every input
//! still queued. Restoring one yields a machine whose future pulls are
//! indistinguishable from the snapshotted machine's.
//!
//! The persisted form is JSON:
//!
//! ```json
//! {"idx":2,"relative_base":0,"memory":[[0,42],[2,3],[4,99]],"inputs":[],"state":"running"}
//! ```

use crate::error::{Error, Result};
use crate::machine::{ExecutionState, Machine};
use serde::{Deserialize, Serialize};

/// Serializable machine state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub idx: i64,
    pub relative_base: i64,
    /// `(address, value)` pairs in address order; zero cells omitted
    pub memory: Vec<(i64, i64)>,
    /// Unconsumed inputs, front first
    pub inputs: Vec<i64>,
    #[serde(default)]
    pub state: ExecutionState,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            Error::serialization_failed(format!("failed to encode snapshot: {}", e))
                .with_operation("snapshot::to_json")
                .set_source(e)
        })
    }

    pub fn from_json(blob: &str) -> Result<Self> {
        serde_json::from_str(blob).map_err(|e| {
            Error::serialization_failed(format!("failed to decode snapshot: {}", e))
                .with_operation("snapshot::from_json")
                .set_source(e)
        })
    }
}

impl Machine {
    /// Capture the full machine state
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            idx: self.idx,
            relative_base: self.relative_base,
            memory: self.memory.non_default().collect(),
            inputs: self.inputs.iter().copied().collect(),
            state: self.state,
        }
    }

    /// Rebuild a machine from a snapshot. Duplicate addresses keep the last
    /// value listed.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            memory: snapshot.memory.into_iter().collect(),
            idx: snapshot.idx,
            relative_base: snapshot.relative_base,
            inputs: snapshot.inputs.into_iter().collect(),
            state: snapshot.state,
        }
    }

    /// Encode the machine as an opaque, self-contained blob
    pub fn serialize(&self) -> Result<String> {
        self.snapshot().to_json()
    }

    /// Restore a machine from a blob produced by [`Machine::serialize`]
    pub fn deserialize(blob: &str) -> Result<Self> {
        Snapshot::from_json(blob).map(Self::from_snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::machine::strategies::word;
    use crate::machine::ExecutionResult;
    use proptest::prelude::*;

    #[test]
    fn test_snapshot_at_suspension() {
        let mut machine = Machine::new(vec![3, 0, 3, 0, 99], vec![42]);
        assert!(matches!(machine.resume(), ExecutionResult::NeedsInput));

        let snapshot = machine.snapshot();
        assert_eq!(snapshot.idx, 2);
        assert_eq!(snapshot.memory, vec![(0, 42), (2, 3), (4, 99)]);
        assert!(snapshot.inputs.is_empty());
        assert_eq!(snapshot.state, ExecutionState::Running);
    }

    #[test]
    fn test_resume_after_restore() {
        let mut machine = Machine::new(vec![3, 0, 3, 0, 4, 0, 99], vec![42]);
        assert!(matches!(machine.resume(), ExecutionResult::NeedsInput));

        let blob = machine.serialize().unwrap();
        drop(machine);

        let mut restored = Machine::deserialize(&blob).unwrap();
        restored.append_input([43]);
        assert!(matches!(restored.resume(), ExecutionResult::Output(43)));
        assert!(matches!(restored.resume(), ExecutionResult::Halted));
        assert_eq!(restored.memory().get(0), 43);
    }

    #[test]
    fn test_keeps_queued_inputs_and_relative_base() {
        // ARB 7, OUT 1, then two INs; one input too many is queued
        let mut machine = Machine::new(vec![109, 7, 104, 1, 3, 20, 3, 21, 99], vec![5, 6, 7]);
        assert!(matches!(machine.resume(), ExecutionResult::Output(1)));

        let restored = Machine::deserialize(&machine.serialize().unwrap()).unwrap();
        assert_eq!(restored.relative_base(), 7);
        assert_eq!(restored.pending_inputs().collect::<Vec<_>>(), vec![5, 6, 7]);
        assert_eq!(restored, machine);
    }

    #[test]
    fn test_negative_cells_survive() {
        let mut machine = Machine::new(vec![109, -5, 21101, 4, 5, 0, 3, 0, 99], vec![]);
        assert!(matches!(machine.resume(), ExecutionResult::NeedsInput));

        let restored = Machine::deserialize(&machine.serialize().unwrap()).unwrap();
        assert_eq!(restored.memory().get(-5), 9);
        assert_eq!(restored.relative_base(), -5);
    }

    #[test]
    fn test_halted_state_survives() {
        let mut machine = Machine::new(vec![99], vec![]);
        assert!(matches!(machine.resume(), ExecutionResult::Halted));

        let mut restored = Machine::deserialize(&machine.serialize().unwrap()).unwrap();
        assert_eq!(restored.state(), ExecutionState::Halted);
        assert!(matches!(restored.resume(), ExecutionResult::Failed(_)));
    }

    #[test]
    fn test_state_defaults_to_running() {
        let blob = r#"{"idx":0,"relative_base":0,"memory":[[0,104],[1,5],[2,99]],"inputs":[]}"#;
        let mut machine = Machine::deserialize(blob).unwrap();
        assert!(matches!(machine.resume(), ExecutionResult::Output(5)));
    }

    #[test]
    fn test_malformed_blob() {
        let err = Machine::deserialize("{\"idx\": \"zero\"}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SerializationFailed);

        let err = Machine::deserialize("not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SerializationFailed);
    }

    /// Reads a value, adds it to a running total, outputs the total and the
    /// cell just past the relative base, bumps the base, loops forever.
    const ACCUMULATOR: [i64; 15] = [3, 100, 1, 100, 101, 101, 4, 101, 109, 1, 204, 99, 1105, 1, 0];

    fn drive(machine: &mut Machine, chunks: &[Vec<i64>], restore_at: &[bool]) -> Vec<i64> {
        let mut outputs = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if restore_at.get(i).copied().unwrap_or(false) {
                *machine = Machine::deserialize(&machine.serialize().unwrap()).unwrap();
            }
            machine.append_input(chunk.iter().copied());
            let summary = machine.run_to_end();
            assert!(matches!(summary.end, ExecutionResult::NeedsInput));
            outputs.extend(summary.outputs);
        }
        outputs
    }

    /// Pull outcomes of a run, round-tripping the machine through JSON
    /// before each pull flagged in `restore_at`. Pulls are bounded so
    /// programs that never halt still end.
    fn trace(
        program: &[i64],
        inputs: &[i64],
        feed: &[i64],
        restore_at: &[bool],
    ) -> (Vec<String>, Snapshot) {
        let mut machine = Machine::new(program.to_vec(), inputs.to_vec());
        let mut feed = feed.iter().copied();
        let mut seen = Vec::new();

        for pull in 0..16 {
            if restore_at.get(pull).copied().unwrap_or(false) {
                machine = Machine::deserialize(&machine.serialize().unwrap()).unwrap();
            }
            match machine.pull(300) {
                None => {
                    seen.push("budget".to_string());
                    break;
                }
                Some(ExecutionResult::Output(value)) => seen.push(value.to_string()),
                Some(ExecutionResult::NeedsInput) => {
                    seen.push("needs_input".to_string());
                    match feed.next() {
                        Some(value) => machine.append_input([value]),
                        None => break,
                    }
                }
                Some(ExecutionResult::Halted) => {
                    seen.push("halted".to_string());
                    break;
                }
                Some(ExecutionResult::Failed(err)) => {
                    seen.push(err.kind().to_string());
                    break;
                }
            }
        }

        (seen, machine.snapshot())
    }

    proptest! {
        #[test]
        fn restored_machine_matches_live_machine(
            chunks in prop::collection::vec(prop::collection::vec(-1000i64..1000, 0..4), 1..8),
            restore_at in prop::collection::vec(any::<bool>(), 0..8),
        ) {
            let mut live = Machine::new(ACCUMULATOR.to_vec(), vec![]);
            let mut restored = Machine::new(ACCUMULATOR.to_vec(), vec![]);

            let expected = drive(&mut live, &chunks, &[]);
            let actual = drive(&mut restored, &chunks, &restore_at);

            prop_assert_eq!(expected, actual);
            prop_assert_eq!(live.snapshot(), restored.snapshot());
        }

        #[test]
        fn restore_at_any_pull_matches_live_run(
            program in prop::collection::vec(word(), 1..40),
            inputs in prop::collection::vec(-100i64..100, 0..3),
            feed in prop::collection::vec(-100i64..100, 0..4),
            restore_at in prop::collection::vec(any::<bool>(), 0..16),
        ) {
            let live = trace(&program, &inputs, &feed, &[]);
            let restored = trace(&program, &inputs, &feed, &restore_at);
            prop_assert_eq!(live, restored);
        }
    }
}
