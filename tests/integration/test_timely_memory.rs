// Copyright © 2024 Pathway

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use reteflow_engine::engine::memory::TimelyMemory;
use reteflow_engine::engine::{Diff, Direction, Signed, Timeline, Timestamp};

use super::helpers::{ts, tuple};

fn diff(changes: &[(Direction, u64)]) -> Diff {
    changes
        .iter()
        .map(|(direction, moment)| Signed::new(*direction, ts(*moment)))
        .collect()
}

fn resume_all(memory: &mut TimelyMemory) {
    while let Some(timestamp) = memory.resumable_timestamp() {
        memory.resume_at(timestamp);
    }
}

#[test]
fn test_eager_presence_changes() {
    let mut memory = TimelyMemory::eager();
    let a = tuple(&[1]);

    assert_eq!(memory.put(&a, ts(2)), diff(&[(Direction::Insert, 2)]));
    assert_eq!(
        memory.put(&a, ts(1)),
        diff(&[(Direction::Insert, 1), (Direction::Delete, 2)])
    );
    assert_eq!(memory.timeline(&a), Some(&Timeline::starting_at(ts(1))));
    assert_eq!(memory.multiplicity(&a), 2);

    assert_eq!(
        memory.remove(&a, ts(1)),
        diff(&[(Direction::Delete, 1), (Direction::Insert, 2)])
    );
    assert_eq!(memory.timeline(&a), Some(&Timeline::starting_at(ts(2))));
    assert!(memory.is_present_at_infinity(&a));

    assert_eq!(memory.remove(&a, ts(2)), diff(&[(Direction::Delete, 2)]));
    assert_eq!(memory.timeline(&a), None);
    assert_eq!(memory.count_at_infinity(), 0);
    assert!(memory.is_empty());
}

#[test]
fn test_eager_deletion_after_insertion() {
    let mut memory = TimelyMemory::eager();
    let a = tuple(&[1]);

    memory.put(&a, ts(0));
    assert_eq!(memory.remove(&a, ts(3)), diff(&[(Direction::Delete, 3)]));
    let timeline = memory.timeline(&a).cloned().unwrap_or_default();
    assert!(timeline.is_present_at(ts(2)));
    assert!(!timeline.is_present_at(ts(3)));
    assert!(!memory.is_present_at_infinity(&a));
    assert!(memory.contains(&a));
    assert_eq!(memory.multiplicity(&a), 0);

    assert_eq!(memory.put(&a, ts(1)), diff(&[(Direction::Insert, 3)]));
    assert_eq!(memory.timeline(&a), Some(&Timeline::starting_at(ts(0))));
    assert_eq!(memory.multiplicity(&a), 1);
    assert!(memory.is_present_at_infinity(&a));
}

#[test]
fn test_lazy_memory_defers_work() {
    let mut memory = TimelyMemory::lazy();
    let a = tuple(&[1]);

    assert!(memory.put(&a, ts(1)).is_empty());
    assert!(memory.remove(&a, ts(4)).is_empty());
    assert_eq!(memory.timeline(&a), None);
    assert_eq!(memory.resumable_timestamp(), Some(ts(1)));
    assert_eq!(memory.resumable_tuples().collect::<Vec<_>>(), vec![&a]);

    let diffs = memory.resume_at(ts(1));
    assert_eq!(
        diffs.get(&a),
        Some(&diff(&[(Direction::Insert, 1), (Direction::Delete, 4)]))
    );
    assert_eq!(memory.resumable_timestamp(), Some(ts(4)));
    assert!(memory.resume_at(ts(4)).is_empty());
    assert_eq!(memory.resumable_timestamp(), None);

    let timeline = memory.timeline(&a).cloned().unwrap_or_default();
    assert!(timeline.is_present_at(ts(1)));
    assert!(!timeline.is_present_at(ts(4)));
}

#[test]
fn test_lazy_memory_discards_empty_states() {
    let mut memory = TimelyMemory::lazy();
    let a = tuple(&[1]);
    let b = tuple(&[2]);

    memory.put(&a, ts(1));
    memory.remove(&a, ts(1));
    memory.put(&b, ts(3));
    let diffs = memory.resume_at(ts(3));
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs.get(&b), Some(&diff(&[(Direction::Insert, 3)])));
    assert!(!memory.contains(&a));
    assert!(memory.is_present_at_infinity(&b));
}

#[test]
fn test_lazy_folding_matches_eager() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let mut eager = TimelyMemory::eager();
        let mut lazy = TimelyMemory::lazy();
        let mut interleaved = TimelyMemory::lazy();
        let mut live: Vec<(i64, u64)> = Vec::new();

        for _ in 0..60 {
            if live.is_empty() || rng.random_bool(0.6) {
                let value = rng.random_range(0..4);
                let moment = rng.random_range(0..6);
                let tuple = tuple(&[value]);
                eager.put(&tuple, ts(moment));
                lazy.put(&tuple, ts(moment));
                interleaved.put(&tuple, ts(moment));
                live.push((value, moment));
            } else {
                let (value, inserted_at) = live.swap_remove(rng.random_range(0..live.len()));
                let moment = rng.random_range(inserted_at..6);
                let tuple = tuple(&[value]);
                eager.remove(&tuple, ts(moment));
                lazy.remove(&tuple, ts(moment));
                interleaved.remove(&tuple, ts(moment));
            }
            if rng.random_bool(0.3) {
                if let Some(timestamp) = interleaved.resumable_timestamp() {
                    interleaved.resume_at(timestamp);
                }
            }
        }

        resume_all(&mut lazy);
        resume_all(&mut interleaved);
        assert_eq!(lazy.timelines(), eager.timelines());
        assert_eq!(interleaved.timelines(), eager.timelines());
        for value in 0..4 {
            let tuple = tuple(&[value]);
            assert_eq!(lazy.multiplicity(&tuple), eager.multiplicity(&tuple));
        }
    }
}

#[test]
#[should_panic(expected = "duplicate deletion")]
fn test_eager_duplicate_deletion_panics() {
    let mut memory = TimelyMemory::eager();
    memory.remove(&tuple(&[1]), Timestamp::ZERO);
}

#[test]
#[should_panic(expected = "duplicate deletion")]
fn test_lazy_duplicate_deletion_panics_while_folding() {
    let mut memory = TimelyMemory::lazy();
    memory.remove(&tuple(&[1]), Timestamp::ZERO);
    memory.resume_at(Timestamp::ZERO);
}

#[test]
#[should_panic(expected = "resumes at")]
fn test_resume_at_wrong_timestamp_panics() {
    let mut memory = TimelyMemory::lazy();
    memory.put(&tuple(&[1]), ts(2));
    memory.resume_at(ts(1));
}

#[test]
#[should_panic(expected = "nothing to fold")]
fn test_resume_without_work_panics() {
    TimelyMemory::lazy().resume_at(ts(0));
}
