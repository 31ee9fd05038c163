//! Tests for the retention sweep

use proptest::prelude::*;
use rebroadcast::storage::{RetentionCleaner, SweepReport};
use std::fs::File;
use std::path::Path;
use std::time::{Duration, SystemTime};

const HOUR: Duration = Duration::from_secs(3600);

fn write_aged(dir: &Path, name: &str, age: Duration, now: SystemTime) {
    let path = dir.join(name);
    std::fs::write(&path, b"payload").unwrap();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(now - age)
        .unwrap();
}

#[tokio::test]
async fn test_removes_only_old_files() {
    let dir = tempfile::tempdir().unwrap();
    let now = SystemTime::now();

    write_aged(dir.path(), "fresh.mp4", HOUR, now);
    write_aged(dir.path(), "yesterday.mp4", 23 * HOUR, now);
    write_aged(dir.path(), "stale.mp4", 25 * HOUR, now);
    write_aged(dir.path(), "ancient.part.mp4", 100 * HOUR, now);

    let cleaner = RetentionCleaner::new(dir.path(), 24 * HOUR);
    let report = cleaner.sweep_at(now).await;

    assert_eq!(
        report,
        SweepReport {
            scanned: 4,
            removed: 2,
            failed: 0,
        }
    );
    assert!(dir.path().join("fresh.mp4").exists());
    assert!(dir.path().join("yesterday.mp4").exists());
    assert!(!dir.path().join("stale.mp4").exists());
    assert!(!dir.path().join("ancient.part.mp4").exists());
}

#[tokio::test]
async fn test_future_mtime_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let now = SystemTime::now();
    let path = dir.path().join("clock-skew.mp4");
    std::fs::write(&path, b"payload").unwrap();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(now + HOUR)
        .unwrap();

    let cleaner = RetentionCleaner::new(dir.path(), Duration::ZERO);
    let report = cleaner.sweep_at(now).await;

    assert_eq!(report.removed, 0);
    assert!(path.exists());
}

#[tokio::test]
async fn test_sweep_with_wall_clock() {
    let dir = tempfile::tempdir().unwrap();
    write_aged(dir.path(), "old.mp4", 48 * HOUR, SystemTime::now());

    let cleaner = RetentionCleaner::new(dir.path(), 24 * HOUR);
    assert_eq!(cleaner.sweep().await.removed, 1);
    assert_eq!(cleaner.sweep().await, SweepReport::default());
}

proptest! {
    #[test]
    fn prop_removes_exactly_files_past_threshold(ages in proptest::collection::vec(0u64..48, 0..12)) {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        for (i, age) in ages.iter().enumerate() {
            // Half-hour offset keeps every file clear of the threshold itself
            write_aged(dir.path(), &format!("v{i}.mp4"), Duration::from_secs(*age * 3600 + 1800), now);
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let cleaner = RetentionCleaner::new(dir.path(), 24 * HOUR);
        let report = runtime.block_on(cleaner.sweep_at(now));

        let expected = ages.iter().filter(|age| **age >= 24).count();
        prop_assert_eq!(report.removed, expected);
        prop_assert_eq!(report.scanned, ages.len());

        for (i, age) in ages.iter().enumerate() {
            let exists = dir.path().join(format!("v{i}.mp4")).exists();
            prop_assert_eq!(exists, *age < 24);
        }
    }
}
