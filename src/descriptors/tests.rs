use super::*;
use crate::event::Timestamp;

fn file(path: &str) -> Resource {
    Resource::File(path.to_string())
}

fn ms(v: u64) -> Timestamp {
    Timestamp::from_millis(v)
}

#[test]
fn test_resolve_observed_open() {
    let mut table = DescriptorTable::new();
    table.open(1, 3, file("/tmp/a"), ms(10));

    assert_eq!(
        table.resolve(1, 3, ms(20)),
        Resolution::Resolved {
            resource: file("/tmp/a"),
            source: ResolutionSource::Observed
        }
    );
    // Before the open the descriptor was unknown
    assert_eq!(table.resolve(1, 3, ms(5)), Resolution::Unresolved { fd: 3 });
}

#[test]
fn test_descriptor_reuse_after_close() {
    let mut table = DescriptorTable::new();
    table.open(1, 3, file("A"), ms(10));
    assert_eq!(table.close(1, 3, ms(20)), Some(file("A")));
    table.open(1, 3, file("B"), ms(30));

    assert_eq!(table.resolve(1, 3, ms(35)).resource(), Some(&file("B")));
    assert_eq!(table.resolve(1, 3, ms(15)).resource(), Some(&file("A")));
    assert!(!table.resolve(1, 3, ms(25)).is_resolved());
    assert!(table.verify().is_empty());
}

#[test]
fn test_reopen_without_close_closes_previous() {
    let mut table = DescriptorTable::new();
    table.open(1, 3, file("A"), ms(10));
    table.open(1, 3, file("B"), ms(20));

    assert_eq!(table.resolve(1, 3, ms(15)).resource(), Some(&file("A")));
    assert_eq!(table.resolve(1, 3, ms(25)).resource(), Some(&file("B")));
    assert_eq!(table.stats().implicit_reuse, 1);
    assert!(table.verify().is_empty());
}

#[test]
fn test_binding_never_starts_before_previous_one_ended() {
    let mut table = DescriptorTable::new();
    table.open(1, 3, file("A"), ms(10));
    table.close(1, 3, ms(20));
    // Open whose entry predates a close made by another thread
    table.open(1, 3, file("B"), ms(15));

    assert_eq!(table.history(1, 3)[1].valid_from, ms(20));
    assert_eq!(table.resolve(1, 3, ms(17)).resource(), Some(&file("A")));
    assert_eq!(table.resolve(1, 3, ms(20)).resource(), Some(&file("B")));
    assert!(table.verify().is_empty());
}

#[test]
fn test_close_of_unknown_descriptor_is_noop() {
    let mut table = DescriptorTable::new();
    assert_eq!(table.close(1, 9, ms(1)), None);
    table.open(1, 9, file("A"), ms(2));
    table.close(1, 9, ms(3));
    assert_eq!(table.close(1, 9, ms(4)), None);
    assert_eq!(table.stats().ignored_closes, 2);
    assert_eq!(table.stats().closed, 1);
}

#[test]
fn test_fork_inheritance() {
    let mut table = DescriptorTable::new();
    table.open(1, 3, file("A"), ms(10));
    table.open(1, 4, file("gone"), ms(11));
    table.close(1, 4, ms(12));

    assert_eq!(table.inherit(1, 2, ms(20)), 1);
    assert_eq!(
        table.resolve(2, 3, ms(25)),
        Resolution::Resolved {
            resource: file("A"),
            source: ResolutionSource::Inherited
        }
    );
    assert!(!table.resolve(2, 4, ms(25)).is_resolved());
    // Child's copy does not exist before the fork
    assert!(!table.resolve(2, 3, ms(15)).is_resolved());

    // Closing in the parent leaves the child's copy open
    table.close(1, 3, ms(30));
    assert!(table.resolve(2, 3, ms(35)).is_resolved());
}

#[test]
fn test_standard_streams_always_resolve() {
    let table = DescriptorTable::new();
    assert_eq!(
        table.resolve(42, 1, ms(1)),
        Resolution::Resolved {
            resource: Resource::Stdio(StdStream::Stdout),
            source: ResolutionSource::Standard
        }
    );
    assert!(!table.resolve(42, 3, ms(1)).is_resolved());
}

#[test]
fn test_observed_binding_overrides_standard_stream() {
    let mut table = DescriptorTable::new();
    table.open(5, 1, file("/tmp/log"), ms(1));
    assert_eq!(table.resolve(5, 1, ms(2)).resource(), Some(&file("/tmp/log")));
    table.close(5, 1, ms(3));
    assert_eq!(
        table.resolve(5, 1, ms(4)).resource(),
        Some(&Resource::Stdio(StdStream::Stdout))
    );
}

#[test]
fn test_snapshot_fallback_and_supersession() {
    let snapshot = DescriptorSnapshot::from_lsof(Some(7), "p7\nf5\nn/var/log/app.log\n");
    let mut table = DescriptorTable::new();
    table.load_snapshot(&snapshot);

    assert_eq!(
        table.resolve(7, 5, ms(1)),
        Resolution::Resolved {
            resource: file("/var/log/app.log"),
            source: ResolutionSource::PreTrace
        }
    );

    table.open(7, 5, file("/tmp/new"), ms(10));
    assert_eq!(table.resolve(7, 5, ms(5)).resource(), Some(&file("/var/log/app.log")));
    assert_eq!(table.resolve(7, 5, ms(15)).resource(), Some(&file("/tmp/new")));
    assert_eq!(table.stats().snapshot_superseded, 1);
    assert!(table.verify().is_empty());
}

#[test]
fn test_duplicate_descriptor() {
    let mut table = DescriptorTable::new();
    table.open(1, 3, file("A"), ms(1));
    assert_eq!(table.duplicate(1, 3, 10, ms(2)), Some(file("A")));
    assert_eq!(table.resolve(1, 10, ms(3)).resource(), Some(&file("A")));

    // dup2 over a bound descriptor from an unresolved source closes the target
    table.open(1, 11, file("B"), ms(4));
    assert_eq!(table.duplicate(1, 99, 11, ms(5)), None);
    assert!(!table.resolve(1, 11, ms(6)).is_resolved());
}

#[test]
fn test_close_all_on_exit() {
    let mut table = DescriptorTable::new();
    table.open(1, 3, file("A"), ms(1));
    table.open(1, 4, file("B"), ms(1));
    table.open(2, 3, file("C"), ms(1));

    assert_eq!(table.close_all(1, ms(10)), 2);
    assert!(table.current(1, 3).is_none());
    assert!(table.current(2, 3).is_some());
    assert_eq!(table.history(1, 3).len(), 1);
}

#[test]
fn test_duplicate_snapshot_entry_ignored() {
    let mut table = DescriptorTable::new();
    let snapshot = DescriptorSnapshot::from_lsof(Some(1), "p1\nf3\nnA\nf3\nnB\n");
    table.load_snapshot(&snapshot);
    // Second entry for the same pair is dropped on load
    assert_eq!(table.history(1, 3).len(), 1);
    assert!(table.verify().is_empty());
}

#[test]
fn test_snapshot_parsing() {
    let json = r#"{
        "100": "p100\nfcwd\nn/home/u\nf0\nn/dev/pts/0\nf3\nn/etc/hosts\nf4\nnsocket:[12345]\nf5\nnlocalhost:40000->localhost:http\nf6\nntype=STREAM\n",
        "200": "f1\nn/tmp/out\n"
    }"#;
    let snapshot = DescriptorSnapshot::from_json_str(json).unwrap();
    let entries = snapshot.entries();
    assert_eq!(snapshot.len(), 5);
    assert_eq!(snapshot.skipped(), 2);

    assert!(entries.contains(&SnapshotEntry {
        pid: 100,
        fd: 3,
        resource: file("/etc/hosts")
    }));
    assert!(entries.contains(&SnapshotEntry {
        pid: 100,
        fd: 4,
        resource: Resource::Socket("socket:[12345]".to_string())
    }));
    assert!(entries.contains(&SnapshotEntry {
        pid: 100,
        fd: 5,
        resource: Resource::Socket("localhost:40000->localhost:http".to_string())
    }));
    assert!(entries.contains(&SnapshotEntry {
        pid: 200,
        fd: 1,
        resource: file("/tmp/out")
    }));
}

#[test]
fn test_snapshot_malformed_json_is_an_error() {
    let err = DescriptorSnapshot::from_json_str("[1, 2").unwrap_err();
    assert!(matches!(err, crate::error::TraceError::SnapshotFormat(_)));

    let err = DescriptorSnapshot::from_json_str(r#"{"1": 5}"#).unwrap_err();
    assert!(matches!(err, crate::error::TraceError::SnapshotFormat(_)));
}

#[test]
fn test_classify_name() {
    assert_eq!(classify_name("type=STREAM"), None);
    assert_eq!(classify_name(""), None);
    assert_eq!(classify_name("/etc/passwd"), Some(file("/etc/passwd")));
    assert!(classify_name("*:8080").unwrap().is_socket());
    assert!(classify_name("socket:[1]").unwrap().is_socket());
}

#[test]
fn test_binding_interval_is_half_open() {
    let binding = DescriptorBinding {
        pid: 1,
        fd: 3,
        resource: file("A"),
        valid_from: ms(10),
        valid_until: Some(ms(20)),
        origin: BindingOrigin::Observed,
    };
    assert!(binding.contains(ms(10)));
    assert!(binding.contains(ms(19)));
    assert!(!binding.contains(ms(20)));
    assert!(!binding.contains(ms(9)));
}
