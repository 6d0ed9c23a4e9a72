use talus::Config;
use test_log::test;

#[test]
fn tree_flush_memtable_to_segment() -> talus::Result<()> {
    const ITEM_COUNT: usize = 10_000;

    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    for i in 0..ITEM_COUNT {
        tree.insert(format!("key-{i}"), format!("{i}"), tree.seqno.next())?;
    }

    let segment_path = tree.flush_active_memtable()?.expect("should flush");

    assert_eq!(1, tree.segment_count());
    assert_eq!(1, tree.first_level_segment_count());
    assert_eq!(0, tree.active_memtable_size());

    // The segment folder contains all of its artifacts
    assert!(segment_path.join("blocks").try_exists()?);
    assert!(segment_path.join("index").try_exists()?);
    assert!(segment_path.join("meta.json").try_exists()?);

    let metadata: serde_json::Value =
        serde_json::from_slice(&std::fs::read(segment_path.join("meta.json"))?)
            .expect("should parse meta.json");

    assert_eq!(
        ITEM_COUNT as u64,
        metadata["item_count"].as_u64().expect("should be u64")
    );
    assert_eq!(
        ITEM_COUNT as u64,
        metadata["key_count"].as_u64().expect("should be u64")
    );
    assert_eq!("lz4", metadata["compression"].as_str().expect("should be str"));

    // Reads are served from the segment now
    let item = tree.get("key-4242")?.expect("should exist");
    assert_eq!(b"4242", &*item);

    assert_eq!(ITEM_COUNT, tree.len()?);
    assert_eq!(ITEM_COUNT as u64, tree.approximate_len());

    Ok(())
}

#[test]
fn tree_flush_empty_memtable_is_a_no_op() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    assert!(tree.flush_active_memtable()?.is_none());
    assert_eq!(0, tree.segment_count());

    Ok(())
}

#[test]
fn tree_flush_truncates_wal() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    for i in 0..1_000 {
        tree.insert(format!("key-{i}"), "value", tree.seqno.next())?;
    }
    tree.wal_sync()?;

    let wal_path = folder.path().join(".wal.jsonl");
    assert!(std::fs::metadata(&wal_path)?.len() > 0);

    tree.flush_active_memtable()?;

    // Everything was flushed, so the WAL is empty again
    assert_eq!(0, std::fs::metadata(&wal_path)?.len());

    Ok(())
}

#[test]
fn tree_flush_multiple_segments() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    for batch in 0..5 {
        for i in 0..100 {
            tree.insert(
                format!("key-{batch}-{i:0>3}"),
                format!("{batch}"),
                tree.seqno.next(),
            )?;
        }
        tree.flush_active_memtable()?;
    }

    assert_eq!(5, tree.segment_count());
    assert_eq!(500, tree.len()?);
    assert!(tree.disk_space() > 0);

    Ok(())
}
