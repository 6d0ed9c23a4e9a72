use talus::Config;
use test_log::test;

#[test]
fn tree_major_compaction_merges_segments() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    for batch in 0..3 {
        for i in 0..100 {
            tree.insert(format!("key-{i:0>3}"), format!("{batch}"), tree.seqno.next())?;
        }
        tree.flush_active_memtable()?;
    }

    assert_eq!(3, tree.segment_count());

    tree.major_compact(u64::MAX)?;

    assert_eq!(1, tree.segment_count());
    assert_eq!(0, tree.first_level_segment_count());
    assert!(!tree.is_compacting());

    assert_eq!(100, tree.len()?);

    for i in 0..100 {
        let item = tree.get(format!("key-{i:0>3}"))?.expect("should exist");
        assert_eq!(b"2", &*item);
    }

    Ok(())
}

#[test]
fn tree_major_compaction_drops_tombstones() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    tree.insert("a", "1", tree.seqno.next())?;
    tree.insert("b", "2", tree.seqno.next())?;
    tree.flush_active_memtable()?;

    tree.remove("a", tree.seqno.next())?;
    tree.flush_active_memtable()?;

    assert_eq!(2, tree.segment_count());

    tree.major_compact(u64::MAX)?;

    assert_eq!(1, tree.segment_count());
    assert_eq!(None, tree.get("a")?);
    assert_eq!(1, tree.len()?);

    // No tombstone survived, there is nothing to resurrect
    assert_eq!(1, tree.approximate_len());

    Ok(())
}

#[test]
fn tree_major_compaction_keeps_tombstones_for_snapshot() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    tree.insert("a", "1", tree.seqno.next())?;
    tree.flush_active_memtable()?;

    let snapshot = tree.snapshot(tree.seqno.get());

    tree.remove("a", tree.seqno.next())?;
    tree.flush_active_memtable()?;

    tree.major_compact(u64::MAX)?;

    // The snapshot still sees the old value...
    assert_eq!(b"1", &*snapshot.get("a")?.expect("should exist"));

    // ...and the tree still sees the deletion
    assert_eq!(None, tree.get("a")?);

    Ok(())
}

#[test]
fn tree_major_compaction_readable_after_reopen() -> talus::Result<()> {
    let folder = tempfile::tempdir()?.keep();

    {
        let tree = Config::new(&folder).open()?;

        for batch in 0..3 {
            for i in 0..100 {
                tree.insert(format!("key-{i:0>3}"), format!("{batch}"), tree.seqno.next())?;
            }
            tree.flush_active_memtable()?;
        }

        tree.major_compact(u64::MAX)?;
    }

    let tree = Config::new(&folder).open()?;

    assert_eq!(1, tree.segment_count());
    assert_eq!(100, tree.len()?);
    assert_eq!(b"2", &*tree.get("key-042")?.expect("should exist"));

    std::fs::remove_dir_all(&folder)?;

    Ok(())
}

#[test]
fn tree_major_compaction_multiple_outputs() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).block_size(1_024).open()?;

    for batch in 0..3 {
        for i in 0..1_000 {
            tree.insert(
                format!("key-{i:0>4}"),
                format!("value-{batch}-{i}"),
                tree.seqno.next(),
            )?;
        }
        tree.flush_active_memtable()?;
    }

    // Tiny target size forces multiple output segments
    tree.major_compact(4 * 1_024)?;

    assert!(tree.segment_count() > 1);
    assert_eq!(1_000, tree.len()?);

    Ok(())
}
