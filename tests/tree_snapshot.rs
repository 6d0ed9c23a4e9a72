use talus::Config;
use test_log::test;

#[test]
fn tree_snapshot_isolation() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    tree.insert("a", "old", tree.seqno.next())?;

    let snapshot = tree.snapshot(tree.seqno.get());

    tree.insert("a", "new", tree.seqno.next())?;
    tree.insert("b", "new", tree.seqno.next())?;

    // The snapshot still observes the old state
    assert_eq!(b"old", &*snapshot.get("a")?.expect("should exist"));
    assert_eq!(None, snapshot.get("b")?);
    assert_eq!(1, snapshot.len()?);

    // ...the tree does not
    assert_eq!(b"new", &*tree.get("a")?.expect("should exist"));
    assert_eq!(2, tree.len()?);

    Ok(())
}

#[test]
fn tree_snapshot_sees_through_flush() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    tree.insert("a", "old", tree.seqno.next())?;

    let snapshot = tree.snapshot(tree.seqno.get());

    tree.flush_active_memtable()?;
    tree.insert("a", "new", tree.seqno.next())?;
    tree.flush_active_memtable()?;

    // The old version is in a segment now, but still visible to the snapshot
    assert_eq!(b"old", &*snapshot.get("a")?.expect("should exist"));
    assert_eq!(b"new", &*tree.get("a")?.expect("should exist"));

    Ok(())
}

#[test]
fn tree_snapshot_empty_before_any_write() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    let snapshot = tree.snapshot(tree.seqno.get());

    tree.insert("a", "value", tree.seqno.next())?;

    assert!(snapshot.is_empty()?);
    assert_eq!(None, snapshot.get("a")?);
    assert!(!snapshot.contains_key("a")?);

    Ok(())
}

#[test]
fn tree_snapshot_iterators() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    for key in ["a", "ab", "abc", "b"] {
        tree.insert(key, "value", tree.seqno.next())?;
    }

    let snapshot = tree.snapshot(tree.seqno.get());

    tree.insert("ab2", "value", tree.seqno.next())?;
    tree.remove("ab", tree.seqno.next())?;

    let range = snapshot.range("a".."b");
    assert_eq!(3, range.into_iter().count());

    let prefix = snapshot.prefix("ab");
    assert_eq!(2, prefix.into_iter().count());

    let (first_key, _) = snapshot.first_key_value()?.expect("should exist");
    assert_eq!(b"a", &*first_key);

    let (last_key, _) = snapshot.last_key_value()?.expect("should exist");
    assert_eq!(b"b", &*last_key);

    Ok(())
}

#[test]
fn tree_snapshot_delete_not_visible() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    tree.insert("a", "value", tree.seqno.next())?;

    let snapshot = tree.snapshot(tree.seqno.get());

    tree.remove("a", tree.seqno.next())?;

    // The deletion happened after the snapshot
    assert_eq!(b"value", &*snapshot.get("a")?.expect("should exist"));
    assert_eq!(None, tree.get("a")?);

    Ok(())
}
