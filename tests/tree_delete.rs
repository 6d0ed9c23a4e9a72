use talus::Config;
use test_log::test;

#[test]
fn tree_delete_masks_older_value() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    tree.insert("k", "v1", tree.seqno.next())?;
    tree.remove("k", tree.seqno.next())?;

    assert_eq!(None, tree.get("k")?);
    assert!(!tree.contains_key("k")?);
    assert_eq!(0, tree.len()?);

    Ok(())
}

#[test]
fn tree_delete_masks_segment_value() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    tree.insert("k", "v1", tree.seqno.next())?;
    tree.flush_active_memtable()?;

    // The value is in a segment now, the tombstone only in the memtable
    tree.remove("k", tree.seqno.next())?;

    assert_eq!(None, tree.get("k")?);
    assert_eq!(0, tree.len()?);

    // ... and still masked when both are in segments
    tree.flush_active_memtable()?;

    assert_eq!(None, tree.get("k")?);
    assert_eq!(0, tree.len()?);

    Ok(())
}

#[test]
fn tree_delete_then_reinsert() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    tree.insert("k", "v1", tree.seqno.next())?;
    tree.remove("k", tree.seqno.next())?;
    tree.insert("k", "v2", tree.seqno.next())?;

    let item = tree.get("k")?.expect("should exist");
    assert_eq!(b"v2", &*item);
    assert_eq!(1, tree.len()?);

    Ok(())
}
