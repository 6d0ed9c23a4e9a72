use talus::Config;
use test_log::test;

#[test]
fn tree_insert_then_get() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    tree.insert("k", "v", tree.seqno.next())?;

    let item = tree.get("k")?.expect("should exist");
    assert_eq!(b"v", &*item);

    assert!(tree.contains_key("k")?);
    assert_eq!(1, tree.len()?);
    assert!(!tree.is_empty()?);

    Ok(())
}

#[test]
fn tree_insert_many() -> talus::Result<()> {
    const ITEM_COUNT: usize = 100;

    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    for i in 0..ITEM_COUNT {
        tree.insert(format!("key-{i:0>3}"), format!("value-{i}"), tree.seqno.next())?;
    }

    assert_eq!(ITEM_COUNT, tree.len()?);

    for i in 0..ITEM_COUNT {
        let item = tree.get(format!("key-{i:0>3}"))?.expect("should exist");
        assert_eq!(format!("value-{i}").as_bytes(), &*item);
    }

    let (first_key, _) = tree.first_key_value()?.expect("should exist");
    assert_eq!(b"key-000", &*first_key);

    let (last_key, _) = tree.last_key_value()?.expect("should exist");
    assert_eq!(b"key-099", &*last_key);

    Ok(())
}

#[test]
fn tree_insert_overwrite() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    tree.insert("a", "first", tree.seqno.next())?;
    tree.insert("a", "second", tree.seqno.next())?;

    let item = tree.get("a")?.expect("should exist");
    assert_eq!(b"second", &*item);

    assert_eq!(1, tree.len()?);

    Ok(())
}

#[test]
fn tree_seqno_monotonic() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder).open()?;

    let mut previous = None;

    for _ in 0..100 {
        let seqno = tree.seqno.next();
        tree.insert("a", "b", seqno)?;

        if let Some(previous) = previous {
            assert!(seqno > previous);
        }
        previous = Some(seqno);
    }

    Ok(())
}
