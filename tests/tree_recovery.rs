use talus::Config;
use test_log::test;

#[test]
fn tree_recover_from_wal() -> talus::Result<()> {
    let folder = tempfile::tempdir()?.keep();

    {
        let tree = Config::new(&folder).open()?;

        tree.insert("a", "1", tree.seqno.next())?;
        tree.insert("b", "2", tree.seqno.next())?;
        tree.wal_sync()?;

        // Simulate a crash: no flush, the tree is just dropped
    }

    let tree = Config::new(&folder).open()?;

    assert_eq!(b"1", &*tree.get("a")?.expect("should exist"));
    assert_eq!(b"2", &*tree.get("b")?.expect("should exist"));
    assert_eq!(2, tree.len()?);

    std::fs::remove_dir_all(&folder)?;

    Ok(())
}

#[test]
fn tree_recover_from_segments_and_wal() -> talus::Result<()> {
    let folder = tempfile::tempdir()?.keep();

    {
        let tree = Config::new(&folder).open()?;

        tree.insert("a", "1", tree.seqno.next())?;
        tree.flush_active_memtable()?;

        tree.insert("b", "2", tree.seqno.next())?;
        tree.remove("a", tree.seqno.next())?;
        tree.wal_sync()?;
    }

    let tree = Config::new(&folder).open()?;

    assert_eq!(None, tree.get("a")?);
    assert_eq!(b"2", &*tree.get("b")?.expect("should exist"));
    assert_eq!(1, tree.len()?);

    std::fs::remove_dir_all(&folder)?;

    Ok(())
}

#[test]
fn tree_recover_seqno_counter() -> talus::Result<()> {
    let folder = tempfile::tempdir()?.keep();

    {
        let tree = Config::new(&folder).open()?;

        for _ in 0..10 {
            tree.insert("a", "b", tree.seqno.next())?;
        }
        tree.flush_active_memtable()?;

        for _ in 0..5 {
            tree.insert("c", "d", tree.seqno.next())?;
        }
        tree.wal_sync()?;

        assert_eq!(15, tree.seqno.get());
    }

    let tree = Config::new(&folder).open()?;

    // The counter continues past every persisted seqno
    assert_eq!(15, tree.seqno.get());

    let seqno = tree.seqno.next();
    assert_eq!(15, seqno);
    tree.insert("e", "f", seqno)?;

    assert_eq!(b"f", &*tree.get("e")?.expect("should exist"));

    std::fs::remove_dir_all(&folder)?;

    Ok(())
}

#[test]
fn tree_recover_cleans_orphaned_segment() -> talus::Result<()> {
    let folder = tempfile::tempdir()?.keep();

    {
        let tree = Config::new(&folder).open()?;
        tree.insert("a", "1", tree.seqno.next())?;
        tree.flush_active_memtable()?;
    }

    // Simulate a crashed flush: a segment folder that the
    // level manifest does not reference
    let orphan = folder.join("segments").join("9999_orphaned");
    std::fs::create_dir_all(&orphan)?;
    std::fs::write(orphan.join("blocks"), b"partial write")?;

    let tree = Config::new(&folder).open()?;

    assert!(!orphan.try_exists()?);
    assert_eq!(b"1", &*tree.get("a")?.expect("should exist"));
    assert_eq!(1, tree.segment_count());

    std::fs::remove_dir_all(&folder)?;

    Ok(())
}

#[test]
fn tree_refuses_unknown_version() -> talus::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let tree = Config::new(folder.path()).open()?;
        tree.insert("a", "1", tree.seqno.next())?;
    }

    // Botch the marker file
    std::fs::write(folder.path().join(".lsm"), [b'L', b'S', b'M', 0xFF, 0xFF])?;

    let result = Config::new(folder.path()).open();
    assert!(matches!(result, Err(talus::Error::InvalidVersion(_))));

    Ok(())
}
