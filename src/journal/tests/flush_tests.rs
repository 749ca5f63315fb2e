//! Flush and purge behavior at the consumer boundary.

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::journal::Journal;
    use crate::journal::tests::test_helpers::{
        chunk_file_names, deterministic_factory, open_group, read_handle,
    };

    #[test]
    fn test_flush_ships_sealed_chunks_and_reclaims_them() {
        let dir = tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let factory = deterministic_factory(1);
        let group = open_group(&factory, dir.path(), "out_0");
        let journal = group.get_journal("s");
        for record in [b"A", b"B", b"C"] {
            assert!(journal.write(record).is_ok());
        }

        // A realistic forwarder: ship sealed chunks and take ownership
        // of them, leave the live head alone.
        let mut shipped = Vec::new();
        let mut visitor = |handle: crate::journal::ChunkHandle| {
            let sealed = handle
                .path()?
                .to_string_lossy()
                .contains(".q");
            if sealed {
                shipped.push(read_handle(&handle));
                handle.take_ownership();
            }
            handle.dispose()
        };
        assert!(journal.flush(Some(&mut visitor)).is_ok());

        assert_eq!(shipped, vec!["A", "B"]);
        let names = chunk_file_names(dir.path());
        assert_eq!(names.len(), 1);
        assert!(names[0].contains(".b"));
    }

    #[test]
    fn test_purge_twice_equals_purge_once() {
        let dir = tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let factory = deterministic_factory(1);
        let group = open_group(&factory, dir.path(), "out_0");
        let journal = group.get_journal("s");
        for record in [b"A", b"B", b"C"] {
            assert!(journal.write(record).is_ok());
        }

        assert!(journal.purge().is_ok());
        let after_one = chunk_file_names(dir.path());
        assert!(journal.purge().is_ok());
        let after_two = chunk_file_names(dir.path());
        assert_eq!(after_one, after_two);
        assert_eq!(after_one.len(), 1);
    }

    #[test]
    fn test_flush_on_empty_journal_is_a_no_op() {
        let dir = tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let factory = deterministic_factory(100);
        let group = open_group(&factory, dir.path(), "out_0");
        let journal = group.get_journal("s");

        let mut calls = 0usize;
        let mut visitor = |handle: crate::journal::ChunkHandle| {
            calls += 1;
            handle.dispose()
        };
        assert!(journal.flush(Some(&mut visitor)).is_ok());
        assert_eq!(calls, 0);
        assert!(journal.purge().is_ok());
    }

    #[test]
    fn test_writes_after_flush_start_from_surviving_head() {
        let dir = tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let factory = deterministic_factory(1);
        let group = open_group(&factory, dir.path(), "out_0");
        let journal = group.get_journal("s");
        for record in [b"A", b"B"] {
            assert!(journal.write(record).is_ok());
        }
        assert!(journal.flush(None).is_ok());
        assert_eq!(journal.chunk_list().count(), 1);

        // The journal keeps rolling normally after reclamation.
        assert!(journal.write(b"C").is_ok());
        assert_eq!(journal.chunk_list().count(), 2);
        let tail = journal.tail_chunk().unwrap_or_else(|| panic!("tail"));
        assert_eq!(read_handle(&tail), "B");
        assert!(tail.dispose().is_ok());
    }
}
