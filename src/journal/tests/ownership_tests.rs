//! Ownership transfer and the oldest-first reclamation cascade as seen
//! through the public interface.

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::journal::Journal;
    use crate::journal::tests::test_helpers::{
        chunk_file_names, deterministic_factory, open_group, read_handle,
    };

    #[test]
    fn test_take_ownership_and_dispose_removes_only_oldest() {
        let dir = tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let factory = deterministic_factory(1);
        let group = open_group(&factory, dir.path(), "out_0");
        let journal = group.get_journal("s");
        for record in [b"A", b"B", b"C"] {
            assert!(journal.write(record).is_ok());
        }
        assert_eq!(chunk_file_names(dir.path()).len(), 3);

        let handle = journal.tail_chunk().unwrap_or_else(|| panic!("tail"));
        let oldest_path = handle.path().unwrap_or_else(|e| panic!("path: {e}"));
        assert!(handle.take_ownership());
        assert!(handle.dispose().is_ok());

        // The owned oldest file is gone; the former middle chunk is
        // now the oldest and still anchored.
        assert!(!oldest_path.exists());
        assert_eq!(chunk_file_names(dir.path()).len(), 2);
        let new_tail = journal.tail_chunk().unwrap_or_else(|| panic!("new tail"));
        assert_eq!(read_handle(&new_tail), "B");
        assert!(new_tail.dispose().is_ok());

        let oldest = journal
            .chunk_list()
            .oldest()
            .unwrap_or_else(|| panic!("oldest"));
        assert!(oldest.refcount() >= 1);
    }

    #[test]
    fn test_consumer_drains_journal_oldest_first() {
        let dir = tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let factory = deterministic_factory(1);
        let group = open_group(&factory, dir.path(), "out_0");
        let journal = group.get_journal("s");
        for record in [b"A", b"B", b"C"] {
            assert!(journal.write(record).is_ok());
        }

        // The consumer loop: read, step forward, take ownership,
        // dispose.
        let mut shipped = Vec::new();
        let mut cursor = journal.tail_chunk();
        while let Some(handle) = cursor {
            shipped.push(read_handle(&handle));
            cursor = handle.next_chunk();
            assert!(handle.take_ownership());
            assert!(handle.dispose().is_ok());
        }
        assert_eq!(shipped, vec!["A", "B", "C"]);

        // The sealed chunks were reclaimed; the head survives because
        // the writer still references it.
        let names = chunk_file_names(dir.path());
        assert_eq!(names.len(), 1);
        assert!(names[0].contains(".b"));
        assert_eq!(journal.chunk_list().count(), 1);
    }

    #[test]
    fn test_handle_on_newer_chunk_pins_it_against_cascade() {
        let dir = tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let factory = deterministic_factory(1);
        let group = open_group(&factory, dir.path(), "out_0");
        let journal = group.get_journal("s");
        for record in [b"A", b"B", b"C", b"D"] {
            assert!(journal.write(record).is_ok());
        }

        let tail = journal.tail_chunk().unwrap_or_else(|| panic!("tail"));
        let second = tail.next_chunk().unwrap_or_else(|| panic!("second"));
        let third = second.next_chunk().unwrap_or_else(|| panic!("third"));
        assert!(second.dispose().is_ok());

        // Consume the two oldest chunks while a handle pins the third.
        assert!(tail.take_ownership());
        assert!(tail.dispose().is_ok());
        let new_tail = journal.tail_chunk().unwrap_or_else(|| panic!("new tail"));
        assert_eq!(read_handle(&new_tail), "B");
        assert!(new_tail.take_ownership());
        assert!(new_tail.dispose().is_ok());

        // "C" survives: the third handle holds it.
        assert_eq!(read_handle(&third), "C");
        assert_eq!(journal.chunk_list().count(), 2);
        assert!(third.dispose().is_ok());
    }

    #[test]
    fn test_ownership_of_head_does_not_remove_live_file() {
        let dir = tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let factory = deterministic_factory(100);
        let group = open_group(&factory, dir.path(), "out_0");
        let journal = group.get_journal("s");
        assert!(journal.write(b"live").is_ok());

        let handle = journal.tail_chunk().unwrap_or_else(|| panic!("tail"));
        assert!(handle.take_ownership());
        assert!(handle.dispose().is_ok());

        // The writer's reference keeps the head chunk alive.
        assert_eq!(journal.chunk_list().count(), 1);
        assert_eq!(chunk_file_names(dir.path()).len(), 1);
        assert!(journal.write(b"-more").is_ok());
    }
}
