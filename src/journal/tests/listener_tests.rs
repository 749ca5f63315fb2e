//! Listener registration semantics: duplicate collapse and event
//! ordering.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::tempdir;

    use crate::journal::Journal;
    use crate::journal::journal::ChunkListener;
    use crate::journal::tests::test_helpers::{deterministic_factory, open_group};

    #[test]
    fn test_duplicate_registration_collapses() {
        let dir = tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let factory = deterministic_factory(100);
        let group = open_group(&factory, dir.path(), "out_0");
        let journal = group.get_journal("s");

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let listener: ChunkListener = Arc::new(move |handle| {
            counter.fetch_add(1, Ordering::AcqRel);
            handle.dispose()
        });
        journal.add_new_chunk_listener(Arc::clone(&listener));
        journal.add_new_chunk_listener(listener);

        assert!(journal.write(b"record").is_ok());
        // One subscription, one new-chunk event, one invocation.
        assert_eq!(fired.load(Ordering::Acquire), 1);
    }

    #[test]
    fn test_distinct_listeners_both_fire() {
        let dir = tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let factory = deterministic_factory(100);
        let group = open_group(&factory, dir.path(), "out_0");
        let journal = group.get_journal("s");

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        for counter in [&first, &second] {
            let counter = Arc::clone(counter);
            journal.add_new_chunk_listener(Arc::new(move |handle| {
                counter.fetch_add(1, Ordering::AcqRel);
                handle.dispose()
            }));
        }

        assert!(journal.write(b"record").is_ok());
        assert_eq!(first.load(Ordering::Acquire), 1);
        assert_eq!(second.load(Ordering::Acquire), 1);
    }

    #[test]
    fn test_duplicate_flush_listener_collapses() {
        let dir = tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let factory = deterministic_factory(1);
        let group = open_group(&factory, dir.path(), "out_0");
        let journal = group.get_journal("s");

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let listener: ChunkListener = Arc::new(move |handle| {
            counter.fetch_add(1, Ordering::AcqRel);
            handle.dispose()
        });
        journal.add_flush_listener(Arc::clone(&listener));
        journal.add_flush_listener(Arc::clone(&listener));
        journal.add_flush_listener(listener);

        assert!(journal.write(b"A").is_ok());
        assert!(journal.write(b"B").is_ok());
        // One seal event, one invocation.
        assert_eq!(fired.load(Ordering::Acquire), 1);
    }

    #[test]
    fn test_listener_handles_left_undisposed_pin_chunks() {
        let dir = tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let factory = deterministic_factory(1);
        let group = open_group(&factory, dir.path(), "out_0");
        let journal = group.get_journal("s");

        let kept = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&kept);
        journal.add_flush_listener(Arc::new(move |handle| {
            if let Ok(mut kept) = sink.lock() {
                kept.push(handle);
            }
            Ok(())
        }));

        for record in [b"A", b"B", b"C"] {
            assert!(journal.write(record).is_ok());
        }
        // Two sealed chunks are pinned by the retained handles, so
        // purge reclaims nothing.
        assert!(journal.purge().is_ok());
        assert_eq!(journal.chunk_list().count(), 3);

        // Releasing the handles lets the next purge reclaim the tail.
        let handles = std::mem::take(
            &mut *kept.lock().unwrap_or_else(|e| panic!("lock: {e}")),
        );
        for handle in handles {
            assert!(handle.dispose().is_ok());
        }
        assert!(journal.purge().is_ok());
        assert_eq!(journal.chunk_list().count(), 1);
    }
}
