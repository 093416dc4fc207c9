#[cfg(test)]
mod tests {
    use crate::record::RECORD_OVERHEAD;
    use crate::store::tests::helpers::*;
    use crate::store::{StoreReader, StoreState};
    use std::fs;

    #[test]
    fn get_missing_key() {
        let (_dir, path) = temp_log();
        let store = open_loaded(&path);
        assert_eq!(store.get(b"nope"), None);
        assert!(!store.contains_key(b"nope"));
    }

    #[test]
    fn put_appends_exact_record_bytes() {
        let (_dir, path) = temp_log();
        let mut store = open_loaded(&path);

        store.put(b"ab", b"xyz").unwrap();

        assert_eq!(
            fs::read(&path).unwrap(),
            [0, 0, 0, 0, 2, b'a', b'b', 0, 0, 0, 3, b'x', b'y', b'z']
        );
    }

    #[test]
    fn del_appends_tombstone() {
        let (_dir, path) = temp_log();
        let mut store = open_loaded(&path);

        store.put(b"k", b"v").unwrap();
        let before = store.log_size().unwrap();
        store.del(b"k").unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, before + (RECORD_OVERHEAD + 1) as u64);
        assert_eq!(&bytes[before as usize..], [1, 0, 0, 0, 1, b'k', 0, 0, 0, 0]);
    }

    #[test]
    fn del_of_absent_key_is_harmless() {
        let (_dir, path) = temp_log();
        let mut store = open_loaded(&path);

        store.del(b"ghost").unwrap();
        assert!(store.is_empty());

        let reopened = open_loaded(&path);
        assert!(reopened.is_empty());
    }

    #[test]
    fn empty_key_and_value_are_allowed() {
        let (_dir, path) = temp_log();
        let mut store = open_loaded(&path);

        store.put(b"", b"").unwrap();
        assert_eq!(store.get(b""), Some(Vec::new()));

        let reopened = open_loaded(&path);
        assert_eq!(reopened.get(b""), Some(Vec::new()));
    }

    #[test]
    fn binary_keys_and_values() {
        let (_dir, path) = temp_log();
        let mut store = open_loaded(&path);

        let key = [0x00, 0xFF, 0x7F, 0x80];
        let value: Vec<u8> = (0..=255).collect();
        store.put(&key, &value).unwrap();

        let reopened = open_loaded(&path);
        assert_eq!(reopened.get(&key), Some(value));
    }

    #[test]
    fn entries_and_stats() {
        let (_dir, path) = temp_log();
        let mut store = open_loaded(&path);

        store.put(b"b", b"22").unwrap();
        store.put(b"a", b"1").unwrap();

        assert_eq!(
            store.entries(),
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"22".to_vec())
            ]
        );

        let stats = store.stats().unwrap();
        assert_eq!(stats.state, StoreState::Loaded);
        assert_eq!(stats.live_keys, 2);
        assert_eq!(stats.approximate_size, 1 + 2 + 1 + 1);
        assert_eq!(stats.log_bytes, fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn reader_sees_writes_from_other_thread() {
        let (_dir, path) = temp_log();
        let mut store = open_loaded(&path);
        let reader: StoreReader = store.reader();

        store.put(b"shared", b"yes").unwrap();

        let handle = std::thread::spawn(move || reader.get(b"shared"));
        assert_eq!(handle.join().unwrap(), Some(b"yes".to_vec()));
    }

    #[test]
    fn load_twice_is_deterministic() {
        let (_dir, path) = temp_log();
        let mut store = open_loaded(&path);
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();
        store.del(b"a").unwrap();

        let first = store.entries();
        store.load().unwrap();
        assert_eq!(store.entries(), first);
        store.load().unwrap();
        assert_eq!(store.entries(), first);
    }

    /// # Scenario
    /// `load` must rebuild from scratch rather than fold the file on top of
    /// whatever is already in memory.
    ///
    /// # Actions
    /// 1. Store A puts `x`.
    /// 2. Store B (same file, loaded earlier) deletes `x`, appending a tombstone.
    /// 3. Store A reloads.
    ///
    /// # Expected behavior
    /// Store A no longer sees `x`.
    #[test]
    fn reload_picks_up_external_changes() {
        let (_dir, path) = temp_log();
        let mut a = open_loaded(&path);
        a.put(b"x", b"1").unwrap();

        let mut b = open_loaded(&path);
        b.del(b"x").unwrap();

        a.load().unwrap();
        assert_eq!(a.get(b"x"), None);
    }
}
