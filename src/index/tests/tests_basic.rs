#[cfg(test)]
mod tests {
    use crate::index::Index;
    use crate::record::Record;

    #[test]
    fn set_then_get() {
        let mut index = Index::new();
        index.set(b"a".to_vec(), b"1".to_vec());

        assert_eq!(index.get(b"a"), Some(&b"1"[..]));
        assert!(index.contains_key(b"a"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn set_overwrites() {
        let mut index = Index::new();
        index.set(b"a".to_vec(), b"1".to_vec());
        index.set(b"a".to_vec(), b"two".to_vec());

        assert_eq!(index.get(b"a"), Some(&b"two"[..]));
        assert_eq!(index.len(), 1);
        assert_eq!(index.approximate_size(), 1 + 3);
    }

    #[test]
    fn remove_present_and_absent() {
        let mut index = Index::new();
        index.set(b"a".to_vec(), b"1".to_vec());

        assert_eq!(index.remove(b"a"), Some(b"1".to_vec()));
        assert_eq!(index.remove(b"a"), None);
        assert_eq!(index.remove(b"never"), None);
        assert!(index.is_empty());
        assert_eq!(index.approximate_size(), 0);
    }

    #[test]
    fn values_contains_exactly_live_set() {
        let mut index = Index::new();
        index.set(b"c".to_vec(), b"3".to_vec());
        index.set(b"a".to_vec(), b"1".to_vec());
        index.set(b"b".to_vec(), b"2".to_vec());
        index.remove(b"b");

        let mut values: Vec<&[u8]> = index.values().collect();
        values.sort();
        assert_eq!(values, vec![&b"1"[..], &b"3"[..]]);
    }

    #[test]
    fn iter_is_key_ordered() {
        let mut index = Index::new();
        for key in [b"m", b"z", b"a"] {
            index.set(key.to_vec(), key.to_vec());
        }
        let keys: Vec<&[u8]> = index.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&b"a"[..], &b"m"[..], &b"z"[..]]);
    }

    #[test]
    fn apply_folds_records_in_order() {
        let mut index = Index::new();
        index.apply(Record::live(b"k".to_vec(), b"v1".to_vec()));
        index.apply(Record::live(b"k".to_vec(), b"v2".to_vec()));
        assert_eq!(index.get(b"k"), Some(&b"v2"[..]));

        index.apply(Record::tombstone(b"k".to_vec()));
        assert_eq!(index.get(b"k"), None);

        // Tombstone for a key that was never set is a no-op.
        index.apply(Record::tombstone(b"other".to_vec()));
        assert!(index.is_empty());

        index.apply(Record::live(b"k".to_vec(), b"v3".to_vec()));
        assert_eq!(index.get(b"k"), Some(&b"v3"[..]));
    }

    #[test]
    fn clear_resets_everything() {
        let mut index = Index::new();
        index.set(b"a".to_vec(), b"1".to_vec());
        index.set(b"b".to_vec(), b"2".to_vec());

        index.clear();

        assert!(index.is_empty());
        assert_eq!(index.approximate_size(), 0);
        assert_eq!(index.values().count(), 0);
    }
}
