//! Truncated and malformed record tests.
//!
//! A crash in the middle of an append leaves a partial record at the end
//! of the log. Decoding must report it as corrupt, with the offset of the
//! record start, and never panic.

#[cfg(test)]
mod tests {
    use crate::encoding::EncodingError;
    use crate::record::{Record, RecordError, RecordIter};

    fn sample() -> Vec<u8> {
        Record::live(b"key".to_vec(), b"value".to_vec())
            .to_bytes()
            .unwrap()
    }

    #[test]
    fn every_truncation_point_is_corrupt() {
        let bytes = sample();
        for cut in 1..bytes.len() {
            let err = Record::decode_at(&bytes[..cut], 0).unwrap_err();
            assert!(
                matches!(
                    err,
                    RecordError::Corrupt {
                        offset: 0,
                        reason: EncodingError::UnexpectedEof { .. }
                    }
                ),
                "cut at {cut}: expected Corrupt/UnexpectedEof, got {err:?}"
            );
        }
    }

    #[test]
    fn decode_past_end_is_corrupt() {
        let bytes = sample();
        let err = Record::decode_at(&bytes, bytes.len() + 5).unwrap_err();
        assert!(matches!(err, RecordError::Corrupt { offset, .. } if offset == bytes.len() + 5));
    }

    #[test]
    fn declared_key_length_beyond_buffer() {
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(&1000u32.to_be_bytes());
        bytes.extend_from_slice(b"short");
        let err = Record::decode_at(&bytes, 0).unwrap_err();
        assert!(matches!(err, RecordError::Corrupt { offset: 0, .. }));
    }

    #[test]
    fn invalid_tombstone_flag() {
        let mut bytes = sample();
        bytes[0] = 7;
        let err = Record::decode_at(&bytes, 0).unwrap_err();
        assert!(matches!(
            err,
            RecordError::Corrupt {
                reason: EncodingError::InvalidBool(7),
                ..
            }
        ));
    }

    #[test]
    fn iter_stops_at_truncated_tail() {
        let mut buf = sample();
        let good_len = buf.len();
        buf.extend_from_slice(&sample()[..6]);

        let mut iter = RecordIter::new(&buf);
        assert!(iter.next().unwrap().is_ok());
        assert_eq!(iter.offset(), good_len);

        let err = iter.next().unwrap().unwrap_err();
        assert!(matches!(err, RecordError::Corrupt { offset, .. } if offset == good_len));
        assert!(iter.next().is_none());
    }
}
