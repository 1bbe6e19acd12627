//! Round-trip and tamper-detection tests over generated indexes.

use bstr::BString;
use grot_fileindex::{FileIndex, FileIndexEntry, Stage};
use grot_hash::ObjectId;
use proptest::prelude::*;

fn arb_entry() -> impl Strategy<Value = FileIndexEntry> {
    (
        proptest::collection::vec("[a-z0-9]{1,6}", 1..4),
        any::<u32>(),
        any::<u64>(),
        proptest::collection::vec(any::<u8>(), 20),
        0u8..4,
    )
        .prop_map(|(parts, size, mtime, blob, stage)| {
            let mut entry =
                FileIndexEntry::from_fields(BString::from(parts.join("/").into_bytes()));
            entry.size = size;
            entry.mtime_sec = mtime;
            entry.uid = 1000;
            entry.gid = 1000;
            entry.blob = ObjectId::from_bytes(&blob).unwrap();
            entry.set_stage(match stage {
                1 => Stage::Modify,
                2 => Stage::Add,
                3 => Stage::Delete,
                _ => Stage::None,
            });
            if entry.stage().has_staged_blob() {
                entry.staged_blob = ObjectId::from_bytes(&blob).unwrap();
            }
            entry
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_index_round_trips(entries in proptest::collection::vec(arb_entry(), 0..24)) {
        let mut index = FileIndex::new();
        for entry in entries {
            index.add(entry).unwrap();
        }

        let mut buf = Vec::new();
        index.write(&mut buf).unwrap();
        let back = FileIndex::read(&mut buf.as_slice()).unwrap();

        prop_assert_eq!(back.len(), index.len());
        for (a, b) in back.iter().zip(index.iter()) {
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn tampering_with_any_byte_is_detected(
        entries in proptest::collection::vec(arb_entry(), 1..8),
        flip in any::<prop::sample::Index>(),
    ) {
        let mut index = FileIndex::new();
        for entry in entries {
            index.add(entry).unwrap();
        }
        let mut buf = Vec::new();
        index.write(&mut buf).unwrap();

        // Flip one byte strictly between the magic and the trailer.
        let lo = 4usize;
        let hi = buf.len() - 20;
        let pos = lo + flip.index(hi - lo);
        buf[pos] ^= 0x01;

        prop_assert!(FileIndex::read(&mut buf.as_slice()).is_err());
    }
}
