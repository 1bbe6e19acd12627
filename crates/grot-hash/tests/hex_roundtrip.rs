use grot_hash::{hex, IdPrefix, ObjectId};
use proptest::prelude::*;

proptest! {
    #[test]
    fn hex_encode_decode_round_trips(bytes in proptest::collection::vec(any::<u8>(), 20)) {
        let id = ObjectId::from_bytes(&bytes).unwrap();
        let hex = id.to_hex();
        prop_assert_eq!(hex.len(), 40);
        let back = ObjectId::from_hex(&hex).unwrap();
        prop_assert_eq!(back, id);
    }

    #[test]
    fn hex_string_round_trips(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let encoded = hex::hex_to_string(&bytes);
        let mut decoded = vec![0u8; bytes.len()];
        hex::hex_decode(&encoded, &mut decoded).unwrap();
        prop_assert_eq!(decoded, bytes);
    }

    #[test]
    fn every_prefix_of_an_id_matches_it(
        bytes in proptest::collection::vec(any::<u8>(), 20),
        len in 2usize..=40,
    ) {
        let id = ObjectId::from_bytes(&bytes).unwrap();
        let hex = id.to_hex();
        let prefix = IdPrefix::parse(&hex[..len]).unwrap();
        prop_assert!(id.matches_prefix(&prefix));
    }

    #[test]
    fn ordering_matches_byte_ordering(
        a in proptest::collection::vec(any::<u8>(), 20),
        b in proptest::collection::vec(any::<u8>(), 20),
    ) {
        let ida = ObjectId::from_bytes(&a).unwrap();
        let idb = ObjectId::from_bytes(&b).unwrap();
        prop_assert_eq!(ida.cmp(&idb), a.cmp(&b));
    }
}
