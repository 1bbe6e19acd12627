use grot_diff::{diffreg, DiffArgs, DiffFlags, DiffResult};
use proptest::prelude::*;

fn lines() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec("[a-z ]{0,10}", 0..20).prop_map(|ls| {
        let mut out = Vec::new();
        for l in ls {
            out.extend_from_slice(l.as_bytes());
            out.push(b'\n');
        }
        out
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn identical_inputs_are_always_same(data in lines()) {
        let mut out = Vec::new();
        let result = diffreg(
            &data,
            &data,
            DiffFlags::default(),
            &DiffArgs::unified("a", "b"),
            &mut out,
        )
        .unwrap();
        prop_assert_eq!(result, DiffResult::Same);
        prop_assert!(out.is_empty());
    }

    #[test]
    fn differing_inputs_report_differ(a in lines(), b in lines()) {
        let mut out = Vec::new();
        let result = diffreg(
            &a,
            &b,
            DiffFlags::default(),
            &DiffArgs::unified("a", "b"),
            &mut out,
        )
        .unwrap();
        if a == b {
            prop_assert_eq!(result, DiffResult::Same);
        } else {
            prop_assert_eq!(result, DiffResult::Differ);
            prop_assert!(!out.is_empty());
        }
    }

    #[test]
    fn minimal_and_heuristic_agree_on_verdict(a in lines(), b in lines()) {
        let minimal = DiffFlags { minimal: true, ..Default::default() };
        let mut out1 = Vec::new();
        let mut out2 = Vec::new();
        let r1 = diffreg(&a, &b, DiffFlags::default(), &DiffArgs::unified("a", "b"), &mut out1).unwrap();
        let r2 = diffreg(&a, &b, minimal, &DiffArgs::unified("a", "b"), &mut out2).unwrap();
        prop_assert_eq!(r1, r2);
    }
}
