//! Property tests for locating and replacing line regions

use proptest::prelude::*;
use region_patcher::{
    apply, locate, strip_calls, verify_idempotent, Document, Marker, Outcome, Patch, Region,
    RegionError, RegionPatcher, Selector,
};

fn line_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9 ;(){}]{0,12}"
}

fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::vec(line_strategy(), 0..40).prop_map(|lines| Document::from_lines(lines))
}

/// A document plus a region that fits it.
fn document_and_region() -> impl Strategy<Value = (Document, Region)> {
    document_strategy().prop_flat_map(|doc| {
        let len = doc.len();
        (0..=len)
            .prop_flat_map(move |start| (Just(start), start..=len))
            .prop_map(move |(start, end)| (doc.clone(), Region::new(start, end)))
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    #[test]
    fn prop_self_replace_is_identity((doc, region) in document_and_region()) {
        let current = doc.slice(region).unwrap().to_vec();
        let out = apply(&doc, &Patch::new(region, current)).unwrap();
        prop_assert_eq!(out, doc);
    }

    #[test]
    fn prop_length_and_surroundings(
        (doc, region) in document_and_region(),
        replacement in prop::collection::vec(line_strategy(), 0..8),
    ) {
        let out = apply(&doc, &Patch::new(region, replacement.clone())).unwrap();
        prop_assert_eq!(out.len(), doc.len() - region.len() + replacement.len());
        prop_assert_eq!(&out.lines()[..region.start], &doc.lines()[..region.start]);
        prop_assert_eq!(
            &out.lines()[region.start..region.start + replacement.len()],
            replacement.as_slice()
        );
        prop_assert_eq!(
            &out.lines()[region.start + replacement.len()..],
            &doc.lines()[region.end..]
        );
    }

    #[test]
    fn prop_out_of_range_is_never_clamped(
        doc in document_strategy(),
        start in 0usize..50,
        overshoot in 1usize..10,
    ) {
        let end = doc.len() + overshoot;
        let start = start.min(end);
        let before = doc.clone();

        let located = locate(&doc, &Selector::lines(start, end));
        prop_assert_eq!(
            located,
            Err(RegionError::RegionOutOfRange { start, end, len: doc.len() })
        );
        let applied = apply(&doc, &Patch::new(Region::new(start, end), vec!["x".to_string()]));
        prop_assert!(
            matches!(applied, Err(RegionError::RegionOutOfRange { .. })),
            "out-of-range apply must fail"
        );
        prop_assert_eq!(doc, before);
    }

    #[test]
    fn prop_marker_patch_is_idempotent(
        head in prop::collection::vec(line_strategy(), 0..10),
        body in prop::collection::vec(line_strategy(), 0..10),
        tail in prop::collection::vec(line_strategy(), 0..10),
        new_body in prop::collection::vec(line_strategy(), 0..10),
    ) {
        let mut lines = head;
        lines.push("// <<patch-start>>".to_string());
        lines.extend(body);
        lines.push("// <<patch-end>>".to_string());
        lines.extend(tail);
        let doc = Document::from_lines(lines);

        let selector = Selector::markers(
            Marker::literal("<<patch-start>>"),
            Marker::literal("<<patch-end>>"),
        );
        let mut replacement = vec!["// <<patch-start>>".to_string()];
        replacement.extend(new_body);
        replacement.push("// <<patch-end>>".to_string());

        let mut patcher = RegionPatcher::new();
        let once = match patcher.patch(&doc, &selector, &replacement, None).unwrap() {
            Outcome::Applied { document, .. } => document,
            Outcome::AlreadyApplied { .. } => doc.clone(),
        };
        prop_assert!(verify_idempotent(&once, &selector, &replacement));
        prop_assert!(matches!(
            patcher.patch(&once, &selector, &replacement, None).unwrap(),
            Outcome::AlreadyApplied { .. }
        ), "second patch should report AlreadyApplied");
    }

    #[test]
    fn prop_lf_text_round_trips(text in "[a-z \n]{0,80}") {
        prop_assert_eq!(Document::parse(&text).render(), text);
    }

    #[test]
    fn prop_strip_is_idempotent(
        kept in prop::collection::vec("[a-z]{1,8}\\(\\);", 0..8),
        logged in prop::collection::vec("[a-z0-9 ]{0,8}", 0..8),
    ) {
        let mut lines = Vec::new();
        for (i, line) in kept.iter().enumerate() {
            lines.push(format!("  {line}"));
            if let Some(arg) = logged.get(i) {
                lines.push(format!("  console.log(\"{arg}\");"));
            }
        }
        let doc = Document::from_lines(lines);

        let once = strip_calls(&doc, "console.log").unwrap();
        prop_assert!(once.document.lines().iter().all(|l| !l.contains("console.log")));
        prop_assert_eq!(once.document.len() + once.removals.len(), doc.len());

        let twice = strip_calls(&once.document, "console.log").unwrap();
        prop_assert!(twice.is_unchanged());
    }
}

#[test]
fn test_replace_middle_range() {
    let doc = Document::from_lines(["a", "b", "c", "d", "e"]);
    let region = locate(&doc, &Selector::lines(1, 3)).unwrap();
    let out = apply(&doc, &Patch::new(region, vec!["X".to_string()])).unwrap();
    assert_eq!(out.lines(), ["a", "X", "d", "e"]);
}

#[test]
fn test_markers_inclusive_delete() {
    let doc = Document::from_lines(["keep", "BEGIN", "old", "END", "tail"]);
    let selector = Selector::markers(Marker::literal("BEGIN"), Marker::literal("END"));
    let region = locate(&doc, &selector).unwrap();
    assert_eq!(region, Region::new(1, 4));

    let out = apply(&doc, &Patch::new(region, Vec::new())).unwrap();
    assert_eq!(out.lines(), ["keep", "tail"]);
}

#[test]
fn test_missing_start_marker_not_found() {
    let doc = Document::from_lines(["keep", "old", "END"]);
    let before = doc.clone();
    let selector = Selector::markers(Marker::literal("BEGIN"), Marker::literal("END"));

    let err = RegionPatcher::new()
        .patch(&doc, &selector, &["new".to_string()], None)
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(doc, before);
}

#[test]
fn test_range_past_end_is_out_of_range() {
    let doc = Document::from_lines(["a", "b", "c", "d", "e"]);
    assert_eq!(
        locate(&doc, &Selector::lines(10, 12)),
        Err(RegionError::RegionOutOfRange {
            start: 10,
            end: 12,
            len: 5
        })
    );
}

#[test]
fn test_duplicate_start_marker_is_ambiguous() {
    let doc = Document::from_lines(["// BEGIN", "a", "// END", "// BEGIN", "b", "// END"]);
    let selector = Selector::markers(Marker::literal("// BEGIN"), Marker::literal("// END"));
    assert_eq!(
        locate(&doc, &selector),
        Err(RegionError::AmbiguousMatch { count: 2 })
    );
}
