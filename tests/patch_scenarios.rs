// End-to-end patch scenarios over in-memory file sets: hunks placed
// by exact, fuzzy and anchor-scoped search, plus the failure modes a
// generator has to recover from.
mod util;

use anchorpatch::core::{
    apply::OperationStatus,
    error::{ApplyError, MatchFailure, OperationError},
    index::SymbolIndexer,
    locate::{FileText, LocateOptions, Locator, MatchStrategy},
    patch::{parse_patch, validate_patch},
    symbols::Language,
};
use util::{PARSER_PY, apply, files};

const NULL_CHECK: &str = "\
*** Begin Patch
*** Update File: pkg/parser.py
@@ def parse_data @@
 def parse_data(data):
+    if data is None:
+        return []
     result = []
*** End Patch
";

fn match_failure(res: &anchorpatch::ApplyResult) -> &anchorpatch::core::MatchError {
    match res.outcomes[0].error() {
        Some(OperationError::Match(m)) => m,
        other => panic!("expected a match error, got {other:?}"),
    }
}

#[test]
fn null_check_lands_inside_parse_data() {
    let fs = files(&[("pkg/parser.py", PARSER_PY)]);
    let res = apply(NULL_CHECK, &fs, false);
    assert!(res.success(), "{:?}", res.error_messages());

    let out = res.final_content("pkg/parser.py").unwrap();
    assert!(out.contains("def parse_data(data):\n    if data is None:\n        return []\n    result = []\n"));
    // Everything else is byte-identical
    assert!(out.starts_with("import json\n\n\ndef load(path):\n"));
    assert!(out.ends_with("    return result\n"));
}

#[test]
fn reapplying_a_patch_reports_already_applied() {
    let fs = files(&[("pkg/parser.py", PARSER_PY)]);
    let once = apply(NULL_CHECK, &fs, false);
    let patched = files(&[("pkg/parser.py", once.final_content("pkg/parser.py").unwrap())]);

    let twice = apply(NULL_CHECK, &patched, false);
    assert!(!twice.success());
    assert!(twice.changes().is_empty());
    let err = match_failure(&twice);
    assert_eq!(err.failure, MatchFailure::AlreadyApplied);
    assert_eq!(err.suggestions.len(), 1);
    assert!(err.suggestions[0].preview.starts_with("def parse_data(data):"));
}

const TWINS: &str = "\
def first(x):
    total = x * 2
    return total


def second(x):
    total = x * 2
    return total
";

#[test]
fn identical_bodies_are_ambiguous_without_a_naming_anchor() {
    let fs = files(&[("twins.py", TWINS)]);
    let patch = "\
*** Begin Patch
*** Update File: twins.py
@@ doubling helper @@
-    total = x * 2
+    total = x * 3
     return total
*** End Patch
";
    let res = apply(patch, &fs, true);
    let err = match_failure(&res);
    assert_eq!(err.failure, MatchFailure::Ambiguous { candidates: 2 });
    assert_eq!(err.tried, [MatchStrategy::Exact, MatchStrategy::Fuzzy, MatchStrategy::AnchorScoped]);
    assert_eq!(err.suggestions.len(), 2);
    assert_eq!(err.suggestions[0].score, err.suggestions[1].score);
    assert_eq!(
        (err.suggestions[0].start_line, err.suggestions[1].start_line),
        (2, 7)
    );
}

#[test]
fn naming_the_function_disambiguates() {
    let fs = files(&[("twins.py", TWINS)]);
    let patch = "\
*** Begin Patch
*** Update File: twins.py
@@ def second @@
-    total = x * 2
+    total = x * 3
     return total
*** End Patch
";
    let res = apply(patch, &fs, false);
    assert!(res.success(), "{:?}", res.error_messages());
    let out = res.final_content("twins.py").unwrap();
    assert_eq!(out.matches("x * 2").count(), 1);
    assert!(out.ends_with("def second(x):\n    total = x * 3\n    return total\n"));

    match &res.outcomes[0].status {
        OperationStatus::Applied(a) => {
            assert_eq!(a.hunks[0].strategy, MatchStrategy::AnchorScoped);
            assert_eq!(a.hunks[0].start_line, 7);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn adding_an_existing_file_is_a_structural_error() {
    let fs = files(&[("pkg/parser.py", PARSER_PY)]);
    let patch = "*** Begin Patch\n*** Add File: pkg/parser.py\n+print('hi')\n*** End Patch\n";
    let res = apply(patch, &fs, false);
    assert!(matches!(
        res.outcomes[0].error(),
        Some(OperationError::Apply(ApplyError::TargetExists { .. }))
    ));
    assert_eq!(res.final_content("pkg/parser.py"), Some(PARSER_PY));
}

#[test]
fn whitespace_drift_is_absorbed_by_fuzzy_matching() {
    let fs = files(&[("calc.py", "def add(a, b):\n    return   a+b\n")]);
    let patch = "*** Begin Patch\n*** Update File: calc.py\n@@ def add @@\n-    return a+b\n+    return a + b\n*** End Patch\n";
    let res = apply(patch, &fs, false);
    assert!(res.success(), "{:?}", res.error_messages());
    assert_eq!(res.final_content("calc.py"), Some("def add(a, b):\n    return a + b\n"));
    match &res.outcomes[0].status {
        OperationStatus::Applied(a) => assert_eq!(a.hunks[0].strategy, MatchStrategy::Fuzzy),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn token_changes_are_not_fuzzy_matches() {
    let fs = files(&[("calc.py", "def add(a, b):\n    return a+b\n")]);
    let patch = "*** Begin Patch\n*** Update File: calc.py\n@@ def add @@\n-    return a + b\n+    return b + a\n*** End Patch\n";
    let res = apply(patch, &fs, true);
    let err = match_failure(&res);
    assert_eq!(err.failure, MatchFailure::NotFound);
    // Nearest window still points at the line the generator meant
    assert_eq!(err.suggestions[0].start_line, 2);
}

#[test]
fn unique_exact_matches_stop_the_search() {
    let indexer = SymbolIndexer::default();
    let locator = Locator::new(&indexer, Language::Python, LocateOptions::default());
    let doc = parse_patch(NULL_CHECK).unwrap();
    let text = FileText::parse(PARSER_PY);

    let (_, outcome) = locator.apply_hunk(&text, &doc.operations[0].hunks[0], 1).unwrap();
    assert_eq!(outcome.strategy, MatchStrategy::Exact);
    assert_eq!(outcome.start_line, 9);
}

#[test]
fn validate_reports_counts() {
    let summary = validate_patch(NULL_CHECK).unwrap();
    insta::assert_yaml_snapshot!(summary, @r"
    adds: 0
    updates: 1
    deletes: 0
    moves: 0
    hunks: 1
    ");
}
