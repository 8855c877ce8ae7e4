// Retry coordination with a scripted generator: feedback flows from
// one attempt into the next, and the loop stops after the configured
// number of attempts.
mod util;

use anchorpatch::core::{
    apply::PatchApplier,
    context::ContextExtractor,
    error::WorkflowError,
    workflow::{GenerationRequest, GeneratorError, RetryCoordinator, WorkflowState},
};
use util::{PARSER_PY, files};

const WRONG_CONTEXT: &str = "\
*** Begin Patch
*** Update File: pkg/parser.py
@@ def parse_data @@
-    for entry in data:
+    for entry in data or []:
*** End Patch
";

#[test]
fn retries_are_exhausted_after_three_attempts() {
    let fs = files(&[("pkg/parser.py", PARSER_PY)]);
    let extractor = ContextExtractor::default();
    let applier = PatchApplier::default();

    let mut seen = Vec::new();
    let mut generator = |req: &GenerationRequest<'_>| -> Result<String, GeneratorError> {
        seen.push((req.attempt, req.history.len(), req.feedback.map(|f| f.suggestions.len())));
        Ok(format!("Sure, here is the patch.\n\n{WRONG_CONTEXT}"))
    };

    let mut coordinator = RetryCoordinator::new(&extractor, &applier, 3);
    let report = coordinator.run("guard parse_data against None", "pkg/parser.py", &fs, &mut generator);

    assert_eq!(report.state, WorkflowState::ExhaustedRetries);
    assert_eq!(report.attempts.len(), 3);
    assert_eq!(seen[0], (1, 0, None));
    assert_eq!(seen[1].1, 1);
    assert!(seen[2].2.is_some_and(|n| n > 0), "suggestions are fed back: {seen:?}");

    // Every attempt saw the real file and got a context for it
    for attempt in &report.attempts {
        assert!(attempt.context.file_exists);
        assert!(attempt.parse_error.is_none());
        let feedback = attempt.feedback.as_ref().unwrap();
        assert!(feedback.errors[0].contains("context not found"));
        assert!(feedback.suggestions[0].preview.contains("for item in data:"));
    }

    match report.into_result() {
        Err(WorkflowError::ExhaustedRetries(e)) => {
            assert_eq!(e.attempts, 3);
            assert_eq!(e.last_errors.len(), 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    // The source was never written
    assert_eq!(fs["pkg/parser.py"], PARSER_PY);
}

#[test]
fn a_corrected_patch_succeeds_mid_run() {
    let fs = files(&[("pkg/parser.py", PARSER_PY)]);
    let extractor = ContextExtractor::default();
    let applier = PatchApplier::default();

    let mut generator = |req: &GenerationRequest<'_>| -> Result<String, GeneratorError> {
        match req.feedback {
            None => Ok(WRONG_CONTEXT.to_string()),
            // Use the suggested line verbatim
            Some(f) => {
                let line = f.suggestions[0].preview.lines().next().unwrap_or_default().to_string();
                Ok(format!(
                    "*** Begin Patch\n*** Update File: pkg/parser.py\n@@ def parse_data @@\n-{line}\n+    for item in data or []:\n*** End Patch\n"
                ))
            }
        }
    };

    let mut coordinator = RetryCoordinator::new(&extractor, &applier, 3);
    let report = coordinator.run("guard parse_data against None", "pkg/parser.py", &fs, &mut generator);
    assert_eq!(coordinator.state(), WorkflowState::Succeeded);
    assert_eq!(report.attempts.len(), 2);

    let result = report.into_result().unwrap();
    let out = result.final_content("pkg/parser.py").unwrap();
    assert!(out.contains("    for item in data or []:\n"));
    assert_eq!(result.changes().len(), 1);
}
