//! Filepath: src/core/workflow.rs
//! Retry coordinator: extract, generate, parse, apply, with feedback.
//!
//! The generator is an injected capability. Each attempt rebuilds the
//! context, hands it plus the previous attempt's feedback to the
//! generator, and validates the returned patch with a dry run before
//! the real apply. Structural mismatches abort; everything else retries.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::core::{
    apply::{ApplyResult, ContentSource, PatchApplier},
    context::{ContextExtractor, ExtractedContext},
    error::{ApplyError, ExhaustedRetriesError, OperationError, ParseError, ParseFailure, WorkflowError},
    locate::Suggestion,
    patch::{extract_patch_block, parse_patch},
};

/// Why the generator produced nothing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    #[error("timed out")]
    Timeout,
    #[error("{0}")]
    Failed(String),
}

/// Everything the generator gets for one attempt
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub task: &'a str,
    pub target: &'a str,
    /// 1-based
    pub attempt: usize,
    pub max_attempts: usize,
    pub context: &'a ExtractedContext,
    /// Feedback from the previous attempt, if any
    pub feedback: Option<&'a Feedback>,
    pub history: &'a [WorkflowAttempt],
}

/// Produces patch text (possibly wrapped in prose) for a request
pub trait PatchGenerator {
    fn generate(&mut self, request: &GenerationRequest<'_>) -> Result<String, GeneratorError>;
}

impl<F> PatchGenerator for F
where
    F: FnMut(&GenerationRequest<'_>) -> Result<String, GeneratorError>,
{
    fn generate(&mut self, request: &GenerationRequest<'_>) -> Result<String, GeneratorError> {
        self(request)
    }
}

/// Errors and suggestions carried into the next attempt, verbatim
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feedback {
    pub attempt: usize,
    pub errors: Vec<String>,
    pub suggestions: Vec<Suggestion>,
}

/// Record of one attempt
#[derive(Debug, Clone)]
pub struct WorkflowAttempt {
    pub index: usize,
    pub context: ExtractedContext,
    /// Raw generator output
    pub patch_text: Option<String>,
    pub parse_error: Option<ParseError>,
    pub result: Option<ApplyResult>,
    pub feedback: Option<Feedback>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Pending,
    Attempting(usize),
    Succeeded,
    ExhaustedRetries,
    /// Stopped on a structural mismatch
    Aborted,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowState::Succeeded | WorkflowState::ExhaustedRetries | WorkflowState::Aborted
        )
    }
}

/// Terminal state plus full attempt history
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub state: WorkflowState,
    pub attempts: Vec<WorkflowAttempt>,
    /// Committable result of the successful attempt
    pub result: Option<ApplyResult>,
    abort: Option<(usize, ApplyError)>,
}

impl WorkflowReport {
    pub fn into_result(self) -> Result<ApplyResult, WorkflowError> {
        if let Some((attempt, error)) = self.abort {
            return Err(WorkflowError::Apply { attempt, error });
        }
        match self.result {
            Some(result) if self.state == WorkflowState::Succeeded => Ok(result),
            _ => {
                let last_errors = self
                    .attempts
                    .last()
                    .and_then(|a| a.feedback.as_ref())
                    .map(|f| f.errors.clone())
                    .unwrap_or_default();
                Err(ExhaustedRetriesError {
                    attempts: self.attempts.len(),
                    last_errors,
                }
                .into())
            }
        }
    }
}

/// Drives one task through bounded attempts
pub struct RetryCoordinator<'a> {
    extractor: &'a ContextExtractor,
    applier: &'a PatchApplier,
    max_attempts: usize,
    state: WorkflowState,
}

impl<'a> RetryCoordinator<'a> {
    pub fn new(extractor: &'a ContextExtractor, applier: &'a PatchApplier, max_attempts: usize) -> Self {
        Self {
            extractor,
            applier,
            max_attempts: max_attempts.max(1),
            state: WorkflowState::Pending,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    #[instrument(level = "info", skip_all, fields(path = target, max_attempts = self.max_attempts))]
    pub fn run(
        &mut self,
        task: &str,
        target: &str,
        source: &dyn ContentSource,
        generator: &mut dyn PatchGenerator,
    ) -> WorkflowReport {
        let mut attempts: Vec<WorkflowAttempt> = Vec::with_capacity(self.max_attempts);

        for n in 1..=self.max_attempts {
            self.state = WorkflowState::Attempting(n);
            info!(attempt = n, "attempt started");

            let content = match source.load(target) {
                Ok(c) => c,
                Err(e) => {
                    let error = ApplyError::Unreadable {
                        path: target.to_string(),
                        message: e.to_string(),
                    };
                    return self.finish(WorkflowState::Aborted, attempts, None, Some((n, error)));
                }
            };
            let context = self.extractor.extract(target, content.as_deref(), task);

            let raw = {
                let request = GenerationRequest {
                    task,
                    target,
                    attempt: n,
                    max_attempts: self.max_attempts,
                    context: &context,
                    feedback: attempts.last().and_then(|a| a.feedback.as_ref()),
                    history: &attempts,
                };
                generator.generate(&request)
            };

            let mut attempt = WorkflowAttempt {
                index: n,
                context,
                patch_text: raw.as_ref().ok().cloned(),
                parse_error: None,
                result: None,
                feedback: None,
            };

            let parsed = match raw {
                Err(e) => Err(ParseError::new(1, ParseFailure::GeneratorUnavailable(e.to_string()))),
                Ok(text) => match extract_patch_block(&text) {
                    None => Err(ParseError::new(1, ParseFailure::NoPatchBlock)),
                    Some(block) => parse_patch(block),
                },
            };

            let doc = match parsed {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(attempt = n, error = %e, "patch rejected");
                    attempt.feedback = Some(Feedback {
                        attempt: n,
                        errors: vec![e.to_string()],
                        suggestions: Vec::new(),
                    });
                    attempt.parse_error = Some(e);
                    attempts.push(attempt);
                    continue;
                }
            };

            let dry = self.applier.apply(&doc, source, true);
            if dry.success() {
                let committed = self.applier.apply(&doc, source, false);
                debug_assert!(committed.success(), "dry run and commit disagree");
                attempt.result = Some(committed.clone());
                attempts.push(attempt);
                info!(attempt = n, "patch applied");
                return self.finish(WorkflowState::Succeeded, attempts, Some(committed), None);
            }

            // Structural mismatches are not the generator's to fix
            let structural = dry.failures().find_map(|o| match o.error() {
                Some(OperationError::Apply(e)) => Some(e.clone()),
                _ => None,
            });
            if let Some(error) = structural {
                warn!(attempt = n, %error, "aborting on structural mismatch");
                attempt.result = Some(dry);
                attempts.push(attempt);
                return self.finish(WorkflowState::Aborted, attempts, None, Some((n, error)));
            }

            warn!(attempt = n, failures = dry.failures().count(), "hunks did not apply");
            attempt.feedback = Some(Feedback {
                attempt: n,
                errors: dry.error_messages(),
                suggestions: dry.suggestions(),
            });
            attempt.result = Some(dry);
            attempts.push(attempt);
        }

        warn!(attempts = attempts.len(), "retries exhausted");
        self.finish(WorkflowState::ExhaustedRetries, attempts, None, None)
    }

    fn finish(
        &mut self,
        state: WorkflowState,
        attempts: Vec<WorkflowAttempt>,
        result: Option<ApplyResult>,
        abort: Option<(usize, ApplyError)>,
    ) -> WorkflowReport {
        self.state = state;
        WorkflowReport {
            state,
            attempts,
            result,
            abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn fs() -> HashMap<String, String> {
        HashMap::from([("calc.py".to_string(), "def add(a, b):\n    return a - b\n".to_string())])
    }

    const FIX: &str = "Here you go:\n```\n*** Begin Patch\n*** Update File: calc.py\n@@ def add @@\n-    return a - b\n+    return a + b\n*** End Patch\n```\n";

    #[test]
    fn second_attempt_sees_feedback_and_succeeds() {
        let extractor = ContextExtractor::default();
        let applier = PatchApplier::default();
        let mut seen_feedback = Vec::new();
        let mut generator = |req: &GenerationRequest<'_>| -> Result<String, GeneratorError> {
            seen_feedback.push(req.feedback.map(|f| f.errors.len()));
            if req.attempt == 1 {
                Ok("no patch here".into())
            } else {
                Ok(FIX.into())
            }
        };

        let mut coordinator = RetryCoordinator::new(&extractor, &applier, 3);
        let report = coordinator.run("fix add", "calc.py", &fs(), &mut generator);
        assert_eq!(report.state, WorkflowState::Succeeded);
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(
            report.attempts[0].parse_error.as_ref().map(|e| e.reason.clone()),
            Some(ParseFailure::NoPatchBlock)
        );
        assert_eq!(seen_feedback, [None, Some(1)]);
        // The recorded attempt holds the committable result
        let recorded = report.attempts[1].result.as_ref().unwrap();
        assert!(!recorded.dry_run);
        assert_eq!(recorded.changes().len(), 1);

        let result = report.into_result().unwrap();
        assert_eq!(result.final_content("calc.py"), Some("def add(a, b):\n    return a + b\n"));
        assert_eq!(result.changes().len(), 1);
    }

    #[test]
    fn generator_failures_count_as_parse_errors() {
        let extractor = ContextExtractor::default();
        let applier = PatchApplier::default();
        let mut generator = |_: &GenerationRequest<'_>| -> Result<String, GeneratorError> { Err(GeneratorError::Timeout) };

        let mut coordinator = RetryCoordinator::new(&extractor, &applier, 2);
        let report = coordinator.run("fix add", "calc.py", &fs(), &mut generator);
        assert_eq!(coordinator.state(), WorkflowState::ExhaustedRetries);
        let errors = &report.attempts[1].feedback.as_ref().unwrap().errors;
        assert_eq!(errors, &["line 1: generator unavailable: timed out"]);
        match report.into_result() {
            Err(WorkflowError::ExhaustedRetries(e)) => assert_eq!(e.attempts, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn structural_mismatch_aborts_without_retry() {
        let extractor = ContextExtractor::default();
        let applier = PatchApplier::default();
        let mut calls = 0;
        let mut generator = |_: &GenerationRequest<'_>| -> Result<String, GeneratorError> {
            calls += 1;
            Ok("*** Begin Patch\n*** Delete File: gone.py\n*** End Patch\n".into())
        };

        let mut coordinator = RetryCoordinator::new(&extractor, &applier, 3);
        let report = coordinator.run("remove gone", "calc.py", &fs(), &mut generator);
        assert_eq!(report.state, WorkflowState::Aborted);
        assert_eq!(report.attempts.len(), 1);
        assert!(matches!(report.into_result(), Err(WorkflowError::Apply { attempt: 1, .. })));
        assert_eq!(calls, 1);
    }
}
