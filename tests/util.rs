//! Shared test utilities for integration tests
//!
//! Provides common fixture creation and helper functions
//! used across multiple test files.

#![allow(dead_code)]

use std::collections::HashMap;

use anchorpatch::core::{
    apply::{ApplyResult, PatchApplier},
    patch::parse_patch,
};
use assert_fs::prelude::*;

/// Python module used by most patch scenarios
pub const PARSER_PY: &str = "\
import json


def load(path):
    with open(path) as fh:
        return json.load(fh)


def parse_data(data):
    result = []
    for item in data:
        result.append(item * 2)
    return result
";

/// In-memory file set keyed by patch path
pub fn files(entries: &[(&str, &str)]) -> HashMap<String, String>
{
    entries
        .iter()
        .map(|(p, c)| (p.to_string(), c.to_string()))
        .collect()
}

/// Parse `patch` and apply it to `fs` with default options
pub fn apply(patch: &str, fs: &HashMap<String, String>, dry_run: bool) -> ApplyResult
{
    let doc = parse_patch(patch).expect("patch parses");
    PatchApplier::default().apply(&doc, fs, dry_run)
}

/// Generate a Python file with `n` small handler functions.
/// Each is four lines including the trailing blank, so sizes
/// scale predictably for budget tests.
pub fn python_handlers(n: usize) -> String
{
    (0..n)
        .map(|i| format!("def handler_{i}(event):\n    \"\"\"Handle event {i}.\"\"\"\n    return event + {i}\n\n"))
        .collect()
}

/// Temp project with the parser module at `pkg/parser.py`
pub fn make_project() -> assert_fs::TempDir
{
    // Initialize the temporary project root
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    tmp.child("pkg/parser.py")
        .write_str(PARSER_PY)
        .expect("write parser");

    // Return the prepared directory to the caller
    tmp
}
