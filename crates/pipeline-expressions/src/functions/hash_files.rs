/*
 * functions/hash_files.rs
 * Copyright (c) 2025 Posit, PBC
 */

use std::fs::File;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::ast::ExpressionNode;
use crate::error::{ExpressionError, ExpressionResult};
use crate::evaluator::EvaluationContext;
use crate::value::Value;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

fn error(message: impl Into<String>) -> ExpressionError {
    ExpressionError::function("hashFiles", message)
}

/// `hashFiles(patterns...)`: SHA-256 over the files under the workspace that
/// match any pattern.
///
/// Patterns are globs relative to the workspace root; a leading `!` excludes.
/// Matching files are hashed individually in lexicographic path order and the
/// digests are hashed again. No match yields an empty string.
pub(crate) fn hash_files(
    context: &mut EvaluationContext<'_>,
    parameters: &[ExpressionNode],
) -> ExpressionResult<Value> {
    let Some(root) = context.options().workspace.clone() else {
        return Err(error(
            "hashFiles is only available when a workspace directory is configured",
        ));
    };

    let mut include = Vec::new();
    let mut exclude = Vec::new();
    for parameter in parameters {
        let text = context.evaluate(parameter)?.convert_to_string();
        let (negated, text) = match text.strip_prefix('!') {
            Some(rest) => (true, rest.to_string()),
            None => (false, text),
        };
        let pattern = Pattern::new(text.trim_start_matches("./"))
            .map_err(|e| error(format!("Invalid glob pattern '{text}': {e}")))?;
        if negated {
            exclude.push(pattern);
        } else {
            include.push(pattern);
        }
    }

    let mut files = matching_files(&root, &include, &exclude)?;
    files.sort_by(|a, b| a.0.cmp(&b.0));
    if files.is_empty() {
        tracing::debug!(root = %root.display(), "hashFiles matched no files");
        return Ok(Value::String(String::new()));
    }

    let mut combined = Sha256::new();
    for (relative, path) in &files {
        context.check_cancelled()?;
        tracing::trace!(file = %relative, "hashFiles");
        let mut file = File::open(path)
            .map_err(|e| error(format!("Unable to read '{relative}': {e}")))?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)
            .map_err(|e| error(format!("Unable to read '{relative}': {e}")))?;
        combined.update(hasher.finalize());
    }
    tracing::debug!(count = files.len(), "hashFiles hashed files");
    Ok(Value::String(hex::encode(combined.finalize())))
}

fn matching_files(
    root: &Path,
    include: &[Pattern],
    exclude: &[Pattern],
) -> ExpressionResult<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| error(format!("Unable to enumerate workspace: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let included = include
            .iter()
            .any(|p| p.matches_with(&relative, MATCH_OPTIONS));
        let excluded = exclude
            .iter()
            .any(|p| p.matches_with(&relative, MATCH_OPTIONS));
        if included && !excluded {
            files.push((relative, entry.into_path()));
        }
    }
    Ok(files)
}
