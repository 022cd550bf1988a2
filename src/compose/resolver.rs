//! Expansion of declarative source entries into concrete descriptors.
//!
//! Entries name either a concrete `path` or a `pathPattern` (a regex over
//! file names in a directory). Pattern matches are sorted by file name -
//! lexicographically, not numerically, so `a_10.png` sorts before `a_2.png`;
//! this ordering is intentional and pinned by tests. Named capture groups
//! populate axis fields on a per-match copy of the entry, and `<axis>Step`
//! strides shift axis values by the match ordinal.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};

use crate::config::{Axis, CompositeSpec, SourceEntry};
use crate::error::{ConfigError, OpenError};

// =============================================================================
// Resolved sources
// =============================================================================

/// A concrete, existence-checked source produced from one entry (or one
/// pattern match).
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    /// Per-match copy of the entry, with capture groups and strides applied.
    pub entry: SourceEntry,
    /// Existing file backing the source.
    pub path: PathBuf,
}

// =============================================================================
// Entry expansion
// =============================================================================

/// Expand every entry of a composite into concrete sources.
///
/// `spec_path` is the composite's own file, used to resolve relative paths
/// and to reject self-referential entries. A concrete path that does not
/// exist is fatal; a pattern with zero matches only logs.
pub fn resolve_entries(
    spec: &CompositeSpec,
    spec_path: Option<&Path>,
) -> Result<Vec<ResolvedSource>, OpenError> {
    let spec_dir = spec_path
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let base = match &spec.base_path {
        Some(base) if base.is_absolute() => base.clone(),
        Some(base) => spec_dir.join(base),
        None => spec_dir,
    };

    let mut resolved = Vec::new();
    for entry in &spec.sources {
        if let Some(path) = &entry.path {
            resolved.push(resolve_concrete(entry, path, &base, spec_path)?);
        } else if let Some(pattern) = &entry.path_pattern {
            resolved.extend(resolve_pattern(entry, pattern, &base)?);
        }
        // validate() already rejected entries with neither.
    }
    Ok(resolved)
}

/// Resolve a concrete path against the base directory, with one flat-layout
/// fallback: the bare file name next to the base directory's parent.
fn resolve_concrete(
    entry: &SourceEntry,
    path: &Path,
    base: &Path,
    spec_path: Option<&Path>,
) -> Result<ResolvedSource, OpenError> {
    let mut candidate = base.join(path);
    if !candidate.is_file() {
        let fallback = path
            .file_name()
            .map(|name| base.join("..").join(name))
            .filter(|p| p.is_file());
        candidate = fallback.ok_or_else(|| OpenError::SourceNotFound {
            path: candidate.clone(),
        })?;
    }

    if let Some(spec_path) = spec_path {
        if same_file(&candidate, spec_path) {
            return Err(ConfigError::SelfReference { path: candidate }.into());
        }
    }

    Ok(ResolvedSource {
        entry: entry.clone(),
        path: candidate,
    })
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Expand a pattern entry into one resolved source per matching file.
fn resolve_pattern(
    entry: &SourceEntry,
    pattern: &str,
    base: &Path,
) -> Result<Vec<ResolvedSource>, OpenError> {
    let full = base.join(pattern);
    let dir = full.parent().map(Path::to_path_buf).unwrap_or_else(|| base.to_path_buf());
    let file_pattern = full
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ConfigError::Invalid {
            reason: format!("pathPattern has no file component: {pattern}"),
        })?;
    let regex = Regex::new(file_pattern).map_err(|e| ConfigError::Invalid {
        reason: format!("bad pathPattern {pattern}: {e}"),
    })?;

    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), %err, "pattern directory unreadable; zero matches");
            return Ok(Vec::new());
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| regex.is_match(name))
        .collect();
    // Lexicographic, NOT numeric: "a_10" before "a_2".
    names.sort();

    if names.is_empty() {
        warn!(pattern = %pattern, dir = %dir.display(), "pathPattern matched no files");
        return Ok(Vec::new());
    }

    let mut resolved = Vec::new();
    for name in &names {
        let path = match expand_match(&dir, name) {
            Some(path) => path,
            None => {
                debug!(name = %name, "skipping matched directory without a usable file");
                continue;
            }
        };
        let index = resolved.len() as i64;

        let mut matched = entry.clone();
        apply_captures(&mut matched, &regex, name)?;
        apply_steps(&mut matched, index);
        resolved.push(ResolvedSource {
            entry: matched,
            path,
        });
    }
    Ok(resolved)
}

/// A match names either a plain file or a directory holding a single file
/// named after the directory itself (a nested-folder convention some
/// acquisition software produces).
fn expand_match(dir: &Path, name: &str) -> Option<PathBuf> {
    let path = dir.join(name);
    if path.is_file() {
        return Some(path);
    }
    if path.is_dir() {
        let files: Vec<PathBuf> = std::fs::read_dir(&path)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        if let [file] = files.as_slice() {
            let file = file.clone();
            let stem_matches = file
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|stem| name.starts_with(stem) || stem.starts_with(name))
                .unwrap_or(false);
            if stem_matches {
                return Some(file);
            }
        }
    }
    None
}

/// Populate axis offsets from named capture groups.
///
/// A group name is an axis name, optionally with a trailing `1` marking the
/// captured value as 1-based (it is decremented after parsing). Non-axis
/// group names are ignored.
fn apply_captures(entry: &mut SourceEntry, regex: &Regex, name: &str) -> Result<(), OpenError> {
    let captures = match regex.captures(name) {
        Some(captures) => captures,
        None => return Ok(()),
    };
    for group in regex.capture_names().flatten() {
        let (axis_name, one_based) = match group.strip_suffix('1') {
            Some(stripped) if Axis::from_name(stripped).is_some() => (stripped, true),
            _ => (group, false),
        };
        let axis = match Axis::from_name(axis_name) {
            Some(axis) => axis,
            None => continue,
        };
        if let Some(value) = captures.name(group) {
            let parsed: i64 = value.as_str().parse().map_err(|_| ConfigError::Invalid {
                reason: format!(
                    "capture group {group} in {name} is not numeric: {}",
                    value.as_str()
                ),
            })?;
            entry.set_axis_offset(axis, if one_based { parsed - 1 } else { parsed });
        }
    }
    Ok(())
}

/// Shift axis values by `index * step` for each configured stride.
///
/// With explicit `<axis>Values` present, every value in the array shifts;
/// otherwise the flat axis offset does.
fn apply_steps(entry: &mut SourceEntry, index: i64) {
    for axis in [Axis::Frame, Axis::C, Axis::Z, Axis::T, Axis::XY] {
        let step = match entry.axis_step(axis) {
            Some(step) => step,
            None => continue,
        };
        let shift = index * step;
        if let Some(values) = entry.axis_values_mut(axis) {
            for value in values.iter_mut() {
                *value += shift;
            }
        } else {
            let offset = entry.axis_offset(axis).unwrap_or(0);
            entry.set_axis_offset(axis, offset + shift);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
