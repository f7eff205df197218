//! Artifact verification against a turn's start time.
//!
//! Each [`ArtifactSpec`] names a directory under the `.planning` sandbox and
//! the patterns that must match files written during the turn. Specs are
//! checked in declaration order and the first unmet one is reported.

use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::fault::SystemFault;
use crate::core::policy::{ArtifactSpec, SANDBOX_ROOT};

/// Default cap on files enumerated per spec.
pub const DEFAULT_MAX_SCAN_FILES: usize = 10_000;

/// Inputs shared by every spec of one turn-end check.
#[derive(Debug, Clone)]
pub struct ArtifactScan<'a> {
    pub workspace: &'a Path,
    pub turn_start_ms: i64,
    pub max_files: usize,
}

/// First unmet artifact requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactGap {
    BaseMissing {
        base_dir: String,
    },
    MissingAll {
        base_dir: String,
        pattern: String,
    },
    MissingAny {
        base_dir: String,
        patterns: Vec<String>,
    },
}

/// Check every spec; `Ok(None)` when all are satisfied.
pub fn verify_artifacts(
    specs: &[ArtifactSpec],
    scan: &ArtifactScan<'_>,
) -> Result<Option<ArtifactGap>, SystemFault> {
    for spec in specs {
        if let Some(gap) = verify_spec(spec, scan)? {
            debug!(base_dir = %spec.base_dir, ?gap, "artifact requirement unmet");
            return Ok(Some(gap));
        }
    }
    Ok(None)
}

fn verify_spec(
    spec: &ArtifactSpec,
    scan: &ArtifactScan<'_>,
) -> Result<Option<ArtifactGap>, SystemFault> {
    let all = spec
        .all_patterns()
        .map_err(|err| SystemFault::Policy(err.to_string()))?;
    let any = spec
        .any_patterns()
        .map_err(|err| SystemFault::Policy(err.to_string()))?;

    let Some(base) = resolve_base_dir(scan.workspace, &spec.base_dir)? else {
        return Ok(Some(ArtifactGap::BaseMissing {
            base_dir: spec.base_dir.clone(),
        }));
    };
    let fresh = fresh_files(&base, scan.turn_start_ms, scan.max_files);
    debug!(base = %base.display(), fresh = fresh.len(), "scanned artifact directory");

    let missing_all = all
        .iter()
        .find(|pattern| !fresh.iter().any(|file| pattern.matches(file)));
    let any_satisfied = any.is_empty()
        || any
            .iter()
            .any(|pattern| fresh.iter().any(|file| pattern.matches(file)));

    if let Some(pattern) = missing_all {
        if !any_satisfied {
            debug!(base_dir = %spec.base_dir, "required_any also unmet");
        }
        return Ok(Some(ArtifactGap::MissingAll {
            base_dir: spec.base_dir.clone(),
            pattern: pattern.as_str().to_string(),
        }));
    }
    if !any_satisfied {
        return Ok(Some(ArtifactGap::MissingAny {
            base_dir: spec.base_dir.clone(),
            patterns: spec.required_any.clone(),
        }));
    }
    Ok(None)
}

/// Lexically validate `base_dir`: relative, no `..`, rooted at the sandbox.
pub fn sandboxed_relative(base_dir: &str) -> Result<PathBuf, SystemFault> {
    let escape = |reason: &str| {
        SystemFault::Policy(format!(
            "artifact base_dir `{base_dir}` {reason} (must stay under {SANDBOX_ROOT}/)"
        ))
    };
    let mut normalized = PathBuf::new();
    for component in Path::new(base_dir).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(escape("contains `..`")),
            Component::RootDir | Component::Prefix(_) => return Err(escape("is absolute")),
        }
    }
    if normalized.components().next() != Some(Component::Normal(OsStr::new(SANDBOX_ROOT))) {
        return Err(escape("is outside the sandbox"));
    }
    Ok(normalized)
}

/// Resolve `base_dir` under `workspace`. `Ok(None)` when the directory does
/// not exist; symlinks that leave the sandbox are a policy fault.
pub fn resolve_base_dir(
    workspace: &Path,
    base_dir: &str,
) -> Result<Option<PathBuf>, SystemFault> {
    let relative = sandboxed_relative(base_dir)?;
    let joined = workspace.join(&relative);
    if !joined.is_dir() {
        return Ok(None);
    }
    let canonical = fs::canonicalize(&joined)
        .map_err(|err| SystemFault::Policy(format!("resolve {}: {err}", joined.display())))?;
    let sandbox = fs::canonicalize(workspace.join(SANDBOX_ROOT))
        .map_err(|err| SystemFault::Policy(format!("resolve sandbox root: {err}")))?;
    let workspace = fs::canonicalize(workspace)
        .map_err(|err| SystemFault::Policy(format!("resolve workspace: {err}")))?;
    if !sandbox.starts_with(&workspace) || !canonical.starts_with(&sandbox) {
        return Err(SystemFault::Policy(format!(
            "artifact base_dir `{base_dir}` resolves outside the workspace sandbox"
        )));
    }
    Ok(Some(canonical))
}

/// Paths (relative to `base`) of files modified at or after `turn_start_ms`.
fn fresh_files(base: &Path, turn_start_ms: i64, max_files: usize) -> Vec<PathBuf> {
    let mut fresh = Vec::new();
    let mut seen = 0usize;
    for entry in WalkDir::new(base).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if seen >= max_files {
            warn!(base = %base.display(), max_files, "artifact scan limit reached");
            break;
        }
        seen += 1;
        let modified_ms = match entry.metadata().ok().and_then(|meta| meta.modified().ok()) {
            Some(modified) => DateTime::<Utc>::from(modified).timestamp_millis(),
            None => continue,
        };
        if modified_ms < turn_start_ms {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(base) {
            fresh.push(relative.to_path_buf());
        }
    }
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Workspace;

    fn quick_spec() -> ArtifactSpec {
        ArtifactSpec {
            base_dir: ".planning/quick".to_string(),
            required_all: vec!["**/*-PLAN.md".to_string(), "**/*-SUMMARY.md".to_string()],
            required_any: Vec::new(),
        }
    }

    fn scan(ws: &Workspace) -> ArtifactScan<'_> {
        ArtifactScan {
            workspace: ws.root(),
            turn_start_ms: ws.turn_start_ms(),
            max_files: DEFAULT_MAX_SCAN_FILES,
        }
    }

    #[test]
    fn missing_base_dir_is_reported() {
        let ws = Workspace::new().expect("workspace");
        let gap = verify_artifacts(&[quick_spec()], &scan(&ws)).expect("verify");
        assert_eq!(
            gap,
            Some(ArtifactGap::BaseMissing {
                base_dir: ".planning/quick".to_string()
            })
        );
    }

    #[test]
    fn only_plan_reports_missing_summary() {
        let ws = Workspace::new().expect("workspace");
        ws.write_fresh(".planning/quick/001-x/x-PLAN.md").expect("plan");
        let gap = verify_artifacts(&[quick_spec()], &scan(&ws)).expect("verify");
        assert_eq!(
            gap,
            Some(ArtifactGap::MissingAll {
                base_dir: ".planning/quick".to_string(),
                pattern: "**/*-SUMMARY.md".to_string()
            })
        );
    }

    #[test]
    fn plan_and_summary_satisfy_spec() {
        let ws = Workspace::new().expect("workspace");
        ws.write_fresh(".planning/quick/001-x/x-PLAN.md").expect("plan");
        ws.write_fresh(".planning/quick/001-x/x-SUMMARY.md").expect("summary");
        assert_eq!(verify_artifacts(&[quick_spec()], &scan(&ws)).expect("verify"), None);
    }

    #[test]
    fn stale_files_do_not_count() {
        let ws = Workspace::new().expect("workspace");
        ws.write_fresh(".planning/quick/001-x/x-PLAN.md").expect("plan");
        ws.write_stale(".planning/quick/001-x/x-SUMMARY.md").expect("summary");
        let gap = verify_artifacts(&[quick_spec()], &scan(&ws)).expect("verify");
        assert!(matches!(gap, Some(ArtifactGap::MissingAll { pattern, .. }) if pattern == "**/*-SUMMARY.md"));
    }

    #[test]
    fn required_any_needs_one_match() {
        let ws = Workspace::new().expect("workspace");
        let spec = ArtifactSpec {
            base_dir: ".planning/phases".to_string(),
            required_all: Vec::new(),
            required_any: vec!["**/*-UAT.md".to_string(), "**/*-VERIFICATION.md".to_string()],
        };
        ws.write_fresh(".planning/phases/01-core/notes.md").expect("notes");
        let gap = verify_artifacts(std::slice::from_ref(&spec), &scan(&ws)).expect("verify");
        assert!(matches!(gap, Some(ArtifactGap::MissingAny { .. })));

        ws.write_fresh(".planning/phases/01-core/01-VERIFICATION.md").expect("verification");
        assert_eq!(verify_artifacts(&[spec], &scan(&ws)).expect("verify"), None);
    }

    #[test]
    fn all_gap_is_reported_before_any_gap() {
        let spec = ArtifactSpec {
            base_dir: ".planning/phases".to_string(),
            required_all: vec!["**/*-PLAN.md".to_string()],
            required_any: vec!["**/*-UAT.md".to_string(), "**/*-VERIFICATION.md".to_string()],
        };
        let check = |ws: &Workspace| {
            verify_artifacts(std::slice::from_ref(&spec), &scan(ws)).expect("verify")
        };
        let missing_all = Some(ArtifactGap::MissingAll {
            base_dir: ".planning/phases".to_string(),
            pattern: "**/*-PLAN.md".to_string(),
        });

        let all_met = Workspace::new().expect("workspace");
        all_met.write_fresh(".planning/phases/01/01-PLAN.md").expect("plan");
        assert_eq!(
            check(&all_met),
            Some(ArtifactGap::MissingAny {
                base_dir: ".planning/phases".to_string(),
                patterns: spec.required_any.clone(),
            })
        );

        let any_met = Workspace::new().expect("workspace");
        any_met.write_fresh(".planning/phases/01/01-UAT.md").expect("uat");
        assert_eq!(check(&any_met), missing_all);

        let neither = Workspace::new().expect("workspace");
        neither.write_fresh(".planning/phases/01/notes.md").expect("notes");
        assert_eq!(check(&neither), missing_all);

        all_met.write_fresh(".planning/phases/01/01-VERIFICATION.md").expect("verification");
        assert_eq!(check(&all_met), None);
    }

    #[test]
    fn first_unmet_spec_wins() {
        let ws = Workspace::new().expect("workspace");
        ws.write_fresh(".planning/phases/01/01-PLAN.md").expect("plan");
        let specs = vec![
            ArtifactSpec {
                base_dir: ".planning/phases".to_string(),
                required_all: vec!["**/*-PLAN.md".to_string()],
                required_any: Vec::new(),
            },
            quick_spec(),
            ArtifactSpec {
                base_dir: ".planning/phases".to_string(),
                required_all: vec!["**/*-SUMMARY.md".to_string()],
                required_any: Vec::new(),
            },
        ];
        let gap = verify_artifacts(&specs, &scan(&ws)).expect("verify");
        assert!(matches!(gap, Some(ArtifactGap::BaseMissing { .. })));
    }

    #[test]
    fn base_dir_outside_sandbox_is_policy_fault() {
        for base_dir in ["src", "/etc", ".planning/../src", "../.planning", ""] {
            let err = sandboxed_relative(base_dir).expect_err("escape");
            assert!(matches!(err, SystemFault::Policy(_)), "{base_dir}: {err}");
        }
        assert_eq!(
            sandboxed_relative("./.planning/quick/").expect("ok"),
            PathBuf::from(".planning/quick")
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_base_dir_escaping_sandbox_is_policy_fault() {
        let ws = Workspace::new().expect("workspace");
        let outside = tempfile::tempdir().expect("outside");
        fs::create_dir_all(ws.root().join(".planning")).expect("sandbox");
        std::os::unix::fs::symlink(outside.path(), ws.root().join(".planning/quick"))
            .expect("symlink");
        let err = verify_artifacts(&[quick_spec()], &scan(&ws)).expect_err("escape");
        assert!(matches!(err, SystemFault::Policy(_)), "{err}");
    }

    #[test]
    fn scan_stops_at_file_limit() {
        let ws = Workspace::new().expect("workspace");
        for index in 0..5 {
            ws.write_fresh(&format!(".planning/quick/{index}-notes.md"))
                .expect("notes");
        }
        let base = ws.root().join(".planning/quick");
        assert_eq!(fresh_files(&base, ws.turn_start_ms(), 3).len(), 3);
        assert_eq!(fresh_files(&base, ws.turn_start_ms(), 100).len(), 5);
    }
}
