use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use clearance_core::config::Project;
use clearance_core::findings::{analyze_instances, COMBINED_SCOPE};
use clearance_core::scan::{
    flatten_sorted, load_scan_document, report_folder, scan_document_path, summarize,
};
use clearance_core::types::{FindingTemplate, StageOutcome, Status};

use crate::html::{format_findings, FindingsReportData};
use crate::text::format_review;

fn short_commit(commit: &str) -> &str {
    &commit[..commit.len().min(8)]
}

/// Build and write one findings document (and its review artifact).
///
/// Returns Ok(None) when the target document already exists: regeneration
/// is refused until an operator removes it or advances through "approve".
/// An unreadable classified-scan document is a hard failure.
#[allow(clippy::too_many_arguments)]
fn make_findings(
    store: &Path,
    month: &str,
    prj_name: &str,
    templates: &[FindingTemplate],
    flag_categories: &[String],
    scope: &str,
    doc_scope: &str,
    code_date: &str,
    scope_label: &str,
    repos: Vec<(String, String)>,
    is_draft: bool,
) -> Result<Option<PathBuf>> {
    let folder = report_folder(store, month, prj_name);
    let scan_path = scan_document_path(store, month, prj_name, doc_scope, code_date);
    let review_path = folder.join(format!("{doc_scope}-{code_date}-REVIEW.txt"));
    let html_name = if is_draft {
        format!("{doc_scope}-{code_date}-DRAFT.html")
    } else {
        format!("{doc_scope}-{code_date}.html")
    };
    let html_path = folder.join(&html_name);

    if html_path.exists() {
        return Ok(None);
    }

    let categories = load_scan_document(&scan_path)?;

    let (instances, need_review) = if templates.is_empty() {
        eprintln!("{prj_name}/{scope_label}: no findings templates, skipping analysis");
        (Vec::new(), Vec::new())
    } else {
        let triples = flatten_sorted(&categories);
        analyze_instances(templates, flag_categories, &triples, scope)
    };

    if need_review.is_empty() {
        // drop any stale review artifact from an earlier run
        if review_path.exists() {
            std::fs::remove_file(&review_path)
                .with_context(|| format!("failed to remove {}", review_path.display()))?;
        }
    } else {
        std::fs::write(&review_path, format_review(&need_review))
            .with_context(|| format!("failed to write {}", review_path.display()))?;
        eprintln!(
            "{prj_name}/{scope_label}: REVIEW file written to {}",
            review_path.display()
        );
    }

    // no instances is fine, the report is still produced
    let summary = summarize(&categories);
    let html = format_findings(&FindingsReportData {
        project: prj_name,
        scope: scope_label,
        code_date,
        repos,
        instances: &instances,
        summary: &summary,
    });
    std::fs::create_dir_all(&folder)
        .with_context(|| format!("failed to create {}", folder.display()))?;
    std::fs::write(&html_path, html)
        .with_context(|| format!("failed to write {}", html_path.display()))?;

    let kind = if is_draft { "DRAFT" } else { "FINAL" };
    eprintln!("{prj_name}/{scope_label}: {kind} findings written to {html_name}");
    Ok(Some(html_path))
}

/// Stage runner: create the draft findings document for one subproject.
/// Re-entrant across CREATEDREPORTS and MADEDRAFTFINDINGS; an existing
/// draft makes the re-run a no-op.
pub fn make_draft_findings_for_subproject(
    store: &Path,
    month: &str,
    prj: &mut Project,
    sp_name: &str,
) -> StageOutcome {
    let Project {
        name,
        findings,
        flag_categories,
        subprojects,
        ..
    } = prj;
    let Some(sp) = subprojects.get_mut(sp_name) else {
        eprintln!("{name}: no subproject named {sp_name}");
        return StageOutcome::Failed;
    };

    let orig_status = sp.status;
    if orig_status != Status::CreatedReports && orig_status != Status::MadeDraftFindings {
        eprintln!("{name}/{sp_name}: status is {orig_status}, won't create draft findings now");
        return StageOutcome::WrongStage;
    }

    let repos = sp
        .code
        .repos
        .iter()
        .map(|(r, c)| (r.clone(), short_commit(c).to_string()))
        .collect();
    match make_findings(
        store,
        month,
        name,
        findings,
        flag_categories,
        sp_name,
        sp_name,
        &sp.code.pulled,
        sp_name,
        repos,
        true,
    ) {
        Err(e) => {
            eprintln!("{name}/{sp_name}: {e:#}");
            StageOutcome::Failed
        }
        Ok(None) if orig_status == Status::MadeDraftFindings => StageOutcome::Skipped,
        Ok(_) => {
            sp.status = Status::MadeDraftFindings;
            StageOutcome::Advanced
        }
    }
}

/// Stage runner: create the final findings document for one subproject,
/// after the draft has been approved.
pub fn make_final_findings_for_subproject(
    store: &Path,
    month: &str,
    prj: &mut Project,
    sp_name: &str,
) -> StageOutcome {
    let Project {
        name,
        findings,
        flag_categories,
        subprojects,
        ..
    } = prj;
    let Some(sp) = subprojects.get_mut(sp_name) else {
        eprintln!("{name}: no subproject named {sp_name}");
        return StageOutcome::Failed;
    };

    if sp.status != Status::ApprovedFindings {
        eprintln!(
            "{name}/{sp_name}: status is {}, won't create final findings now",
            sp.status
        );
        return StageOutcome::WrongStage;
    }

    let repos = sp
        .code
        .repos
        .iter()
        .map(|(r, c)| (r.clone(), short_commit(c).to_string()))
        .collect();
    match make_findings(
        store,
        month,
        name,
        findings,
        flag_categories,
        sp_name,
        sp_name,
        &sp.code.pulled,
        sp_name,
        repos,
        false,
    ) {
        Err(e) => {
            eprintln!("{name}/{sp_name}: {e:#}");
            StageOutcome::Failed
        }
        Ok(written) => {
            if written.is_none() {
                eprintln!("{name}/{sp_name}: no final findings report written");
            }
            sp.status = Status::MadeFinalFindings;
            StageOutcome::Advanced
        }
    }
}

/// Approve action: sign off on a subproject's draft so the final document
/// can be generated.
pub fn approve_findings_for_subproject(prj: &mut Project, sp_name: &str) -> StageOutcome {
    let prj_name = prj.name.clone();
    let Some(sp) = prj.subprojects.get_mut(sp_name) else {
        eprintln!("{prj_name}: no subproject named {sp_name}");
        return StageOutcome::Failed;
    };
    if sp.status != Status::MadeDraftFindings {
        eprintln!(
            "{prj_name}/{sp_name}: status is {}, won't approve findings now",
            sp.status
        );
        return StageOutcome::WrongStage;
    }
    sp.status = Status::ApprovedFindings;
    StageOutcome::Advanced
}

/// Stage runner: create the combined draft findings document for a project
/// whose SLM is shared across subprojects.
pub fn make_draft_findings_for_project(store: &Path, month: &str, prj: &mut Project) -> StageOutcome {
    if !prj.slm_combined_report {
        eprintln!("{}: no combined report configured, skipping", prj.name);
        return StageOutcome::Skipped;
    }

    let orig_status = prj.status;
    if orig_status != Status::CreatedReports && orig_status != Status::MadeDraftFindings {
        eprintln!(
            "{}: status is {orig_status}, won't create draft findings now",
            prj.name
        );
        return StageOutcome::WrongStage;
    }

    match make_findings(
        store,
        month,
        &prj.name,
        &prj.findings,
        &prj.flag_categories,
        COMBINED_SCOPE,
        &prj.name,
        month,
        "(all subprojects)",
        combined_repos(prj),
        true,
    ) {
        Err(e) => {
            eprintln!("{}: {e:#}", prj.name);
            StageOutcome::Failed
        }
        Ok(None) if orig_status == Status::MadeDraftFindings => StageOutcome::Skipped,
        Ok(_) => {
            prj.status = Status::MadeDraftFindings;
            StageOutcome::Advanced
        }
    }
}

/// Stage runner: create the combined final findings document.
pub fn make_final_findings_for_project(store: &Path, month: &str, prj: &mut Project) -> StageOutcome {
    if !prj.slm_combined_report {
        eprintln!("{}: no combined report configured, skipping", prj.name);
        return StageOutcome::Skipped;
    }

    if prj.status != Status::ApprovedFindings {
        eprintln!(
            "{}: status is {}, won't create final findings now",
            prj.name, prj.status
        );
        return StageOutcome::WrongStage;
    }

    match make_findings(
        store,
        month,
        &prj.name,
        &prj.findings,
        &prj.flag_categories,
        COMBINED_SCOPE,
        &prj.name,
        month,
        "(all subprojects)",
        combined_repos(prj),
        false,
    ) {
        Err(e) => {
            eprintln!("{}: {e:#}", prj.name);
            StageOutcome::Failed
        }
        Ok(written) => {
            if written.is_none() {
                eprintln!("{}: no final findings report written", prj.name);
            }
            prj.status = Status::MadeFinalFindings;
            StageOutcome::Advanced
        }
    }
}

fn combined_repos(prj: &Project) -> Vec<(String, String)> {
    let mut repos: Vec<(String, String)> = prj
        .subprojects
        .values()
        .flat_map(|sp| {
            sp.code
                .repos
                .iter()
                .map(|(r, c)| (r.clone(), short_commit(c).to_string()))
        })
        .collect();
    repos.sort_by(|a, b| a.0.cmp(&b.0));
    repos
}

#[cfg(test)]
mod tests {
    use super::*;
    use clearance_core::config::Subproject;
    use clearance_core::scan::{save_scan_document, FileFindings, ScanCategory, ScanFile, ScanLicense};
    use clearance_core::types::{FindingTemplate, Priority, SubprojectHosting};

    fn scan_doc() -> Vec<ScanCategory> {
        vec![ScanCategory {
            name: "Copyleft".to_string(),
            num_files: 2,
            licenses: vec![ScanLicense {
                name: "GPL-2.0".to_string(),
                num_files: 2,
                files: vec![
                    ScanFile {
                        path: "src/a.c".to_string(),
                        findings: FileFindings::default(),
                    },
                    ScanFile {
                        path: "src/b.c".to_string(),
                        findings: FileFindings::default(),
                    },
                ],
            }],
        }]
    }

    fn gpl_template() -> FindingTemplate {
        FindingTemplate {
            id: 1,
            priority: Priority::High,
            title: "GPL content".to_string(),
            text: "Needs review.".to_string(),
            matches_path: vec![],
            matches_license: vec!["GPL-2.0".to_string()],
            matches_subproject: vec![],
        }
    }

    fn fixture(store: &Path, status: Status) -> Project {
        let mut prj = Project::new("alpha");
        prj.findings = vec![gpl_template()];
        prj.flag_categories = vec!["Copyleft".to_string()];
        let mut sp = Subproject::new("core", SubprojectHosting::Gerrit);
        sp.status = status;
        sp.code.pulled = "2024-05-03".to_string();
        sp.code
            .repos
            .insert("core/main".to_string(), "abcdef0123456789".to_string());
        prj.subprojects.insert("core".to_string(), sp);

        let doc = scan_document_path(store, "2024-05", "alpha", "core", "2024-05-03");
        save_scan_document(&scan_doc(), &doc).unwrap();
        prj
    }

    #[test]
    fn test_draft_advances_and_writes_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = fixture(tmp.path(), Status::CreatedReports);

        let outcome = make_draft_findings_for_subproject(tmp.path(), "2024-05", &mut prj, "core");
        assert_eq!(outcome, StageOutcome::Advanced);
        assert_eq!(prj.subprojects["core"].status, Status::MadeDraftFindings);

        let folder = report_folder(tmp.path(), "2024-05", "alpha");
        let html = std::fs::read_to_string(folder.join("core-2024-05-03-DRAFT.html")).unwrap();
        assert!(html.contains("GPL content"));
        assert!(html.contains("src/a.c"));
        // both GPL files matched the template, so nothing needs review
        assert!(!folder.join("core-2024-05-03-REVIEW.txt").exists());
    }

    #[test]
    fn test_draft_writes_review_for_unmatched_flagged_files() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = fixture(tmp.path(), Status::CreatedReports);
        // template that matches nothing: all flagged files go to review
        prj.findings[0].matches_license = vec!["AGPL-3.0".to_string()];

        assert!(
            make_draft_findings_for_subproject(tmp.path(), "2024-05", &mut prj, "core").advanced()
        );
        let review = std::fs::read_to_string(
            report_folder(tmp.path(), "2024-05", "alpha").join("core-2024-05-03-REVIEW.txt"),
        )
        .unwrap();
        assert_eq!(review, "Copyleft: GPL-2.0: src/a.c\nCopyleft: GPL-2.0: src/b.c\n");
    }

    #[test]
    fn test_draft_rerun_with_existing_artifact_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = fixture(tmp.path(), Status::CreatedReports);
        assert!(
            make_draft_findings_for_subproject(tmp.path(), "2024-05", &mut prj, "core").advanced()
        );
        let outcome = make_draft_findings_for_subproject(tmp.path(), "2024-05", &mut prj, "core");
        assert_eq!(outcome, StageOutcome::Skipped);
        assert_eq!(prj.subprojects["core"].status, Status::MadeDraftFindings);
    }

    #[test]
    fn test_draft_wrong_stage_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = fixture(tmp.path(), Status::GotCode);
        let outcome = make_draft_findings_for_subproject(tmp.path(), "2024-05", &mut prj, "core");
        assert_eq!(outcome, StageOutcome::WrongStage);
        assert_eq!(prj.subprojects["core"].status, Status::GotCode);
    }

    #[test]
    fn test_draft_missing_scan_document_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = fixture(tmp.path(), Status::CreatedReports);
        prj.subprojects.get_mut("core").unwrap().code.pulled = "2024-05-09".to_string();

        let outcome = make_draft_findings_for_subproject(tmp.path(), "2024-05", &mut prj, "core");
        assert_eq!(outcome, StageOutcome::Failed);
        assert_eq!(prj.subprojects["core"].status, Status::CreatedReports);
    }

    #[test]
    fn test_approve_then_final() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = fixture(tmp.path(), Status::CreatedReports);
        assert!(
            make_draft_findings_for_subproject(tmp.path(), "2024-05", &mut prj, "core").advanced()
        );
        assert!(approve_findings_for_subproject(&mut prj, "core").advanced());
        assert_eq!(prj.subprojects["core"].status, Status::ApprovedFindings);

        assert!(
            make_final_findings_for_subproject(tmp.path(), "2024-05", &mut prj, "core").advanced()
        );
        assert_eq!(prj.subprojects["core"].status, Status::MadeFinalFindings);
        let final_path =
            report_folder(tmp.path(), "2024-05", "alpha").join("core-2024-05-03.html");
        assert!(final_path.is_file());
    }

    #[test]
    fn test_approve_wrong_stage_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = fixture(tmp.path(), Status::CreatedReports);
        let outcome = approve_findings_for_subproject(&mut prj, "core");
        assert_eq!(outcome, StageOutcome::WrongStage);
        assert_eq!(prj.subprojects["core"].status, Status::CreatedReports);
    }

    #[test]
    fn test_final_requires_approval() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = fixture(tmp.path(), Status::MadeDraftFindings);
        let outcome = make_final_findings_for_subproject(tmp.path(), "2024-05", &mut prj, "core");
        assert_eq!(outcome, StageOutcome::WrongStage);
    }

    #[test]
    fn test_stale_review_file_removed_when_review_list_empties() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = fixture(tmp.path(), Status::CreatedReports);
        let folder = report_folder(tmp.path(), "2024-05", "alpha");
        std::fs::create_dir_all(&folder).unwrap();
        let review_path = folder.join("core-2024-05-03-REVIEW.txt");
        std::fs::write(&review_path, "Copyleft: GPL-2.0: old.c\n").unwrap();

        assert!(
            make_draft_findings_for_subproject(tmp.path(), "2024-05", &mut prj, "core").advanced()
        );
        assert!(
            !review_path.exists(),
            "stale review artifact must be removed when nothing needs review"
        );
    }

    #[test]
    fn test_combined_draft_for_project() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = fixture(tmp.path(), Status::CreatedReports);
        prj.slm_combined_report = true;
        prj.status = Status::CreatedReports;
        // combined documents are keyed by project name and period
        save_scan_document(
            &scan_doc(),
            &scan_document_path(tmp.path(), "2024-05", "alpha", "alpha", "2024-05"),
        )
        .unwrap();

        let outcome = make_draft_findings_for_project(tmp.path(), "2024-05", &mut prj);
        assert_eq!(outcome, StageOutcome::Advanced);
        assert_eq!(prj.status, Status::MadeDraftFindings);
        let html = std::fs::read_to_string(
            report_folder(tmp.path(), "2024-05", "alpha").join("alpha-2024-05-DRAFT.html"),
        )
        .unwrap();
        assert!(html.contains("(all subprojects)"));
    }

    #[test]
    fn test_combined_draft_skipped_without_combined_report() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = fixture(tmp.path(), Status::CreatedReports);
        prj.slm_combined_report = false;
        prj.status = Status::CreatedReports;
        let outcome = make_draft_findings_for_project(tmp.path(), "2024-05", &mut prj);
        assert_eq!(outcome, StageOutcome::Skipped);
        assert_eq!(prj.status, Status::CreatedReports);
    }

    #[test]
    fn test_subproject_only_template_fires_per_scope() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = fixture(tmp.path(), Status::CreatedReports);
        prj.findings.push(FindingTemplate {
            id: 2,
            priority: Priority::VeryHigh,
            title: "Known exception".to_string(),
            text: "Carries a standing exception.".to_string(),
            matches_path: vec![],
            matches_license: vec![],
            matches_subproject: vec!["core".to_string()],
        });

        assert!(
            make_draft_findings_for_subproject(tmp.path(), "2024-05", &mut prj, "core").advanced()
        );
        let html = std::fs::read_to_string(
            report_folder(tmp.path(), "2024-05", "alpha").join("core-2024-05-03-DRAFT.html"),
        )
        .unwrap();
        assert!(html.contains("Known exception"));
        // VERYHIGH instance sorts ahead of the HIGH license finding
        let vh = html.find("Known exception").unwrap();
        let gpl = html.find("GPL content").unwrap();
        assert!(vh < gpl);
    }
}
