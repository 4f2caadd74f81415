use std::collections::HashSet;

use crate::scan::CatLicFile;
use crate::types::{FindingTemplate, FindingsInstance};

/// Scope identifier for a combined (cross-subproject) analysis.
pub const COMBINED_SCOPE: &str = "COMBINED";

/// Match finding templates against classified (category, license, file)
/// triples for one scope.
///
/// Returns (instances, review list). A project with no templates yields
/// empty lists; hard failures (the triple source was unreadable) are the
/// caller's to signal, before this runs. Instances come out sorted by
/// template priority, highest first; equal priorities keep template
/// declaration order.
pub fn analyze_instances(
    templates: &[FindingTemplate],
    flag_categories: &[String],
    triples: &[CatLicFile],
    scope: &str,
) -> (Vec<FindingsInstance>, Vec<CatLicFile>) {
    let mut instances: Vec<FindingsInstance> = Vec::new();

    if templates.is_empty() {
        return (instances, Vec::new());
    }

    // templates with a path or license predicate match against triples;
    // subproject-only templates are handled per scope below
    for tmpl in templates {
        if tmpl.subproject_only() {
            continue;
        }

        let mut files: Vec<String> = Vec::new();
        for triple in triples {
            // each non-empty predicate list must match; empty lists are
            // vacuously satisfied
            if !tmpl.matches_subproject.is_empty()
                && !tmpl
                    .matches_subproject
                    .iter()
                    .any(|s| triple.path.contains(s.as_str()))
            {
                continue;
            }
            if !tmpl.matches_path.is_empty()
                && !tmpl
                    .matches_path
                    .iter()
                    .any(|p| triple.path.contains(p.as_str()))
            {
                continue;
            }
            if !tmpl.matches_license.is_empty()
                && !tmpl.matches_license.iter().any(|l| l == &triple.license)
            {
                continue;
            }
            // one instance per template per scope; later files append
            files.push(triple.path.clone());
        }

        if !files.is_empty() {
            instances.push(FindingsInstance {
                template: tmpl.clone(),
                files,
                subprojects: Vec::new(),
            });
        }
    }

    // flagged-category files matched by no instance need manual review
    let matched: HashSet<&str> = instances
        .iter()
        .flat_map(|inst| inst.files.iter())
        .map(String::as_str)
        .collect();
    let mut need_review: Vec<CatLicFile> = Vec::new();
    for triple in triples {
        if flag_categories.contains(&triple.category) && !matched.contains(triple.path.as_str()) {
            need_review.push(triple.clone());
        }
    }

    // subproject-only templates fire once per applicable scope; at combined
    // scope they always apply and carry their subproject list
    for tmpl in templates {
        if !tmpl.subproject_only() {
            continue;
        }
        if scope == COMBINED_SCOPE || tmpl.matches_subproject.iter().any(|s| s == scope) {
            let subprojects = if scope == COMBINED_SCOPE {
                tmpl.matches_subproject.clone()
            } else {
                Vec::new()
            };
            instances.push(FindingsInstance {
                template: tmpl.clone(),
                files: Vec::new(),
                subprojects,
            });
        }
    }

    // stable sort: ties keep encounter order
    instances.sort_by_key(|inst| std::cmp::Reverse(inst.template.priority));

    (instances, need_review)
}
