use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::config::Project;
use crate::scan::{
    save_scan_document, scan_document_path, FileFindings, ScanCategory, ScanFile, ScanLicense,
    NO_LICENSE_FOUND,
};
use crate::types::{PolicyCategory, StageOutcome, Status};

/// MD5 of zero bytes; the external scanner hashes file contents, so an
/// empty file always arrives with exactly this digest.
pub const EMPTY_FILE_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

/// One discovered (license, file) record handed over by the external scan.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawRecord {
    pub path: String,
    pub license: String,
    #[serde(default)]
    pub md5: String,
}

/// Classification failed because the policy is incomplete. Expected to
/// self-heal once a human adds the licenses to the taxonomy.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("licenses missing from policy taxonomy: {0:?}")]
    PendingLicenses(Vec<String>),
}

/// Path of the raw scan record file the external SPDX/scan parse produces.
pub fn raw_records_path(
    store: &Path,
    month: &str,
    prj_name: &str,
    sp_name: &str,
    pulled: &str,
) -> PathBuf {
    store
        .join(month)
        .join("spdx")
        .join(prj_name)
        .join(format!("{sp_name}-{pulled}.json"))
}

/// Read raw scan records. An unreadable file is a hard failure.
pub fn load_raw_records(path: &Path) -> Result<Vec<RawRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Alias table over a taxonomy: every alias string maps to its license's
/// canonical name. The first taxonomy entry claiming an alias wins.
pub fn build_alias_table(categories: &[PolicyCategory]) -> HashMap<String, String> {
    let mut aliases = HashMap::new();
    for cat in categories {
        for lic in &cat.licenses {
            for alias in &lic.aliases {
                aliases.entry(alias.clone()).or_insert_with(|| lic.name.clone());
            }
        }
    }
    aliases
}

/// Rewrite each record's license through the alias table. Records whose
/// license has no alias entry are left unchanged, so applying this twice
/// is the same as applying it once.
pub fn apply_aliases(aliases: &HashMap<String, String>, records: &mut [RawRecord]) {
    for rec in records {
        if let Some(canonical) = aliases.get(&rec.license) {
            rec.license = canonical.clone();
        }
    }
}

/// Compiled file-extension skip patterns. Three kinds share one list in
/// the config: a trailing `*` means "contains anywhere in the path", a
/// trailing `=` means "exact filename", anything else is an extension
/// suffix. All matching is case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct SkipPatterns {
    suffixes: Vec<String>,
    contains: Vec<String>,
    exact: Vec<String>,
}

impl SkipPatterns {
    pub fn new(patterns: &[String]) -> Self {
        let mut compiled = SkipPatterns::default();
        for pattern in patterns {
            if let Some(stripped) = pattern.strip_suffix('*') {
                compiled.contains.push(stripped.to_lowercase());
            } else if let Some(stripped) = pattern.strip_suffix('=') {
                compiled.exact.push(stripped.to_lowercase());
            } else {
                compiled.suffixes.push(pattern.to_lowercase());
            }
        }
        compiled
    }

    pub fn matches(&self, path: &str) -> bool {
        let lower = path.to_lowercase();
        let ext = Path::new(&lower)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        if !ext.is_empty() && self.suffixes.iter().any(|s| s == ext) {
            return true;
        }
        if self.contains.iter().any(|c| lower.contains(c.as_str())) {
            return true;
        }
        let filename = Path::new(&lower)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("");
        self.exact.iter().any(|e| e == filename)
    }
}

/// Compute the sub-findings for a "No license found" record. Each flag is
/// evaluated independently; a file may carry several at once.
fn no_license_findings(
    rec: &RawRecord,
    skip: &SkipPatterns,
    thirdparty_dirs: &[String],
) -> FileFindings {
    let mut findings = FileFindings::default();
    if skip.matches(&rec.path) {
        findings.extension = true;
    }
    if thirdparty_dirs.iter().any(|d| rec.path.contains(d.as_str())) {
        findings.thirdparty = true;
    }
    if rec.md5 == EMPTY_FILE_MD5 {
        findings.emptyfile = true;
    }
    findings
}

/// Bucket raw scan records into the policy taxonomy.
///
/// Builds one output category per taxonomy category and one license bucket
/// per taxonomy license, in taxonomy order, so ordering is stable before
/// zero-count buckets are pruned. A record whose resolved license appears
/// in no category is collected into the pending set; any pending license
/// fails the whole classification.
pub fn classify_records(
    categories: &[PolicyCategory],
    thirdparty_dirs: &[String],
    extensions_skip: &[String],
    records: &[RawRecord],
) -> Result<Vec<ScanCategory>, ClassifyError> {
    let aliases = build_alias_table(categories);
    let mut records: Vec<RawRecord> = records.to_vec();
    apply_aliases(&aliases, &mut records);

    let skip = SkipPatterns::new(extensions_skip);

    // license -> (category index, license index), first owning category wins
    let mut index: HashMap<&str, (usize, usize)> = HashMap::new();
    let mut buckets: Vec<ScanCategory> = Vec::with_capacity(categories.len());
    for (ci, cat) in categories.iter().enumerate() {
        let mut bucket = ScanCategory::new(&cat.name);
        for (li, lic) in cat.licenses.iter().enumerate() {
            bucket.licenses.push(ScanLicense::new(&lic.name));
            index.entry(lic.name.as_str()).or_insert((ci, li));
        }
        buckets.push(bucket);
    }

    let mut missing: Vec<String> = Vec::new();
    for rec in &records {
        let findings = if rec.license == NO_LICENSE_FOUND {
            no_license_findings(rec, &skip, thirdparty_dirs)
        } else {
            FileFindings::default()
        };
        match index.get(rec.license.as_str()) {
            Some(&(ci, li)) => {
                let cat = &mut buckets[ci];
                cat.num_files += 1;
                let lic = &mut cat.licenses[li];
                lic.num_files += 1;
                lic.files.push(ScanFile {
                    path: rec.path.clone(),
                    findings,
                });
            }
            None => {
                if !missing.contains(&rec.license) {
                    missing.push(rec.license.clone());
                }
            }
        }
    }

    if !missing.is_empty() {
        return Err(ClassifyError::PendingLicenses(missing));
    }

    // prune empty buckets, preserving relative order
    buckets.retain(|cat| cat.num_files > 0);
    for cat in &mut buckets {
        cat.licenses.retain(|lic| lic.num_files > 0);
    }
    Ok(buckets)
}

/// Stage runner: import the raw scan for one subproject, classify it
/// against the project policy, and write the classified-scan document.
/// Advances GOTSPDX -> IMPORTEDSCAN on full success only; an incomplete
/// policy records the pending licenses and leaves status unchanged.
pub fn import_scan_for_subproject(
    store: &Path,
    month: &str,
    prj: &mut Project,
    sp_name: &str,
) -> StageOutcome {
    let Project {
        name: prj_name,
        categories,
        thirdparty_dirs,
        extensions_skip,
        subprojects,
        ..
    } = prj;
    let Some(sp) = subprojects.get_mut(sp_name) else {
        eprintln!("{prj_name}: no subproject named {sp_name}");
        return StageOutcome::Failed;
    };

    if sp.status != Status::GotSpdx {
        eprintln!(
            "{prj_name}/{sp_name}: status is {}, won't import scan now",
            sp.status
        );
        return StageOutcome::WrongStage;
    }

    let raw_path = raw_records_path(store, month, prj_name, sp_name, &sp.code.pulled);
    let records = match load_raw_records(&raw_path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{prj_name}/{sp_name}: {e:#}");
            return StageOutcome::Failed;
        }
    };

    match classify_records(categories, thirdparty_dirs, extensions_skip, &records) {
        Ok(classified) => {
            sp.slm_pending_licenses.clear();
            let doc_path = scan_document_path(store, month, prj_name, sp_name, &sp.code.pulled);
            if let Err(e) = save_scan_document(&classified, &doc_path) {
                eprintln!("{prj_name}/{sp_name}: {e:#}");
                return StageOutcome::Failed;
            }
            sp.status = Status::ImportedScan;
            StageOutcome::Advanced
        }
        Err(ClassifyError::PendingLicenses(missing)) => {
            sp.slm_pending_licenses = missing;
            eprintln!(
                "{prj_name}/{sp_name}: need to add licenses to categories, see licenses-pending"
            );
            StageOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Subproject;
    use crate::scan::load_scan_document;
    use crate::types::{PolicyLicense, SubprojectHosting};

    fn taxonomy() -> Vec<PolicyCategory> {
        vec![
            PolicyCategory {
                name: "Permissive".to_string(),
                licenses: vec![
                    PolicyLicense {
                        name: "MIT".to_string(),
                        aliases: vec!["Expat".to_string(), "MIT License".to_string()],
                    },
                    PolicyLicense {
                        name: "Apache-2.0".to_string(),
                        aliases: vec![],
                    },
                ],
            },
            PolicyCategory {
                name: "Other".to_string(),
                licenses: vec![PolicyLicense {
                    name: NO_LICENSE_FOUND.to_string(),
                    aliases: vec![],
                }],
            },
        ]
    }

    fn record(path: &str, license: &str) -> RawRecord {
        RawRecord {
            path: path.to_string(),
            license: license.to_string(),
            md5: "0123456789abcdef0123456789abcdef".to_string(),
        }
    }

    #[test]
    fn test_single_record_classifies() {
        // taxonomy {Permissive: [MIT]}, one MIT file
        let cats = vec![PolicyCategory {
            name: "Permissive".to_string(),
            licenses: vec![PolicyLicense {
                name: "MIT".to_string(),
                aliases: vec![],
            }],
        }];
        let out = classify_records(&cats, &[], &[], &[record("a.txt", "MIT")]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "Permissive");
        assert_eq!(out[0].num_files, 1);
        assert_eq!(out[0].licenses.len(), 1);
        assert_eq!(out[0].licenses[0].files[0].path, "a.txt");
    }

    #[test]
    fn test_empty_taxonomy_reports_pending() {
        let err = classify_records(&[], &[], &[], &[record("b.c", "GPL-2.0")]).unwrap_err();
        let ClassifyError::PendingLicenses(missing) = err;
        assert_eq!(missing, vec!["GPL-2.0"]);
    }

    #[test]
    fn test_alias_resolution() {
        let out = classify_records(
            &taxonomy(),
            &[],
            &[],
            &[record("a.c", "Expat"), record("b.c", "MIT License")],
        )
        .unwrap();
        assert_eq!(out[0].licenses[0].name, "MIT");
        assert_eq!(out[0].licenses[0].num_files, 2);
    }

    #[test]
    fn test_alias_application_is_idempotent() {
        let aliases = build_alias_table(&taxonomy());
        let mut once = vec![record("a.c", "Expat"), record("b.c", "Apache-2.0")];
        apply_aliases(&aliases, &mut once);
        let mut twice = once.clone();
        apply_aliases(&aliases, &mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_first_category_claims_shared_license() {
        let mut cats = taxonomy();
        // second category also declares MIT; the first declaration wins
        cats[1].licenses.push(PolicyLicense {
            name: "MIT".to_string(),
            aliases: vec![],
        });
        let out = classify_records(&cats, &[], &[], &[record("a.c", "MIT")]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "Permissive");
    }

    #[test]
    fn test_completeness_file_counts_sum_to_record_count() {
        let records = vec![
            record("a.c", "MIT"),
            record("b.c", "Apache-2.0"),
            record("c.c", "Expat"),
            record("d.c", NO_LICENSE_FOUND),
        ];
        let out = classify_records(&taxonomy(), &[], &[], &records).unwrap();
        let total: usize = out
            .iter()
            .flat_map(|c| c.licenses.iter())
            .map(|l| l.num_files)
            .sum();
        assert_eq!(total, records.len());
        let cat_total: usize = out.iter().map(|c| c.num_files).sum();
        assert_eq!(cat_total, records.len());
    }

    #[test]
    fn test_pruning_leaves_no_zero_counts() {
        let out = classify_records(&taxonomy(), &[], &[], &[record("a.c", "MIT")]).unwrap();
        for cat in &out {
            assert!(cat.num_files > 0);
            for lic in &cat.licenses {
                assert!(lic.num_files > 0);
            }
        }
        // the Other category had no files and must be gone entirely
        assert!(!out.iter().any(|c| c.name == "Other"));
    }

    #[test]
    fn test_skip_patterns_three_kinds() {
        let skip = SkipPatterns::new(&[
            "png".to_string(),
            ".gitignore=".to_string(),
            "node_modules*".to_string(),
        ]);
        assert!(skip.matches("assets/Logo.PNG"), "extension suffix");
        assert!(skip.matches("pkg/.gitignore"), "exact filename");
        assert!(
            skip.matches("web/node_modules/left-pad/index.js"),
            "contains anywhere"
        );
        assert!(!skip.matches("src/main.rs"));
        assert!(
            !skip.matches("notes/gitignore-tips.txt"),
            "exact pattern must not match as substring"
        );
    }

    #[test]
    fn test_no_license_subfindings_are_independent() {
        let mut rec = record("vendor/empty.png", NO_LICENSE_FOUND);
        rec.md5 = EMPTY_FILE_MD5.to_string();
        let skip = SkipPatterns::new(&["png".to_string()]);
        let findings = no_license_findings(&rec, &skip, &["vendor/".to_string()]);
        assert!(findings.extension);
        assert!(findings.thirdparty);
        assert!(findings.emptyfile);
    }

    #[test]
    fn test_licensed_file_gets_no_subfindings() {
        let mut rec = record("vendor/lib.png", "MIT");
        rec.md5 = EMPTY_FILE_MD5.to_string();
        let out = classify_records(
            &taxonomy(),
            &["vendor/".to_string()],
            &["png".to_string()],
            &[rec],
        )
        .unwrap();
        assert!(out[0].licenses[0].files[0].findings.is_empty());
    }

    fn stage_fixture(store: &Path) -> Project {
        let mut prj = Project::new("alpha");
        prj.categories = taxonomy();
        prj.thirdparty_dirs = vec!["vendor/".to_string()];
        let mut sp = Subproject::new("core", SubprojectHosting::Gerrit);
        sp.status = Status::GotSpdx;
        sp.code.pulled = "2024-05-03".to_string();
        prj.subprojects.insert("core".to_string(), sp);

        let raw = raw_records_path(store, "2024-05", "alpha", "core", "2024-05-03");
        std::fs::create_dir_all(raw.parent().unwrap()).unwrap();
        std::fs::write(
            &raw,
            serde_json::to_string(&serde_json::json!([
                { "path": "src/a.c", "license": "MIT", "md5": "11112222333344445555666677778888" }
            ]))
            .unwrap(),
        )
        .unwrap();
        prj
    }

    #[test]
    fn test_import_stage_advances_and_writes_document() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = stage_fixture(tmp.path());

        let outcome = import_scan_for_subproject(tmp.path(), "2024-05", &mut prj, "core");
        assert_eq!(outcome, StageOutcome::Advanced);
        assert_eq!(prj.subprojects["core"].status, Status::ImportedScan);

        let doc = scan_document_path(tmp.path(), "2024-05", "alpha", "core", "2024-05-03");
        let cats = load_scan_document(&doc).unwrap();
        assert_eq!(cats.len(), 1);
        assert_eq!(cats[0].name, "Permissive");
    }

    #[test]
    fn test_import_stage_wrong_status_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = stage_fixture(tmp.path());
        prj.subprojects.get_mut("core").unwrap().status = Status::Cleared;

        let outcome = import_scan_for_subproject(tmp.path(), "2024-05", &mut prj, "core");
        assert_eq!(outcome, StageOutcome::WrongStage);
        assert_eq!(prj.subprojects["core"].status, Status::Cleared);
    }

    #[test]
    fn test_import_stage_rerun_after_advance_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = stage_fixture(tmp.path());
        assert!(import_scan_for_subproject(tmp.path(), "2024-05", &mut prj, "core").advanced());
        let outcome = import_scan_for_subproject(tmp.path(), "2024-05", &mut prj, "core");
        assert_eq!(outcome, StageOutcome::WrongStage);
        assert_eq!(prj.subprojects["core"].status, Status::ImportedScan);
    }

    #[test]
    fn test_import_stage_pending_licenses_blocks_advance() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = stage_fixture(tmp.path());
        prj.categories = vec![];

        let outcome = import_scan_for_subproject(tmp.path(), "2024-05", &mut prj, "core");
        assert_eq!(outcome, StageOutcome::Failed);
        let sp = &prj.subprojects["core"];
        assert_eq!(sp.status, Status::GotSpdx, "stage must not advance");
        assert_eq!(sp.slm_pending_licenses, vec!["MIT"]);
    }

    #[test]
    fn test_import_stage_clears_stale_pending_on_success() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = stage_fixture(tmp.path());
        prj.subprojects
            .get_mut("core")
            .unwrap()
            .slm_pending_licenses = vec!["BSL-1.1".to_string()];

        assert!(import_scan_for_subproject(tmp.path(), "2024-05", &mut prj, "core").advanced());
        assert!(prj.subprojects["core"].slm_pending_licenses.is_empty());
    }

    #[test]
    fn test_import_stage_missing_raw_records_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prj = stage_fixture(tmp.path());
        prj.subprojects.get_mut("core").unwrap().code.pulled = "2024-05-09".to_string();

        let outcome = import_scan_for_subproject(tmp.path(), "2024-05", &mut prj, "core");
        assert_eq!(outcome, StageOutcome::Failed);
        assert_eq!(prj.subprojects["core"].status, Status::GotSpdx);
    }
}
