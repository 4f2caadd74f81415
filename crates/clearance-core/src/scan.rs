use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Sentinel license name the scanners emit when a file carries no license
/// information at all.
pub const NO_LICENSE_FOUND: &str = "No license found";

fn is_false(b: &bool) -> bool {
    !*b
}

/// Sub-findings attached to a "No license found" file. More than one may be
/// set at once; summary counting buckets each file into exactly one via
/// [`LicenseSummary`] precedence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFindings {
    #[serde(default, skip_serializing_if = "is_false")]
    pub extension: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub thirdparty: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub emptyfile: bool,
}

impl FileFindings {
    pub fn is_empty(&self) -> bool {
        !self.extension && !self.thirdparty && !self.emptyfile
    }
}

/// One classified file in the scan document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFile {
    pub path: String,
    #[serde(default, skip_serializing_if = "FileFindings::is_empty")]
    pub findings: FileFindings,
}

/// One license bucket inside a category, in taxonomy order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLicense {
    pub name: String,
    #[serde(rename = "numFiles")]
    pub num_files: usize,
    pub files: Vec<ScanFile>,
}

impl ScanLicense {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            num_files: 0,
            files: Vec::new(),
        }
    }
}

/// One category bucket in the classified-scan document, in taxonomy order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCategory {
    pub name: String,
    #[serde(rename = "numFiles")]
    pub num_files: usize,
    pub licenses: Vec<ScanLicense>,
}

impl ScanCategory {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            num_files: 0,
            licenses: Vec::new(),
        }
    }
}

/// Read a classified-scan document. An unreadable or unparseable document
/// is a hard failure, distinct from a readable document with no content.
pub fn load_scan_document(path: &Path) -> Result<Vec<ScanCategory>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Write a classified-scan document.
pub fn save_scan_document(categories: &[ScanCategory], path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let content =
        serde_json::to_string_pretty(categories).expect("scan document should be serializable");
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

/// Per-project folder for report artifacts within a period.
pub fn report_folder(store: &Path, month: &str, prj_name: &str) -> PathBuf {
    store.join(month).join("report").join(prj_name)
}

/// Path of a classified-scan document. `scope` is a subproject name, or the
/// project name for a combined document; `pulled` is the code pull date for
/// subproject scope and the period id for combined scope.
pub fn scan_document_path(
    store: &Path,
    month: &str,
    prj_name: &str,
    scope: &str,
    pulled: &str,
) -> PathBuf {
    report_folder(store, month, prj_name).join(format!("{scope}-{pulled}.json"))
}

/// A flattened (category, license, file) triple from a scan document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CatLicFile {
    pub category: String,
    pub license: String,
    pub path: String,
}

/// Flatten a scan document into triples, globally sorted by
/// (category, license, file) so downstream matching is deterministic.
pub fn flatten_sorted(categories: &[ScanCategory]) -> Vec<CatLicFile> {
    let mut triples = Vec::new();
    for cat in categories {
        for lic in &cat.licenses {
            for file in &lic.files {
                triples.push(CatLicFile {
                    category: cat.name.clone(),
                    license: lic.name.clone(),
                    path: file.path.clone(),
                });
            }
        }
    }
    triples.sort();
    triples
}

/// Load a scan document and flatten it in one step.
pub fn load_cat_lic_files(path: &Path) -> Result<Vec<CatLicFile>> {
    Ok(flatten_sorted(&load_scan_document(path)?))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseCount {
    pub name: String,
    pub num_files: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
    pub name: String,
    pub num_files: usize,
    pub licenses: Vec<LicenseCount>,
}

/// File-count summary over a scan document, for report rendering. Each
/// "No license found" file lands in exactly one of the four no-license
/// buckets: third-party wins over empty, empty over extension, extension
/// over rest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LicenseSummary {
    pub categories: Vec<CategoryCount>,
    pub total_files: usize,
    pub no_license_thirdparty: usize,
    pub no_license_empty: usize,
    pub no_license_extension: usize,
    pub no_license_rest: usize,
}

pub fn summarize(categories: &[ScanCategory]) -> LicenseSummary {
    let mut summary = LicenseSummary::default();

    for cat in categories {
        if cat.num_files == 0 {
            continue;
        }
        summary.total_files += cat.num_files;
        let mut licenses = Vec::new();
        for lic in &cat.licenses {
            if lic.num_files == 0 {
                continue;
            }
            licenses.push(LicenseCount {
                name: lic.name.clone(),
                num_files: lic.num_files,
            });
            if lic.name == NO_LICENSE_FOUND {
                for file in &lic.files {
                    if file.findings.thirdparty {
                        summary.no_license_thirdparty += 1;
                    } else if file.findings.emptyfile {
                        summary.no_license_empty += 1;
                    } else if file.findings.extension {
                        summary.no_license_extension += 1;
                    } else {
                        summary.no_license_rest += 1;
                    }
                }
            }
        }
        summary.categories.push(CategoryCount {
            name: cat.name.clone(),
            num_files: cat.num_files,
            licenses,
        });
    }

    summary
}
