use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::types::{
    FindingTemplate, GerritHosting, GithubSharedHosting, GithubSubHosting, MatchAction,
    MatchActionKind, MatchRule, PolicyCategory, PolicyLicense, Priority, ProjectHosting, Status,
    SubprojectHosting,
};

/// Root entity for one reporting period. One JSON document per period holds
/// the whole pipeline state; the loader never raises on malformed content,
/// it returns a `Config` with `ok == false` so the caller can report what
/// was missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub ok: bool,
    pub month: String,
    pub version: i64,
    pub storepath: String,
    pub spdx_github_org: String,
    pub spdx_github_signoff: String,
    pub slm_home: String,
    pub web_server: String,
    pub web_reports_path: String,
    pub web_reports_url: String,
    pub projects: BTreeMap<String, Project>,
    /// Ticket-system credentials; loaded from a separate file and never
    /// written back into the config document.
    pub secrets: Option<Secrets>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ok: false,
            month: String::new(),
            version: -1,
            storepath: String::new(),
            spdx_github_org: String::new(),
            spdx_github_signoff: String::new(),
            slm_home: String::new(),
            web_server: String::new(),
            web_reports_path: String::new(),
            web_reports_url: String::new(),
            projects: BTreeMap::new(),
            secrets: None,
        }
    }
}

/// One tracked project inside a config document.
#[derive(Debug, Clone)]
pub struct Project {
    pub ok: bool,
    pub name: String,
    pub status: Status,
    pub hosting: ProjectHosting,
    pub subprojects: BTreeMap<String, Subproject>,
    pub matches: Vec<MatchRule>,
    pub findings: Vec<FindingTemplate>,
    pub flag_categories: Vec<String>,
    /// Whether license management is shared across this project's subprojects.
    pub slm_shared: bool,
    pub slm_prj: Option<String>,
    pub slm_combined_report: bool,
    /// Policy taxonomy: categories in declaration order, licenses within.
    pub categories: Vec<PolicyCategory>,
    pub thirdparty_dirs: Vec<String>,
    pub extensions_skip: Vec<String>,
    /// Combined-report web identifiers; only valid when
    /// `slm_combined_report` is set.
    pub web: WebLinks,
}

impl Project {
    pub fn new(name: &str) -> Self {
        Self {
            ok: true,
            name: name.to_string(),
            status: Status::Start,
            hosting: ProjectHosting::Unknown,
            subprojects: BTreeMap::new(),
            matches: Vec::new(),
            findings: Vec::new(),
            flag_categories: Vec::new(),
            slm_shared: true,
            slm_prj: None,
            slm_combined_report: false,
            categories: Vec::new(),
            thirdparty_dirs: Vec::new(),
            extensions_skip: Vec::new(),
            web: WebLinks::default(),
        }
    }
}

/// One subproject inside a project.
#[derive(Debug, Clone)]
pub struct Subproject {
    pub ok: bool,
    pub name: String,
    pub status: Status,
    pub hosting: SubprojectHosting,
    pub repos: Vec<String>,
    pub code: CodeState,
    /// Effective SLM project key ("" when the project is shared-SLM).
    pub slm_prj: String,
    pub slm_sp: String,
    pub slm_scan_id: i64,
    pub slm_pending_licenses: Vec<String>,
    pub web: WebLinks,
}

impl Subproject {
    pub fn new(name: &str, hosting: SubprojectHosting) -> Self {
        Self {
            ok: true,
            name: name.to_string(),
            status: Status::Start,
            hosting,
            repos: Vec::new(),
            code: CodeState::default(),
            slm_prj: String::new(),
            slm_sp: name.to_string(),
            slm_scan_id: -1,
            slm_pending_licenses: Vec::new(),
            web: WebLinks::default(),
        }
    }
}

/// Code-retrieval results for a subproject within the current period.
#[derive(Debug, Clone, Default)]
pub struct CodeState {
    /// Date the snapshot was pulled, "YYYY-MM-DD"; empty until GOTCODE.
    pub pulled: String,
    /// Path to the zipped snapshot.
    pub path: String,
    pub anyfiles: bool,
    /// repo name -> commit hash at pull time.
    pub repos: BTreeMap<String, String>,
}

/// Web-report identifiers for a subproject or combined project report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebLinks {
    pub uuid: String,
    pub html_url: String,
    pub xlsx_url: String,
}

impl WebLinks {
    pub fn is_empty(&self) -> bool {
        self.uuid.is_empty() && self.html_url.is_empty() && self.xlsx_url.is_empty()
    }
}

/// Ticket-system credentials, keyed by project name.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub jira: BTreeMap<String, JiraSecret>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JiraSecret {
    #[serde(default)]
    pub board: String,
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Secrets {
    /// Load credentials from `~/.clearance-secrets.json`, if present.
    pub fn load() -> Option<Self> {
        let home = std::env::var_os("HOME")?;
        Self::load_from(&Path::new(&home).join(".clearance-secrets.json"))
    }

    pub fn load_from(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<BTreeMap<String, JiraSecret>>(&content) {
            Ok(jira) => Some(Secrets { jira }),
            Err(e) => {
                eprintln!("Error loading or parsing {}: {e}", path.display());
                None
            }
        }
    }
}

/// Path of the config document for a period.
pub fn config_filename(home: &Path, month: &str) -> PathBuf {
    home.join(month).join("config.json")
}

/// Path of the optional per-project bulk-match sidecar file.
pub fn matches_filename(home: &Path, month: &str, prj_name: &str) -> PathBuf {
    home.join(month).join(format!("matches-{prj_name}.json"))
}

/// Path of the optional per-project findings-template sidecar file.
pub fn findings_filename(home: &Path, month: &str, prj_name: &str) -> PathBuf {
    home.join(month).join(format!("findings-{prj_name}.yaml"))
}

fn get_str(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn get_str_list(v: &Value, key: &str) -> Vec<String> {
    v.get(key)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Config {
    /// Load the config document for `month`, along with each project's
    /// sidecar files and the user's secrets file. Never returns an error:
    /// malformed content yields diagnostics on stderr and `ok == false` on
    /// the affected object.
    pub fn load(home: &Path, month: &str) -> Config {
        let path = config_filename(home, month);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading {}: {e}", path.display());
                return Config::default();
            }
        };
        let doc: Value = match serde_json::from_str(&content) {
            Ok(d) => d,
            Err(e) => {
                eprintln!("Error loading or parsing {}: {e}", path.display());
                return Config::default();
            }
        };

        let mut cfg = Config::from_document(&doc);
        cfg.secrets = Secrets::load();

        // sidecar files are optional; absence means empty lists
        for (name, prj) in cfg.projects.iter_mut() {
            let mpath = matches_filename(home, month, name);
            if mpath.is_file() {
                prj.matches = load_matches(&mpath);
            }
            let fpath = findings_filename(home, month, name);
            if fpath.is_file() {
                let (findings, flags) = load_findings_templates(&fpath);
                prj.findings = findings;
                prj.flag_categories = flags;
            }
        }

        cfg
    }

    /// Parse an already-read config document. Split out from `load` so the
    /// document semantics are testable without touching the filesystem.
    pub fn from_document(doc: &Value) -> Config {
        let mut cfg = Config::default();

        let config_dict = match doc.get("config") {
            Some(c) if c.is_object() => c,
            _ => {
                eprintln!("No config section found in config file");
                return cfg;
            }
        };

        cfg.month = get_str(config_dict, "month");
        if cfg.month.is_empty() {
            eprintln!("No valid month found in config section");
            return cfg;
        }
        cfg.version = config_dict
            .get("version")
            .and_then(Value::as_i64)
            .unwrap_or(-1);
        if cfg.version == -1 {
            eprintln!("No valid version found in config section");
            return cfg;
        }
        cfg.storepath = get_str(config_dict, "storepath");
        if cfg.storepath.is_empty() {
            eprintln!("No valid storepath found in config section");
            return cfg;
        }
        cfg.spdx_github_org = get_str(config_dict, "spdxGithubOrg");
        if cfg.spdx_github_org.is_empty() {
            eprintln!("No valid spdxGithubOrg found in config section");
            return cfg;
        }
        cfg.spdx_github_signoff = get_str(config_dict, "spdxGithubSignoff");
        if cfg.spdx_github_signoff.is_empty() {
            eprintln!("No valid spdxGithubSignoff found in config section");
            return cfg;
        }
        cfg.slm_home = config_dict
            .get("slm")
            .map(|slm| get_str(slm, "home"))
            .unwrap_or_default();
        if cfg.slm_home.is_empty() {
            eprintln!("No valid home found in slm section");
            return cfg;
        }
        cfg.web_server = get_str(config_dict, "webServer");
        if cfg.web_server.is_empty() {
            eprintln!("No valid webServer found in config section");
            return cfg;
        }
        cfg.web_reports_path = get_str(config_dict, "webReportsPath");
        if cfg.web_reports_path.is_empty() {
            eprintln!("No valid webReportsPath found in config section");
            return cfg;
        }
        cfg.web_reports_url = get_str(config_dict, "webReportsUrl");
        if cfg.web_reports_url.is_empty() {
            eprintln!("No valid webReportsUrl found in config section");
            return cfg;
        }

        // main config is valid; a missing projects section is a diagnostic
        // but the document still loads
        cfg.ok = true;

        let projects_dict = match doc.get("projects").and_then(Value::as_object) {
            Some(p) if !p.is_empty() => p,
            _ => {
                eprintln!("No projects found in config file");
                return cfg;
            }
        };

        for (prj_name, prj_dict) in projects_dict {
            let prj = parse_project(prj_name, prj_dict);
            cfg.projects.insert(prj_name.clone(), prj);
        }

        cfg
    }
}

fn parse_status(entity: &str, v: &Value, ok: &mut bool) -> Status {
    let status_str = get_str(v, "status");
    if status_str.is_empty() {
        return Status::Start;
    }
    match status_str.parse() {
        Ok(s) => s,
        Err(_) => {
            eprintln!("{entity} has invalid status value {status_str}");
            *ok = false;
            Status::Start
        }
    }
}

fn parse_project(prj_name: &str, prj_dict: &Value) -> Project {
    let mut prj = Project::new(prj_name);
    prj.status = parse_status(&format!("Project {prj_name}"), prj_dict, &mut prj.ok);

    let pt = get_str(prj_dict, "type");
    match pt.as_str() {
        "gerrit" => {
            let mut gerrit = GerritHosting::default();
            match prj_dict.get("gerrit") {
                Some(gerrit_dict) if gerrit_dict.is_object() => {
                    gerrit.api_url = get_str(gerrit_dict, "apiurl");
                    if gerrit.api_url.is_empty() {
                        eprintln!("Project {prj_name} has no apiurl data");
                        prj.ok = false;
                    }
                    // absent subproject-config means manually maintained
                    gerrit.subproject_config = get_str(gerrit_dict, "subproject-config");
                    if gerrit.subproject_config.is_empty() {
                        gerrit.subproject_config = "manual".to_string();
                    }
                    gerrit.repos_ignore = get_str_list(gerrit_dict, "repos-ignore");
                    gerrit.repos_pending = get_str_list(gerrit_dict, "repos-pending");
                }
                _ => {
                    eprintln!("Project {prj_name} has no gerrit data");
                    prj.ok = false;
                }
            }
            prj.hosting = ProjectHosting::Gerrit(gerrit);
            parse_project_slm(prj_dict, &mut prj);
            parse_project_web(prj_dict, &mut prj);
            parse_subprojects(prj_dict, &mut prj, false);
        }
        "github-shared" => {
            let mut shared = GithubSharedHosting::default();
            match prj_dict.get("github-shared") {
                Some(gs_dict) if gs_dict.is_object() => {
                    shared.org = get_str(gs_dict, "org");
                    if shared.org.is_empty() {
                        eprintln!("Project {prj_name} has no org data");
                        prj.ok = false;
                    }
                    shared.repos_ignore = get_str_list(gs_dict, "repos-ignore");
                    shared.repos_pending = get_str_list(gs_dict, "repos-pending");
                }
                _ => {
                    eprintln!("Project {prj_name} has no github-shared data");
                    prj.ok = false;
                }
            }
            prj.hosting = ProjectHosting::GithubShared(shared);
            parse_project_slm(prj_dict, &mut prj);
            parse_project_web(prj_dict, &mut prj);
            parse_subprojects(prj_dict, &mut prj, false);
        }
        "github" => {
            prj.hosting = ProjectHosting::Github;
            parse_project_slm(prj_dict, &mut prj);
            parse_project_web(prj_dict, &mut prj);
            // plain github projects must list their subprojects explicitly
            parse_subprojects(prj_dict, &mut prj, true);
        }
        _ => {
            eprintln!("Project {prj_name} has invalid or no repo type");
            prj.hosting = ProjectHosting::Unknown;
            prj.ok = false;
        }
    }

    prj
}

fn parse_project_slm(prj_dict: &Value, prj: &mut Project) {
    let slm_dict = match prj_dict.get("slm") {
        Some(s) if s.is_object() => s,
        _ => {
            eprintln!("Project {} has no slm data", prj.name);
            prj.ok = false;
            return;
        }
    };

    prj.slm_shared = slm_dict
        .get("shared")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let slm_prj = slm_dict.get("prj").and_then(Value::as_str);
    if !prj.slm_shared {
        if slm_prj.is_some() {
            eprintln!(
                "Project {} has slm:shared == false but also specifies slm:prj",
                prj.name
            );
            prj.ok = false;
        }
        prj.slm_prj = None;
    } else {
        match slm_prj {
            Some("") => {
                eprintln!(
                    "Project {} has slm:shared == true but explicitly has empty string for slm:prj",
                    prj.name
                );
                prj.ok = false;
                prj.slm_prj = None;
            }
            Some(p) => prj.slm_prj = Some(p.to_string()),
            // default to the project name if none was specified
            None => prj.slm_prj = Some(prj.name.clone()),
        }
    }

    prj.slm_combined_report = slm_dict
        .get("combinedReport")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if prj.slm_combined_report && !prj.slm_shared {
        eprintln!(
            "Project {} has slm:shared == false but also has slm:combinedReport == true",
            prj.name
        );
        prj.ok = false;
    }

    prj.thirdparty_dirs = get_str_list(slm_dict, "thirdparty-dirs");
    prj.extensions_skip = get_str_list(slm_dict, "extensions-skip");
    prj.categories = parse_policy_categories(slm_dict, &prj.name);
}

fn parse_policy_categories(slm_dict: &Value, prj_name: &str) -> Vec<PolicyCategory> {
    let mut cats = Vec::new();
    let Some(cat_arr) = slm_dict.get("categories").and_then(Value::as_array) else {
        return cats;
    };
    for cat_val in cat_arr {
        let name = get_str(cat_val, "name");
        if name.is_empty() {
            eprintln!("Project {prj_name} has a policy category with no name");
            continue;
        }
        let mut licenses = Vec::new();
        if let Some(lic_arr) = cat_val.get("licenses").and_then(Value::as_array) {
            for lic_val in lic_arr {
                let lic_name = get_str(lic_val, "name");
                if lic_name.is_empty() {
                    eprintln!("Project {prj_name} has a license with no name in category {name}");
                    continue;
                }
                licenses.push(PolicyLicense {
                    name: lic_name,
                    aliases: get_str_list(lic_val, "aliases"),
                });
            }
        }
        cats.push(PolicyCategory { name, licenses });
    }
    cats
}

fn parse_project_web(prj_dict: &Value, prj: &mut Project) {
    let web_dict = prj_dict.get("web").and_then(Value::as_object);
    // no web report data is fine (we may not have created it yet), but web
    // data on a project without a combined report is wrong
    if !prj.slm_combined_report {
        if web_dict.is_some_and(|w| !w.is_empty()) {
            eprintln!(
                "Project {} has web report data but has slm:combinedReport == false",
                prj.name
            );
            prj.ok = false;
        }
        return;
    }
    if let Some(web) = prj_dict.get("web") {
        prj.web.uuid = get_str(web, "uuid");
        prj.web.html_url = get_str(web, "htmlurl");
        prj.web.xlsx_url = get_str(web, "xlsxurl");
    }
}

fn parse_subprojects(prj_dict: &Value, prj: &mut Project, required: bool) {
    let sps = prj_dict.get("subprojects").and_then(Value::as_object);
    let sps = match sps {
        Some(m) if !m.is_empty() => m,
        _ => {
            if required {
                eprintln!("Project {} has no subprojects specified", prj.name);
                prj.ok = false;
            }
            return;
        }
    };

    for (sp_name, sp_dict) in sps {
        let sp = parse_subproject(sp_name, sp_dict, prj);
        prj.subprojects.insert(sp_name.clone(), sp);
    }
}

fn parse_subproject(sp_name: &str, sp_dict: &Value, prj: &mut Project) -> Subproject {
    let hosting = match &prj.hosting {
        ProjectHosting::Gerrit(_) => SubprojectHosting::Gerrit,
        ProjectHosting::GithubShared(_) => SubprojectHosting::GithubShared,
        ProjectHosting::Github => SubprojectHosting::Github(GithubSubHosting::default()),
        ProjectHosting::Unknown => SubprojectHosting::Unknown,
    };
    let mut sp = Subproject::new(sp_name, hosting);
    sp.status = parse_status(
        &format!("Subproject {sp_name} in project {}", prj.name),
        sp_dict,
        &mut sp.ok,
    );

    if let Some(code_dict) = sp_dict.get("code") {
        sp.code.pulled = get_str(code_dict, "pulled");
        sp.code.path = get_str(code_dict, "path");
        sp.code.anyfiles = code_dict
            .get("anyfiles")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if let Some(repos) = code_dict.get("repos").and_then(Value::as_object) {
            for (repo, commit) in repos {
                sp.code
                    .repos
                    .insert(repo.clone(), commit.as_str().unwrap_or("").to_string());
            }
        }
    }

    if let Some(web_dict) = sp_dict.get("web") {
        sp.web.uuid = get_str(web_dict, "uuid");
        sp.web.html_url = get_str(web_dict, "htmlurl");
        sp.web.xlsx_url = get_str(web_dict, "xlsxurl");
    }

    parse_subproject_slm(sp_dict, prj, &mut sp);

    match &mut sp.hosting {
        SubprojectHosting::Gerrit => {
            if let Some(g) = sp_dict.get("gerrit") {
                sp.repos = get_str_list(g, "repos");
            }
        }
        SubprojectHosting::GithubShared => match sp_dict.get("github-shared") {
            Some(gs) if gs.is_object() => {
                // no repos listed is fine, we'll find them later
                sp.repos = get_str_list(gs, "repos");
            }
            _ => {
                eprintln!(
                    "Subproject {sp_name} in project {} has no github-shared data",
                    prj.name
                );
                prj.ok = false;
            }
        },
        SubprojectHosting::Github(gh) => match sp_dict.get("github") {
            Some(gh_dict) if gh_dict.is_object() => {
                gh.org = get_str(gh_dict, "org");
                if gh.org.is_empty() {
                    eprintln!(
                        "Subproject {sp_name} in project {} has no org specified",
                        prj.name
                    );
                    sp.ok = false;
                }
                // no ziporg means use the org name for the zip layout
                gh.ziporg = get_str(gh_dict, "ziporg");
                if gh.ziporg.is_empty() {
                    gh.ziporg = gh.org.clone();
                }
                sp.repos = get_str_list(gh_dict, "repos");
                gh.repos_ignore = get_str_list(gh_dict, "repos-ignore");
                gh.repos_pending = get_str_list(gh_dict, "repos-pending");
            }
            _ => {
                eprintln!("Project {} has no github data", prj.name);
                prj.ok = false;
            }
        },
        SubprojectHosting::Unknown => {}
    }

    sp
}

fn parse_subproject_slm(sp_dict: &Value, prj: &Project, sp: &mut Subproject) {
    let slm_dict = match sp_dict.get("slm") {
        Some(s) if s.is_object() => s,
        _ => {
            // no slm section: for a non-shared project the subproject is its
            // own SLM project; under shared SLM the key is the project's
            if !prj.slm_shared {
                sp.slm_prj = sp.name.clone();
            }
            sp.slm_sp = sp.name.clone();
            sp.slm_scan_id = -1;
            sp.slm_pending_licenses = Vec::new();
            return;
        }
    };

    sp.slm_prj = get_str(slm_dict, "prj");
    if prj.slm_shared {
        if !sp.slm_prj.is_empty() {
            eprintln!(
                "Project {} has slm:shared == true but subproject {} specifies slm:prj",
                prj.name, sp.name
            );
            sp.ok = false;
        }
    } else if sp.slm_prj.is_empty() {
        sp.slm_prj = sp.name.clone();
    }

    sp.slm_sp = get_str(slm_dict, "sp");
    if sp.slm_sp.is_empty() {
        sp.slm_sp = sp.name.clone();
    }
    sp.slm_scan_id = slm_dict
        .get("scan_id")
        .and_then(Value::as_i64)
        .unwrap_or(-1);
    sp.slm_pending_licenses = get_str_list(slm_dict, "licenses-pending");
}

/// Load a bulk text-match sidecar file. Any structural violation discards
/// the whole file with a diagnostic; the project then has no matches.
pub fn load_matches(path: &Path) -> Vec<MatchRule> {
    #[derive(Deserialize)]
    struct MatchEntry {
        #[serde(default)]
        text: String,
        #[serde(default)]
        comment: String,
        #[serde(default)]
        actions: Vec<MatchActionEntry>,
    }
    #[derive(Deserialize)]
    struct MatchActionEntry {
        #[serde(default)]
        action: String,
        #[serde(default)]
        license: String,
    }

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading {}: {e}", path.display());
            return Vec::new();
        }
    };
    let entries: Vec<MatchEntry> = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error loading or parsing {}: {e}", path.display());
            return Vec::new();
        }
    };

    let mut matches = Vec::new();
    for entry in entries {
        if entry.text.is_empty() {
            eprintln!("No text value found in match section");
            return Vec::new();
        }
        if entry.actions.is_empty() {
            if entry.comment.is_empty() {
                eprintln!("No actions found in match section");
            } else {
                eprintln!("No actions found in match section with comment {}", entry.comment);
            }
            return Vec::new();
        }
        let mut actions = Vec::new();
        for a in entry.actions {
            let kind = match a.action.as_str() {
                "add" => MatchActionKind::Add,
                "remove" => MatchActionKind::Remove,
                other => {
                    eprintln!("Invalid action type {other} in match");
                    return Vec::new();
                }
            };
            if a.license.is_empty() {
                eprintln!("Invalid empty string for license in match");
                return Vec::new();
            }
            actions.push(MatchAction {
                kind,
                license: a.license,
            });
        }
        matches.push(MatchRule {
            text: entry.text,
            comment: entry.comment,
            actions,
        });
    }
    matches
}

/// Load a findings-template sidecar file. Returns (templates, flagged
/// categories); a template with all three match lists empty, or an unknown
/// priority string, invalidates the whole file.
pub fn load_findings_templates(path: &Path) -> (Vec<FindingTemplate>, Vec<String>) {
    #[derive(Deserialize)]
    struct FindingsFile {
        #[serde(default, rename = "flagCategories")]
        flag_categories: Vec<String>,
        #[serde(default)]
        findings: Vec<FindingEntry>,
    }
    #[derive(Deserialize)]
    struct FindingEntry {
        #[serde(default)]
        id: u32,
        #[serde(default)]
        title: String,
        #[serde(default)]
        text: String,
        #[serde(default, rename = "matches-path")]
        matches_path: Vec<String>,
        #[serde(default, rename = "matches-license")]
        matches_license: Vec<String>,
        #[serde(default, rename = "matches-subproject")]
        matches_subproject: Vec<String>,
        #[serde(default)]
        priority: String,
    }

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading {}: {e}", path.display());
            return (Vec::new(), Vec::new());
        }
    };
    let parsed: FindingsFile = match serde_yaml::from_str(&content) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error loading or parsing {}: {e}", path.display());
            return (Vec::new(), Vec::new());
        }
    };

    if parsed.flag_categories.is_empty() {
        eprintln!("No flagged categories specified in {}", path.display());
        return (Vec::new(), Vec::new());
    }
    if parsed.findings.is_empty() {
        eprintln!("No findings specified in {}", path.display());
        return (Vec::new(), Vec::new());
    }

    let mut templates = Vec::new();
    for (count, fd) in parsed.findings.into_iter().enumerate() {
        if fd.matches_path.is_empty()
            && fd.matches_license.is_empty()
            && fd.matches_subproject.is_empty()
        {
            eprintln!(
                "Finding {} in {} has no entries for matches-path, matches-license or matches-subproject",
                count + 1,
                path.display()
            );
            return (Vec::new(), Vec::new());
        }
        let priority: Priority = match fd.priority.parse() {
            Ok(p) => p,
            Err(_) => {
                eprintln!(
                    "Invalid priority value for finding {} in {}",
                    count + 1,
                    path.display()
                );
                return (Vec::new(), Vec::new());
            }
        };
        templates.push(FindingTemplate {
            id: fd.id,
            priority,
            title: fd.title,
            text: fd.text,
            matches_path: fd.matches_path,
            matches_license: fd.matches_license,
            matches_subproject: fd.matches_subproject,
        });
    }

    (templates, parsed.flag_categories)
}

impl Config {
    /// Serialize to the persisted document shape. Secrets are never
    /// emitted; repo lists come out sorted; empty optional blocks are
    /// omitted. Key order is deterministic for reproducible diffs.
    pub fn to_document(&self) -> Value {
        let mut projects = Map::new();
        for (name, prj) in &self.projects {
            projects.insert(name.clone(), project_to_value(prj));
        }

        json!({
            "config": {
                "storepath": self.storepath,
                "month": self.month,
                "version": self.version,
                "slm": { "home": self.slm_home },
                "spdxGithubOrg": self.spdx_github_org,
                "spdxGithubSignoff": self.spdx_github_signoff,
                "webServer": self.web_server,
                "webReportsPath": self.web_reports_path,
                "webReportsUrl": self.web_reports_url,
            },
            "projects": Value::Object(projects),
        })
    }

    /// Write the document to its period location.
    pub fn save(&self, home: &Path) -> Result<()> {
        let path = config_filename(home, &self.month);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let content = serde_json::to_string_pretty(&self.to_document())
            .expect("config document should be serializable");
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Copy the existing on-disk document to a period-scoped backup named
    /// after the current version, then bump the in-memory version. The
    /// bumped version is only written by the next `save` call; backup and
    /// save are two independent operations.
    pub fn backup(&mut self, home: &Path) -> Result<()> {
        let path = config_filename(home, &self.month);
        if path.is_file() {
            let backup_dir = home.join(&self.month).join("backup");
            std::fs::create_dir_all(&backup_dir)
                .with_context(|| format!("failed to create {}", backup_dir.display()))?;
            let backup_path = backup_dir.join(format!("config-{}.json", self.version));
            std::fs::copy(&path, &backup_path)
                .with_context(|| format!("failed to back up to {}", backup_path.display()))?;
        }
        self.version += 1;
        Ok(())
    }
}

fn slm_section(prj: &Project) -> Value {
    let mut slm = Map::new();
    if prj.slm_shared {
        slm.insert("shared".to_string(), json!(true));
        if let Some(ref p) = prj.slm_prj {
            slm.insert("prj".to_string(), json!(p));
        }
        slm.insert("combinedReport".to_string(), json!(prj.slm_combined_report));
    } else {
        slm.insert("shared".to_string(), json!(false));
    }
    if !prj.categories.is_empty() {
        let cats: Vec<Value> = prj
            .categories
            .iter()
            .map(|cat| {
                let lics: Vec<Value> = cat
                    .licenses
                    .iter()
                    .map(|lic| {
                        if lic.aliases.is_empty() {
                            json!({ "name": lic.name })
                        } else {
                            json!({ "name": lic.name, "aliases": lic.aliases })
                        }
                    })
                    .collect();
                json!({ "name": cat.name, "licenses": lics })
            })
            .collect();
        slm.insert("categories".to_string(), json!(cats));
    }
    if !prj.thirdparty_dirs.is_empty() {
        slm.insert("thirdparty-dirs".to_string(), json!(prj.thirdparty_dirs));
    }
    if !prj.extensions_skip.is_empty() {
        slm.insert("extensions-skip".to_string(), json!(prj.extensions_skip));
    }
    Value::Object(slm)
}

fn project_to_value(prj: &Project) -> Value {
    let mut out = Map::new();
    out.insert("type".to_string(), json!(prj.hosting.type_str()));
    out.insert("status".to_string(), json!(prj.status.to_string()));
    out.insert("slm".to_string(), slm_section(prj));

    if prj.slm_combined_report && !prj.web.is_empty() {
        out.insert(
            "web".to_string(),
            json!({
                "uuid": prj.web.uuid,
                "htmlurl": prj.web.html_url,
                "xlsxurl": prj.web.xlsx_url,
            }),
        );
    }

    match &prj.hosting {
        ProjectHosting::Gerrit(g) => {
            let mut ignore = g.repos_ignore.clone();
            ignore.sort();
            let mut pending = g.repos_pending.clone();
            pending.sort();
            out.insert(
                "gerrit".to_string(),
                json!({
                    "apiurl": g.api_url,
                    "subproject-config": g.subproject_config,
                    "repos-ignore": ignore,
                    "repos-pending": pending,
                }),
            );
        }
        ProjectHosting::GithubShared(gs) => {
            let mut ignore = gs.repos_ignore.clone();
            ignore.sort();
            let mut pending = gs.repos_pending.clone();
            pending.sort();
            out.insert(
                "github-shared".to_string(),
                json!({
                    "org": gs.org,
                    "repos-ignore": ignore,
                    "repos-pending": pending,
                }),
            );
        }
        ProjectHosting::Github | ProjectHosting::Unknown => {}
    }

    let mut sps = Map::new();
    for (name, sp) in &prj.subprojects {
        sps.insert(name.clone(), subproject_to_value(sp));
    }
    out.insert("subprojects".to_string(), Value::Object(sps));

    Value::Object(out)
}

fn subproject_to_value(sp: &Subproject) -> Value {
    let mut out = Map::new();
    out.insert("status".to_string(), json!(sp.status.to_string()));

    let mut slm = Map::new();
    slm.insert("sp".to_string(), json!(sp.slm_sp));
    if !sp.slm_prj.is_empty() {
        slm.insert("prj".to_string(), json!(sp.slm_prj));
    }
    if sp.slm_scan_id != -1 {
        slm.insert("scan_id".to_string(), json!(sp.slm_scan_id));
    }
    if !sp.slm_pending_licenses.is_empty() {
        slm.insert(
            "licenses-pending".to_string(),
            json!(sp.slm_pending_licenses),
        );
    }
    out.insert("slm".to_string(), Value::Object(slm));

    let mut code = Map::new();
    code.insert("anyfiles".to_string(), json!(sp.code.anyfiles));
    if !sp.code.pulled.is_empty() {
        code.insert("pulled".to_string(), json!(sp.code.pulled));
    }
    if !sp.code.path.is_empty() {
        code.insert("path".to_string(), json!(sp.code.path));
    }
    if !sp.code.repos.is_empty() {
        code.insert("repos".to_string(), json!(sp.code.repos));
    }
    out.insert("code".to_string(), Value::Object(code));

    if !sp.web.is_empty() {
        let mut web = Map::new();
        if !sp.web.uuid.is_empty() {
            web.insert("uuid".to_string(), json!(sp.web.uuid));
        }
        if !sp.web.html_url.is_empty() {
            web.insert("htmlurl".to_string(), json!(sp.web.html_url));
        }
        if !sp.web.xlsx_url.is_empty() {
            web.insert("xlsxurl".to_string(), json!(sp.web.xlsx_url));
        }
        out.insert("web".to_string(), Value::Object(web));
    }

    let mut repos = sp.repos.clone();
    repos.sort();
    match &sp.hosting {
        SubprojectHosting::Gerrit => {
            out.insert("gerrit".to_string(), json!({ "repos": repos }));
        }
        SubprojectHosting::GithubShared => {
            out.insert("github-shared".to_string(), json!({ "repos": repos }));
        }
        SubprojectHosting::Github(gh) => {
            let mut ignore = gh.repos_ignore.clone();
            ignore.sort();
            let mut github = Map::new();
            github.insert("org".to_string(), json!(gh.org));
            github.insert("ziporg".to_string(), json!(gh.ziporg));
            github.insert("repos".to_string(), json!(repos));
            github.insert("repos-ignore".to_string(), json!(ignore));
            if !gh.repos_pending.is_empty() {
                let mut pending = gh.repos_pending.clone();
                pending.sort();
                github.insert("repos-pending".to_string(), json!(pending));
            }
            out.insert("github".to_string(), Value::Object(github));
        }
        SubprojectHosting::Unknown => {}
    }

    Value::Object(out)
}
