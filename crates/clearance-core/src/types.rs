use std::fmt;

/// Pipeline progress for a project or subproject.
///
/// The variants up to `Delivered` form the linear workflow and are ordered
/// by declaration, so `<`/`>` compare pipeline advancement directly.
/// `Stopped` ranks above `Delivered` so a halted subproject never holds its
/// project back in rollup arithmetic. `Max` is only ever a rollup seed and
/// must not be assigned to a real entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    Start,
    GotListing,
    GotCode,
    UploadedCode,
    RanAgents,
    Cleared,
    GotSpdx,
    ImportedScan,
    CreatedReports,
    MadeDraftFindings,
    ApprovedFindings,
    MadeFinalFindings,
    UploadedSpdx,
    UploadedReports,
    Delivered,
    Stopped,
    Max,
}

impl Status {
    /// True for the out-of-band sentinels that never name a real pipeline stage.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Status::Max)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Start => "START",
            Status::GotListing => "GOTLISTING",
            Status::GotCode => "GOTCODE",
            Status::UploadedCode => "UPLOADEDCODE",
            Status::RanAgents => "RANAGENTS",
            Status::Cleared => "CLEARED",
            Status::GotSpdx => "GOTSPDX",
            Status::ImportedScan => "IMPORTEDSCAN",
            Status::CreatedReports => "CREATEDREPORTS",
            Status::MadeDraftFindings => "MADEDRAFTFINDINGS",
            Status::ApprovedFindings => "APPROVEDFINDINGS",
            Status::MadeFinalFindings => "MADEFINALFINDINGS",
            Status::UploadedSpdx => "UPLOADEDSPDX",
            Status::UploadedReports => "UPLOADEDREPORTS",
            Status::Delivered => "DELIVERED",
            Status::Stopped => "STOPPED",
            Status::Max => "MAX",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "START" => Ok(Status::Start),
            "GOTLISTING" => Ok(Status::GotListing),
            "GOTCODE" => Ok(Status::GotCode),
            "UPLOADEDCODE" => Ok(Status::UploadedCode),
            "RANAGENTS" => Ok(Status::RanAgents),
            "CLEARED" => Ok(Status::Cleared),
            "GOTSPDX" => Ok(Status::GotSpdx),
            "IMPORTEDSCAN" => Ok(Status::ImportedScan),
            "CREATEDREPORTS" => Ok(Status::CreatedReports),
            "MADEDRAFTFINDINGS" => Ok(Status::MadeDraftFindings),
            "APPROVEDFINDINGS" => Ok(Status::ApprovedFindings),
            "MADEFINALFINDINGS" => Ok(Status::MadeFinalFindings),
            "UPLOADEDSPDX" => Ok(Status::UploadedSpdx),
            "UPLOADEDREPORTS" => Ok(Status::UploadedReports),
            "DELIVERED" => Ok(Status::Delivered),
            "STOPPED" => Ok(Status::Stopped),
            _ => Err(anyhow::anyhow!("unknown status: {s}")),
        }
    }
}

/// Severity of a finding template, ordered lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Unknown,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl Priority {
    /// Compact label used in CSS classes and filenames.
    pub fn short_label(&self) -> &'static str {
        match self {
            Priority::VeryHigh => "veryhigh",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Unknown => "unknown",
        }
    }

    /// Human-readable label for rendered reports.
    pub fn full_label(&self) -> &'static str {
        match self {
            Priority::VeryHigh => "Very High",
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
            Priority::Unknown => "Unspecified",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "veryhigh" => Ok(Priority::VeryHigh),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            "unknown" => Ok(Priority::Unknown),
            _ => Err(anyhow::anyhow!("unknown priority: {s}")),
        }
    }
}

/// Repository hosting configuration for a project.
///
/// The hosting kinds are mutually exclusive, so the variant payload carries
/// only the fields that exist for that kind. Plain `Github` projects define
/// hosting per subproject instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectHosting {
    Gerrit(GerritHosting),
    Github,
    GithubShared(GithubSharedHosting),
    Unknown,
}

impl ProjectHosting {
    /// The `type` discriminator string used in the config document.
    pub fn type_str(&self) -> &'static str {
        match self {
            ProjectHosting::Gerrit(_) => "gerrit",
            ProjectHosting::Github => "github",
            ProjectHosting::GithubShared(_) => "github-shared",
            ProjectHosting::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GerritHosting {
    pub api_url: String,
    /// "manual" or "auto"; how the subproject list is maintained.
    pub subproject_config: String,
    pub repos_ignore: Vec<String>,
    pub repos_pending: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GithubSharedHosting {
    pub org: String,
    pub repos_ignore: Vec<String>,
    pub repos_pending: Vec<String>,
}

/// Repository hosting configuration for a subproject.
///
/// Gerrit and github-shared subprojects carry only the common repo list;
/// plain github subprojects have their own org-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubprojectHosting {
    Gerrit,
    Github(GithubSubHosting),
    GithubShared,
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GithubSubHosting {
    pub org: String,
    pub ziporg: String,
    pub repos_ignore: Vec<String>,
    pub repos_pending: Vec<String>,
}

/// A bulk text-match directive handed to the external scanning agents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRule {
    pub text: String,
    pub comment: String,
    pub actions: Vec<MatchAction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchAction {
    pub kind: MatchActionKind,
    pub license: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchActionKind {
    Add,
    Remove,
}

/// A configured rule describing content that warrants legal review.
///
/// At least one of the three match lists must be non-empty; the loader
/// rejects the whole template file otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindingTemplate {
    pub id: u32,
    pub priority: Priority,
    pub title: String,
    pub text: String,
    pub matches_path: Vec<String>,
    pub matches_license: Vec<String>,
    pub matches_subproject: Vec<String>,
}

impl FindingTemplate {
    /// True when only the subproject list is populated; such templates are
    /// evaluated per scope rather than against file triples.
    pub fn subproject_only(&self) -> bool {
        !self.matches_subproject.is_empty()
            && self.matches_path.is_empty()
            && self.matches_license.is_empty()
    }
}

/// A concrete match of a finding template against classified files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindingsInstance {
    pub template: FindingTemplate,
    pub files: Vec<String>,
    /// Populated only for combined-scope instances of subproject-only templates.
    pub subprojects: Vec<String>,
}

/// One license definition in the policy taxonomy. Alias strings resolve to
/// the canonical name before classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyLicense {
    pub name: String,
    pub aliases: Vec<String>,
}

/// One category in the policy taxonomy, holding its licenses in declaration
/// order. Category order is significant: it drives report ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyCategory {
    pub name: String,
    pub licenses: Vec<PolicyLicense>,
}

/// What a pipeline stage invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage ran and the entity status advanced.
    Advanced,
    /// The entity was not at the stage's expected status; nothing happened.
    WrongStage,
    /// Idempotence guard: the work product already exists; nothing happened.
    Skipped,
    /// The stage ran and failed; status is unchanged and the operation is
    /// safe to re-run.
    Failed,
}

impl StageOutcome {
    pub fn advanced(&self) -> bool {
        matches!(self, StageOutcome::Advanced)
    }
}
