use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::config::{CodeState, Config, Project, Subproject, WebLinks};
use crate::types::Status;

/// Set a project's status to the minimum-advancement status among its
/// subprojects. The `Max` sentinel seeds the fold; a project with no
/// subprojects rolls up to `Start`. Runs after every subproject stage
/// transition, before the project is considered to have advanced.
pub fn rollup_project_status(prj: &mut Project) -> Status {
    let mut min_status = Status::Max;
    for sp in prj.subprojects.values() {
        if sp.status < min_status {
            min_status = sp.status;
        }
    }
    if min_status == Status::Max {
        min_status = Status::Start;
    }
    prj.status = min_status;
    min_status
}

/// Clear a subproject's period-scoped state: status back to `Start`, code
/// retrieval results, scan linkage, and web identifiers. Taxonomy, hosting
/// configuration, and repo lists persist across periods.
pub fn reset_subproject_for_new_period(sp: &mut Subproject) {
    sp.status = Status::Start;
    sp.code = CodeState::default();
    sp.slm_scan_id = -1;
    sp.slm_pending_licenses.clear();
    sp.web = WebLinks::default();
}

/// Reset a project and all of its subprojects for a new reporting period.
pub fn reset_project_for_new_period(prj: &mut Project) {
    prj.status = Status::Start;
    prj.web = WebLinks::default();
    for sp in prj.subprojects.values_mut() {
        reset_subproject_for_new_period(sp);
    }
}

/// Roll the whole config over to a new period: every project resets and
/// the version counter starts over for the new document.
pub fn start_new_period(cfg: &mut Config, period: &str) {
    cfg.month = period.to_string();
    cfg.version = 1;
    for prj in cfg.projects.values_mut() {
        reset_project_for_new_period(prj);
    }
}

/// Parse a "YYYY-MM" period identifier into (year, month).
pub fn parse_period(period: &str) -> Result<(i32, u32)> {
    let (y, m) = period
        .split_once('-')
        .with_context(|| format!("invalid period '{period}', expected YYYY-MM"))?;
    let year: i32 = y
        .parse()
        .with_context(|| format!("invalid year in period '{period}'"))?;
    let month: u32 = m
        .parse()
        .with_context(|| format!("invalid month in period '{period}'"))?;
    NaiveDate::from_ymd_opt(year, month, 1)
        .with_context(|| format!("period '{period}' is not a real month"))?;
    Ok((year, month))
}

/// The period immediately after `period`.
pub fn next_period(period: &str) -> Result<String> {
    let (year, month) = parse_period(period)?;
    let (y, m) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    Ok(format!("{y:04}-{m:02}"))
}

/// The period immediately before `period`.
pub fn prior_period(period: &str) -> Result<String> {
    let (year, month) = parse_period(period)?;
    let (y, m) = if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    };
    Ok(format!("{y:04}-{m:02}"))
}
