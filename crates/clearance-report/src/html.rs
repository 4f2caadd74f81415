use clearance_core::scan::LicenseSummary;
use clearance_core::types::FindingsInstance;

/// Everything the findings document needs, already computed by the core
/// engines. `scope` is the subproject name or "(all subprojects)" for a
/// combined report; `code_date` is the pull date or the period id.
pub struct FindingsReportData<'a> {
    pub project: &'a str,
    pub scope: &'a str,
    pub code_date: &'a str,
    /// (repo name, short commit) pairs, sorted by repo name.
    pub repos: Vec<(String, String)>,
    pub instances: &'a [FindingsInstance],
    pub summary: &'a LicenseSummary,
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

const STYLE: &str = "\
body { font-family: sans-serif; margin: 2em; }
table { border-collapse: collapse; }
td, th { border: 1px solid #999; padding: 0.25em 0.75em; text-align: left; }
.finding { border: 1px solid #999; border-radius: 4px; padding: 0.5em 1em; margin: 1em 0; }
.priority { font-weight: bold; padding: 0.1em 0.5em; border-radius: 3px; color: #fff; }
.priority.veryhigh { background: #7b0000; }
.priority.high { background: #c0392b; }
.priority.medium { background: #d68910; }
.priority.low { background: #1e8449; }
.priority.unknown { background: #777; }
.filelist { font-family: monospace; font-size: 0.9em; }
";

/// Render the findings document as a standalone HTML page.
pub fn format_findings(data: &FindingsReportData) -> String {
    let mut out = String::new();

    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str(&format!(
        "<title>{}: license scan findings</title>\n",
        escape(data.project)
    ));
    out.push_str(&format!("<style>\n{STYLE}</style>\n</head>\n<body>\n"));

    out.push_str(&format!(
        "<h1>License scan findings: {} / {}</h1>\n",
        escape(data.project),
        escape(data.scope)
    ));
    out.push_str(&format!(
        "<p>Code pulled: {}</p>\n",
        escape(data.code_date)
    ));

    if !data.repos.is_empty() {
        out.push_str("<h2>Repositories</h2>\n<table>\n<tr><th>Repository</th><th>Commit</th></tr>\n");
        for (repo, commit) in &data.repos {
            out.push_str(&format!(
                "<tr><td>{}</td><td>{}</td></tr>\n",
                escape(repo),
                escape(commit)
            ));
        }
        out.push_str("</table>\n");
    }

    out.push_str("<h2>Findings</h2>\n");
    if data.instances.is_empty() {
        out.push_str("<p>No findings for this review cycle.</p>\n");
    }
    for inst in data.instances {
        let priority = inst.template.priority;
        out.push_str(&format!(
            "<div class=\"finding\">\n<span class=\"priority {}\">{}</span>\n",
            priority.short_label(),
            priority.full_label()
        ));
        out.push_str(&format!("<h3>{}</h3>\n", escape(&inst.template.title)));
        out.push_str(&format!("<p>{}</p>\n", escape(&inst.template.text)));
        if !inst.files.is_empty() {
            out.push_str(&format!("<p>{} file(s):</p>\n<ul class=\"filelist\">\n", inst.files.len()));
            for file in &inst.files {
                out.push_str(&format!("<li>{}</li>\n", escape(file)));
            }
            out.push_str("</ul>\n");
        }
        if !inst.subprojects.is_empty() {
            out.push_str("<p>Applies to subprojects: ");
            out.push_str(&escape(&inst.subprojects.join(", ")));
            out.push_str("</p>\n");
        }
        out.push_str("</div>\n");
    }

    out.push_str("<h2>License summary</h2>\n<table>\n<tr><th>Category / License</th><th>Files</th></tr>\n");
    for cat in &data.summary.categories {
        out.push_str(&format!(
            "<tr><th>{}</th><th>{}</th></tr>\n",
            escape(&cat.name),
            cat.num_files
        ));
        for lic in &cat.licenses {
            out.push_str(&format!(
                "<tr><td>&nbsp;&nbsp;{}</td><td>{}</td></tr>\n",
                escape(&lic.name),
                lic.num_files
            ));
        }
    }
    out.push_str(&format!(
        "<tr><th>Total</th><th>{}</th></tr>\n</table>\n",
        data.summary.total_files
    ));

    let s = data.summary;
    if s.no_license_thirdparty + s.no_license_empty + s.no_license_extension + s.no_license_rest > 0
    {
        out.push_str("<h3>Files with no license found</h3>\n<table>\n");
        out.push_str(&format!(
            "<tr><td>In third-party directories</td><td>{}</td></tr>\n",
            s.no_license_thirdparty
        ));
        out.push_str(&format!(
            "<tr><td>Empty files</td><td>{}</td></tr>\n",
            s.no_license_empty
        ));
        out.push_str(&format!(
            "<tr><td>Excluded file extensions</td><td>{}</td></tr>\n",
            s.no_license_extension
        ));
        out.push_str(&format!(
            "<tr><td>Remaining</td><td>{}</td></tr>\n",
            s.no_license_rest
        ));
        out.push_str("</table>\n");
    }

    out.push_str("</body>\n</html>\n");
    out
}
