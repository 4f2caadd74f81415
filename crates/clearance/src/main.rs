use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use clearance_core::classify::import_scan_for_subproject;
use clearance_core::config::{config_filename, Config, Project};
use clearance_core::rollup::{next_period, parse_period, rollup_project_status, start_new_period};
use clearance_report::stages;
use clearance_report::text;

#[derive(Parser)]
#[command(name = "clearance")]
#[command(about = "Coordinate license-compliance reviews across tracked projects")]
#[command(version)]
struct Cli {
    /// Home directory holding the per-period config documents
    #[arg(long, env = "CLEARANCE_HOME", global = true)]
    home: Option<PathBuf>,

    /// Reporting period, YYYY-MM (defaults to the current month)
    #[arg(long, global = true)]
    month: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the pipeline status of every project and subproject
    Status,
    /// Load the config document and report validation diagnostics
    Validate,
    /// Import and classify raw scan results for subprojects at GOTSPDX
    Classify {
        /// Project to classify (all projects when omitted)
        #[arg(short, long)]
        project: Option<String>,
        /// Single subproject to classify
        #[arg(short, long, requires = "project")]
        subproject: Option<String>,
    },
    /// Create draft findings documents
    Draft {
        #[arg(short, long)]
        project: Option<String>,
        #[arg(short, long, requires = "project")]
        subproject: Option<String>,
    },
    /// Approve draft findings so final documents can be generated
    Approve {
        #[arg(short, long)]
        project: Option<String>,
        #[arg(short, long, requires = "project")]
        subproject: Option<String>,
    },
    /// Create final findings documents for approved drafts
    Final {
        #[arg(short, long)]
        project: Option<String>,
        #[arg(short, long, requires = "project")]
        subproject: Option<String>,
    },
    /// Start a new reporting period from the current document
    Newmonth {
        /// New period id, YYYY-MM (defaults to the month after --month)
        period: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = run(cli);
    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(2);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let home = cli
        .home
        .context("no home directory given; pass --home or set CLEARANCE_HOME")?;
    let month = match cli.month {
        Some(m) => m,
        None => chrono::Local::now().format("%Y-%m").to_string(),
    };

    match cli.command {
        Commands::Status => {
            let cfg = Config::load(&home, &month);
            print!("{}", text::format_status(&cfg));
            Ok(0)
        }
        Commands::Validate => {
            let cfg = Config::load(&home, &month);
            print!("{}", text::format_status(&cfg));
            let all_ok = cfg.ok
                && cfg.projects.values().all(|prj| {
                    prj.ok && prj.subprojects.values().all(|sp| sp.ok)
                });
            Ok(if all_ok { 0 } else { 1 })
        }
        Commands::Classify {
            project,
            subproject,
        } => run_stage(&home, &month, project, subproject, StageKind::Classify),
        Commands::Draft {
            project,
            subproject,
        } => run_stage(&home, &month, project, subproject, StageKind::Draft),
        Commands::Approve {
            project,
            subproject,
        } => run_stage(&home, &month, project, subproject, StageKind::Approve),
        Commands::Final {
            project,
            subproject,
        } => run_stage(&home, &month, project, subproject, StageKind::Final),
        Commands::Newmonth { period } => cmd_newmonth(&home, &month, period),
    }
}

#[derive(Clone, Copy)]
enum StageKind {
    Classify,
    Draft,
    Approve,
    Final,
}

fn run_stage(
    home: &Path,
    month: &str,
    project: Option<String>,
    subproject: Option<String>,
    kind: StageKind,
) -> Result<i32> {
    let mut cfg = load_valid_config(home, month)?;
    let store = PathBuf::from(&cfg.storepath);

    let targets: Vec<String> = match &project {
        Some(p) => {
            if !cfg.projects.contains_key(p) {
                anyhow::bail!("no project named {p} in {month}");
            }
            vec![p.clone()]
        }
        None => cfg.projects.keys().cloned().collect(),
    };

    let before = cfg.to_document();
    let mut advanced_any = false;
    for prj_name in &targets {
        let prj = cfg
            .projects
            .get_mut(prj_name)
            .expect("target project was checked above");

        advanced_any |= run_stage_for_project(&store, month, prj, subproject.as_deref(), kind);
        rollup_project_status(prj);
    }

    // persist any entity change, including recorded pending licenses on a
    // failed classification, without bumping the version on pure no-ops
    if cfg.to_document() != before {
        cfg.backup(home)?;
        cfg.save(home)?;
    }

    if advanced_any {
        Ok(0)
    } else {
        eprintln!("nothing to do");
        Ok(1)
    }
}

fn run_stage_for_project(
    store: &Path,
    month: &str,
    prj: &mut Project,
    subproject: Option<&str>,
    kind: StageKind,
) -> bool {
    let mut advanced = false;

    // the combined document precedes the per-subproject runs so its stage
    // gate still sees the project's pre-rollup status
    if matches!(kind, StageKind::Draft) && prj.slm_combined_report {
        advanced |= stages::make_draft_findings_for_project(store, month, prj).advanced();
    }
    if matches!(kind, StageKind::Final) && prj.slm_combined_report {
        advanced |= stages::make_final_findings_for_project(store, month, prj).advanced();
    }

    let sp_names: Vec<String> = match subproject {
        Some(sp) => vec![sp.to_string()],
        None => prj.subprojects.keys().cloned().collect(),
    };

    for sp_name in &sp_names {
        let outcome = match kind {
            StageKind::Classify => import_scan_for_subproject(store, month, prj, sp_name),
            StageKind::Draft => {
                stages::make_draft_findings_for_subproject(store, month, prj, sp_name)
            }
            StageKind::Approve => stages::approve_findings_for_subproject(prj, sp_name),
            StageKind::Final => {
                stages::make_final_findings_for_subproject(store, month, prj, sp_name)
            }
        };
        advanced |= outcome.advanced();
    }

    advanced
}

fn cmd_newmonth(home: &Path, month: &str, period: Option<String>) -> Result<i32> {
    let mut cfg = load_valid_config(home, month)?;

    let new_period = match period {
        Some(p) => {
            parse_period(&p)?;
            p
        }
        None => next_period(&cfg.month)?,
    };

    let target = config_filename(home, &new_period);
    if target.exists() {
        eprintln!(
            "{} already exists; remove it to restart the period",
            target.display()
        );
        return Ok(1);
    }

    start_new_period(&mut cfg, &new_period);
    cfg.save(home)?;
    println!("Started period {new_period}");
    Ok(0)
}

fn load_valid_config(home: &Path, month: &str) -> Result<Config> {
    let cfg = Config::load(home, month);
    if !cfg.ok {
        anyhow::bail!(
            "config document for {month} failed validation; run 'clearance validate' for details"
        );
    }
    Ok(cfg)
}
