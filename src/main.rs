// src/main.rs
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use serde::Serialize;

use dedupe_lib::merging::MergeFieldPolicy;
use dedupe_lib::models::{DuplicateGroupDetail, GroupStatus};
use dedupe_lib::store::PgDuplicateStore;
use dedupe_lib::utils::db_connect::{connect, get_pool_status, DbSettings};
use dedupe_lib::utils::dedupe_config::DedupeConfig;
use dedupe_lib::utils::env::load_env;
use dedupe_lib::utils::progress_config::ProgressConfig;
use dedupe_lib::{DedupeError, DuplicateService};

#[derive(Parser)]
#[command(author, version, about = "Find, review and merge duplicate CRM leads", long_about = None)]
struct Cli {
    /// Print results as JSON instead of log lines
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Scope {
    /// Organization that owns the leads
    #[arg(long)]
    org: i64,

    /// Restrict to one workspace of the organization
    #[arg(long)]
    workspace: Option<i64>,
}

#[derive(Subcommand)]
enum Command {
    /// Find duplicate groups and save them as pending
    Detect {
        #[command(flatten)]
        scope: Scope,

        /// Minimum group confidence (0.0-1.0); defaults to DEDUPE_MIN_CONFIDENCE
        #[arg(long)]
        min_confidence: Option<f64>,

        /// Report what would be found without saving
        #[arg(long)]
        dry_run: bool,
    },
    /// List duplicate groups, most confident first
    Groups {
        #[command(flatten)]
        scope: Scope,

        /// pending, merged or ignored
        #[arg(long)]
        status: Option<GroupStatus>,
    },
    /// Show one group with its member leads
    Show {
        #[arg(long)]
        org: i64,
        group_id: i64,
    },
    /// Merge a pending group into its canonical lead (deletes the other leads)
    Merge {
        #[arg(long)]
        org: i64,
        group_id: i64,

        /// Lead that survives the merge
        #[arg(long)]
        canonical: i64,

        /// Per-field strategy override, e.g. --field address=most_recent
        #[arg(long = "field", value_name = "FIELD=STRATEGY")]
        fields: Vec<String>,
    },
    /// Close a pending group without merging
    Ignore {
        #[arg(long)]
        org: i64,
        group_id: i64,
    },
    /// Group counts by status
    Stats {
        #[command(flatten)]
        scope: Scope,
    },
}

#[derive(Serialize)]
struct MergeResponse {
    success: bool,
    canonical_lead_id: i64,
    message: String,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn log_group(detail: &DuplicateGroupDetail) {
    let group = &detail.group;
    info!(
        "Group {} [{}] {} confidence {:.3}, {} members{}",
        group.id,
        group.status,
        group.match_reason,
        group.confidence_score,
        detail.members.len(),
        group
            .canonical_lead_id
            .map(|id| format!(", canonical lead {}", id))
            .unwrap_or_default()
    );
    for m in &detail.members {
        match &m.lead {
            Some(lead) => info!(
                "   lead {}: '{}' website={} emails={:?}",
                lead.id,
                lead.name,
                lead.website.as_deref().unwrap_or("-"),
                lead.emails
            ),
            None => info!("   lead {}: (deleted)", m.member.lead_id),
        }
    }
}

/// Process exit status for a failed command.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<DedupeError>() {
        Some(DedupeError::InvalidArgument(_)) => 2,
        Some(DedupeError::NotFound { .. }) => 3,
        Some(DedupeError::Conflict(_)) => 4,
        Some(DedupeError::TransientStorage(_)) => 75,
        None => 1,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = DedupeConfig::from_env();
    config.log_config();
    let progress = ProgressConfig::from_env();

    // Validate merge overrides before touching the database.
    let merge_policy = match &cli.command {
        Command::Merge { fields, .. } if !fields.is_empty() => Some(MergeFieldPolicy::from_assignments(fields.as_slice())?),
        _ => None,
    };

    let pool = connect(&DbSettings::from_env())
        .await
        .context("Failed to connect to database")?;
    let (total, idle, in_use) = get_pool_status(&pool);
    info!("Pool status: {} connections ({} idle, {} in use)", total, idle, in_use);

    let service = DuplicateService::new(PgDuplicateStore::new(pool), config);

    match cli.command {
        Command::Detect {
            scope,
            min_confidence,
            dry_run,
        } => {
            let spinner = progress.spinner("Detecting duplicate leads...");
            let result = if dry_run {
                service
                    .preview(scope.org, scope.workspace, min_confidence)
                    .await
                    .map(|(leads_scanned, outcome)| {
                        info!(
                            "Dry run: {} groups across {} leads, nothing saved",
                            outcome.groups.len(),
                            leads_scanned
                        );
                        serde_json::to_value(&outcome.groups)
                    })
            } else {
                service
                    .detect(scope.org, scope.workspace, min_confidence)
                    .await
                    .map(|summary| serde_json::to_value(&summary))
            };
            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }
            let value = result?.context("Failed to serialize detection result")?;
            if cli.json {
                print_json(&value)?;
            }
        }
        Command::Groups { scope, status } => {
            let groups = service.list_groups(scope.org, scope.workspace, status).await?;
            if cli.json {
                print_json(&groups)?;
            } else {
                info!("{} duplicate groups", groups.len());
                groups.iter().for_each(log_group);
            }
        }
        Command::Show { org, group_id } => {
            let detail = service.get_group(org, group_id).await?;
            if cli.json {
                print_json(&detail)?;
            } else {
                log_group(&detail);
            }
        }
        Command::Merge {
            org,
            group_id,
            canonical,
            ..
        } => {
            let lead = service.merge(org, group_id, canonical, merge_policy).await?;
            let response = MergeResponse {
                success: true,
                canonical_lead_id: lead.id,
                message: format!("Duplicate group {} merged into lead {}", group_id, lead.id),
            };
            if cli.json {
                print_json(&response)?;
            } else {
                info!("{}", response.message);
            }
        }
        Command::Ignore { org, group_id } => {
            let group = service.ignore(org, group_id).await?;
            if cli.json {
                print_json(&group)?;
            }
        }
        Command::Stats { scope } => {
            let stats = service.stats(scope.org, scope.workspace).await?;
            if cli.json {
                print_json(&stats)?;
            } else {
                info!(
                    "Groups: {} total, {} pending, {} merged, {} ignored; {} member rows",
                    stats.total_groups,
                    stats.pending_groups,
                    stats.merged_groups,
                    stats.ignored_groups,
                    stats.total_duplicates
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
    load_env();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(exit_code(&e));
    }
}
