use std::sync::Arc;

use clap::{Parser, Subcommand};
use coursesync::{
    AllowAll, Database, EngineConfig, EnvCredentialStore, Frequency, RunResult, SyncEngine,
    SyncPreference,
};

#[derive(Parser)]
#[command(name = "coursesync", about = "Sync course assignments into a task manager")]
struct Cli {
    /// Database path (default: ~/.coursesync/coursesync.db)
    #[arg(long)]
    db: Option<String>,

    /// User id to operate on (single-user installs can leave the default)
    #[arg(long, default_value = "1")]
    user: i64,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync now for a course
    Sync {
        /// Course id to sync
        course_id: String,
        /// Destination project id (default: the task manager's inbox)
        #[arg(long)]
        project: Option<String>,
    },
    /// Run the periodic scheduler
    Schedule {
        /// Run a single scheduling pass and exit
        #[arg(long)]
        once: bool,
    },
    /// Show recent sync runs
    History {
        /// Maximum runs to show
        #[arg(long, default_value = "20")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show aggregate sync statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete all sync history for the user
    Clear {
        /// Skip the confirmation check
        #[arg(long)]
        yes: bool,
    },
    /// Show or change sync preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },
    /// List active courses visible with the configured credentials
    Courses,
    /// List destination projects in the task manager
    Projects,
}

#[derive(Subcommand)]
enum PrefsAction {
    /// Show the current preferences
    Show,
    /// Update preferences; unspecified fields keep their current value
    Set {
        /// Enable or disable scheduled syncing
        #[arg(long)]
        enabled: Option<bool>,
        /// Sync frequency: hourly, daily, or weekly
        #[arg(long)]
        frequency: Option<String>,
        /// Course id to sync on schedule
        #[arg(long)]
        course: Option<String>,
        /// Destination project id
        #[arg(long)]
        project: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => Database::open_at(path).await?,
        None => Database::open().await?,
    };
    let engine = SyncEngine::new(
        db,
        Arc::new(EnvCredentialStore),
        Arc::new(AllowAll),
        EngineConfig::default(),
    );

    match cli.command {
        Commands::Sync { course_id, project } => {
            let result = engine
                .trigger_manual_sync(cli.user, &course_id, project.as_deref())
                .await?;
            print_run_result(&result);
        }
        Commands::Schedule { once } => {
            let scheduler = engine.scheduler();
            if once {
                let results = scheduler.tick(chrono::Utc::now()).await?;
                if results.is_empty() {
                    println!("No users due.");
                }
                for result in &results {
                    print_run_result(result);
                }
            } else {
                scheduler.run_forever().await;
            }
        }
        Commands::History { limit, json } => {
            let runs = engine.get_history(cli.user, limit).await?;
            if json {
                let rows: Vec<serde_json::Value> = runs
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "id": r.id,
                            "kind": r.kind,
                            "status": r.status,
                            "items_attempted": r.items_attempted,
                            "items_succeeded": r.items_succeeded,
                            "started_at": r.started_at,
                            "completed_at": r.completed_at,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if runs.is_empty() {
                println!("No sync runs recorded.");
            } else {
                for r in &runs {
                    println!(
                        "{} [{}] {} ({}/{} items)",
                        r.started_at,
                        r.kind.as_str(),
                        r.status.as_str(),
                        r.items_succeeded,
                        r.items_attempted,
                    );
                }
            }
        }
        Commands::Stats { json } => {
            let stats = engine.get_stats(cli.user).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Sync Statistics");
                println!("  Total runs:   {}", stats.total);
                println!("  Succeeded:    {}", stats.succeeded);
                println!("  Partial:      {}", stats.partial);
                println!("  Failed:       {}", stats.failed);
                println!("  Items synced: {}", stats.items_synced);
            }
        }
        Commands::Clear { yes } => {
            if !yes {
                anyhow::bail!("this deletes all sync history for user {}; re-run with --yes", cli.user);
            }
            let deleted = engine.clear_history(cli.user).await?;
            println!("Deleted {deleted} run(s).");
        }
        Commands::Prefs { action } => match action {
            PrefsAction::Show => {
                let pref = engine.get_preference(cli.user).await?;
                print_preference(&pref);
            }
            PrefsAction::Set {
                enabled,
                frequency,
                course,
                project,
            } => {
                let mut pref = engine.get_preference(cli.user).await?;
                if let Some(enabled) = enabled {
                    pref.enabled = enabled;
                }
                if let Some(raw) = frequency {
                    pref.frequency = raw.parse::<Frequency>()?;
                }
                if let Some(course) = course {
                    pref.course_id = Some(course);
                }
                if let Some(project) = project {
                    if !engine.verify_destination(cli.user, &project).await? {
                        anyhow::bail!("project {project} not found in the task manager");
                    }
                    pref.project_id = Some(project);
                }
                engine.set_preference(pref.clone()).await?;
                println!("Preferences updated.");
                print_preference(&pref);
            }
        },
        Commands::Courses => {
            let courses = engine.list_courses(cli.user).await?;
            if courses.is_empty() {
                println!("No active courses found.");
            }
            for c in &courses {
                match &c.term {
                    Some(term) => println!("{} {} ({term})", c.id, c.name),
                    None => println!("{} {}", c.id, c.name),
                }
            }
        }
        Commands::Projects => {
            let projects = engine.list_projects(cli.user).await?;
            if projects.is_empty() {
                println!("No projects found.");
            }
            for p in &projects {
                println!("{} {}", p.id, p.name);
            }
        }
    }

    Ok(())
}

fn print_run_result(result: &RunResult) {
    println!("Sync: {}", result.status.as_str());
    println!("  Attempted: {}", result.attempted);
    println!("  Succeeded: {}", result.succeeded);
    for failure in &result.failures {
        match failure.assignment_id {
            Some(id) => println!("  Failed assignment {id}: {}", failure.reason),
            None => println!("  Error: {}", failure.reason),
        }
    }
}

fn print_preference(pref: &SyncPreference) {
    println!("Preferences for user {}", pref.user_id);
    println!("  Enabled:   {}", pref.enabled);
    println!("  Frequency: {}", pref.frequency.as_str());
    println!(
        "  Course:    {}",
        pref.course_id.as_deref().unwrap_or("not set")
    );
    println!(
        "  Project:   {}",
        pref.project_id.as_deref().unwrap_or("inbox (default)")
    );
    println!(
        "  Last run:  {}",
        pref.last_run_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );
}
