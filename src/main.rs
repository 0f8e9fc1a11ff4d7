use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use floto::api::{Backend, Owned};
use floto::jobs::{CheckOutcome, JobCoordinator};
use floto::notifications::create_notifier;
use floto::timing::{AdvancedForm, OnDemandForm, TimingDescriptor};
use floto::{config, context, logging};
use serde::Serialize;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "floto")]
#[command(about = "Schedule jobs on a managed device fleet", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Serialize)]
struct GlobalArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    api_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    project: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    json_logs: Option<bool>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    Config,
    #[command(subcommand)]
    Jobs(JobsCommand),
    /// List devices eligible for an application
    Devices {
        #[arg(long)]
        application: Option<String>,
        #[arg(long, default_value = "")]
        search: String,
    },
    #[command(subcommand)]
    Timing(TimingCommand),
}

#[derive(Subcommand)]
enum JobsCommand {
    List,
    Show {
        uuid: String,
    },
    /// Check devices and timings for conflicts without creating a job
    Check(JobArgs),
    Create(JobArgs),
    Delete {
        uuid: String,
    },
}

#[derive(Args)]
struct JobArgs {
    #[arg(long)]
    application: String,

    #[arg(long = "device")]
    devices: Vec<String>,

    /// Use the devices of a saved collection
    #[arg(long, conflicts_with = "devices")]
    collection: Option<String>,

    /// Timing wire string, e.g. type=on_demand,days=0,hours=2,minutes=0
    #[arg(long = "timing")]
    timings: Vec<String>,

    /// Add an on-demand timing expiring at this time
    #[arg(long)]
    expires: Option<DateTime<Utc>>,

    /// Environment override as KEY=VALUE
    #[arg(long = "env")]
    env: Vec<String>,

    #[arg(long)]
    public: bool,
}

#[derive(Subcommand)]
enum TimingCommand {
    /// Validate and encode an on-demand timing
    OnDemand {
        #[arg(long)]
        until: DateTime<Utc>,
    },
    /// Validate and encode an advanced timing
    Advanced {
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
    },
    /// Parse a timing wire string
    Parse { value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::AppConfig::new(Some(&cli.global)).context("Failed to load config")?;
    logging::init(logging::LogConfig::from(&config));

    match cli.command {
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Timing(cmd) => run_timing(cmd),
        Commands::Jobs(cmd) => {
            let ctx = connect(config)?;
            let coordinator = ctx.coordinator(create_notifier());
            run_jobs(&ctx, &coordinator, cmd).await
        }
        Commands::Devices {
            application,
            search,
        } => {
            let coordinator = connect(config)?.coordinator(create_notifier());
            run_devices(&coordinator, application, &search).await
        }
    }
}

fn connect(config: config::AppConfig) -> Result<context::AppContext> {
    context::AppContext::new(config).context("Failed to create API client")
}

fn run_timing(cmd: TimingCommand) -> Result<()> {
    let now = Utc::now();
    let (status, descriptor) = match cmd {
        TimingCommand::OnDemand { until } => {
            let mut form = OnDemandForm::new(until);
            let status = form.status(now);
            (status, form.descriptor())
        }
        TimingCommand::Advanced { start, end } => {
            let mut form = AdvancedForm::new(start, end);
            let status = form.status(now);
            (status, form.descriptor())
        }
        TimingCommand::Parse { value } => {
            let timing: TimingDescriptor = value.parse().context("Invalid timing string")?;
            let slot = timing.timeslot(now);
            println!("{} timing", timing.kind());
            println!("  would run {} .. {}", slot.start, slot.stop);
            return Ok(());
        }
    };

    println!("{}", status.message);
    match descriptor {
        Some(timing) if status.addable => {
            println!("{timing}");
            Ok(())
        }
        _ => bail!("Timing cannot be added"),
    }
}

async fn run_jobs(
    ctx: &context::AppContext,
    coordinator: &JobCoordinator,
    cmd: JobsCommand,
) -> Result<()> {
    let user = ctx.config.user_email.as_deref().unwrap_or_default();
    match cmd {
        JobsCommand::List => {
            let jobs = ctx.backend.list_jobs().await.context("Failed to get jobs")?;
            for job in jobs {
                let owner = if job.is_owned_by(user) { "*" } else { " " };
                println!(
                    "{owner} {}  app={}  devices={}  timings={}",
                    job.uuid,
                    job.application,
                    job.devices.len(),
                    job.timings.len()
                );
            }
            Ok(())
        }
        JobsCommand::Show { uuid } => {
            let job = ctx.backend.get_job(&uuid).await.context("Failed to get job")?;
            println!("{}", job.uuid);
            println!("  application: {}", job.application);
            println!("  created by:  {}", job.created_by.as_deref().unwrap_or("-"));
            for device in &job.devices {
                println!("  device:      {}", device.device_uuid);
            }
            for (timing, slots) in job.timing_timeslots() {
                println!("  timing:      {timing}");
                for slot in slots {
                    println!("    {} .. {}", slot.start, slot.stop);
                }
            }
            Ok(())
        }
        JobsCommand::Check(args) => {
            prepare_form(coordinator, args).await?;
            report_check(coordinator.check_form().await.context("Conflict check failed")?);
            Ok(())
        }
        JobsCommand::Create(args) => {
            prepare_form(coordinator, args).await?;
            match coordinator.check_form().await {
                Ok(outcome) => report_check(outcome),
                Err(e) => eprintln!("Conflict check unavailable: {e}"),
            }
            let job = coordinator.submit().await?;
            println!("{}", job.uuid);
            Ok(())
        }
        JobsCommand::Delete { uuid } => {
            coordinator.delete_job(&uuid).await?;
            Ok(())
        }
    }
}

async fn run_devices(
    coordinator: &JobCoordinator,
    application: Option<String>,
    search: &str,
) -> Result<()> {
    coordinator.load().await;
    if let Some(application) = application {
        coordinator.select_application(&application).await?;
        if let Some(app) = coordinator.catalog().await.application(&application) {
            println!("Devices eligible for {}", app.label());
        }
    }
    for device in coordinator.eligible_devices(search).await {
        println!("{}  {}", device.uuid, device.device_name);
    }
    Ok(())
}

/// Fill the coordinator's form from command-line arguments.
async fn prepare_form(coordinator: &JobCoordinator, args: JobArgs) -> Result<()> {
    let errors = coordinator.load().await;
    if errors.contains_key("applications") {
        bail!("Could not get applications: {}", errors["applications"]);
    }
    coordinator.select_application(&args.application).await?;

    let mut timings = Vec::with_capacity(args.timings.len());
    for raw in &args.timings {
        let timing: TimingDescriptor = raw
            .parse()
            .with_context(|| format!("Invalid timing '{raw}'"))?;
        timings.push(timing);
    }

    let now = Utc::now();
    coordinator
        .update_form(|form| -> Result<()> {
            form.is_public = args.public;
            for timing in &timings {
                form.timings.push_descriptor(timing);
            }
            if let Some(expires) = args.expires {
                form.timings
                    .add_on_demand(&mut OnDemandForm::new(expires), now)?;
            }
            for pair in &args.env {
                let (key, value) = pair
                    .split_once('=')
                    .with_context(|| format!("Expected KEY=VALUE, got '{pair}'"))?;
                form.environment
                    .insert(key.to_string(), Value::String(value.to_string()));
            }
            Ok(())
        })
        .await?;

    // Selecting devices triggers the first conflict check
    match args.collection {
        Some(collection) => {
            coordinator.select_collection(&collection).await?;
        }
        None => {
            coordinator.select_devices(args.devices).await;
        }
    }
    Ok(())
}

fn report_check(outcome: CheckOutcome) {
    match outcome {
        CheckOutcome::Applied(result) => {
            for (timing, slots) in &result.timeslots {
                for slot in slots {
                    let clashes = result.devices_conflicting_with(slot);
                    if clashes.is_empty() {
                        println!("{timing}: {} .. {}", slot.start, slot.stop);
                    } else {
                        println!(
                            "{timing}: {} .. {}  conflicts: {}",
                            slot.start,
                            slot.stop,
                            clashes.join(", ")
                        );
                    }
                }
            }
            if result.has_conflicts() {
                for device in result.conflicting_devices() {
                    println!("conflict on device {device}");
                }
            } else {
                println!("no conflicts");
            }
        }
        CheckOutcome::Stale { .. } => {}
    }
}
