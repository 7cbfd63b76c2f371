mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use hd_agents::context::Env;
use hd_agents::resolver::{self, Overrides};
use hd_core::config::HordeConfig;
use hd_core::events::EventKind;
use hd_core::types::{CleanupStatus, RoleKind};
use hd_telemetry::logging::{self, LogFormat, LogOptions};
use tracing::Instrument;

use crate::commands::Invocation;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// horde -- run a fleet of AI coding agents inside one encampment.
#[derive(Parser)]
#[command(name = "hd", version, about)]
struct Cli {
    /// Emit diagnostics as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    /// Log at debug level, ignoring RUST_LOG.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lay out a new encampment.
    Install {
        /// Directory to create the encampment in.
        path: PathBuf,
        /// Encampment name (defaults to the directory name).
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        owner: Option<String>,
    },

    /// Manage warbands (project repositories).
    #[command(subcommand)]
    Rig(RigCommand),

    /// Put a work item on an agent's hook.
    Charge {
        /// Work item id.
        item: String,
        /// Empty for yourself, a warband for a fresh raider, or an identity.
        target: Option<String>,
        /// Take the item from its current holder.
        #[arg(long)]
        force: bool,
        /// Spawn the named raider when it does not exist.
        #[arg(long)]
        create: bool,
        /// Hook only; do not start or nudge the session.
        #[arg(long)]
        no_start: bool,
    },

    /// Release a hook.
    Unsling {
        item: Option<String>,
        /// Identity whose hook to release (defaults to yours).
        target: Option<String>,
        #[arg(long)]
        force: bool,
    },

    /// Finish the work on your hook.
    Done {
        /// COMPLETED, ESCALATED or DEFERRED.
        #[arg(long)]
        status: Option<String>,
        #[arg(long, requires = "gate")]
        phase_complete: bool,
        #[arg(long)]
        gate: Option<String>,
        /// Source item (defaults to the branch, then the hook).
        #[arg(long)]
        issue: Option<String>,
        /// Override the detected worktree state.
        #[arg(long)]
        cleanup_status: Option<CleanupStatus>,
    },

    /// Manage raiders, the ephemeral workers.
    #[command(subcommand)]
    Raider(RaiderCommand),

    /// Manage crew, the long-lived workers.
    #[command(subcommand)]
    Crew(CrewCommand),

    /// Track batches of work across warbands.
    #[command(subcommand)]
    Raid(RaidCommand),

    /// Agent-to-agent messages.
    #[command(subcommand)]
    Drums(DrumsCommand),

    /// Query or follow the lifecycle log.
    Log(LogArgs),

    /// Save or restore a snapshot of work in flight.
    #[command(subcommand)]
    Checkpoint(CheckpointCommand),

    /// Inspect role resolution.
    #[command(subcommand)]
    Role(RoleCommand),

    #[command(hide = true)]
    Callback {
        #[command(subcommand)]
        hook: CallbackCommand,
    },
}

impl Commands {
    fn operation(&self) -> &'static str {
        match self {
            Commands::Install { .. } => "install",
            Commands::Rig(_) => "rig",
            Commands::Charge { .. } => "charge",
            Commands::Unsling { .. } => "unsling",
            Commands::Done { .. } => "done",
            Commands::Raider(_) => "raider",
            Commands::Crew(_) => "crew",
            Commands::Raid(_) => "raid",
            Commands::Drums(_) => "drums",
            Commands::Log(_) => "log",
            Commands::Checkpoint(_) => "checkpoint",
            Commands::Role(_) => "role",
            Commands::Callback { .. } => "callback",
        }
    }
}

#[derive(Subcommand)]
enum RigCommand {
    /// Clone a repository in as a new warband.
    Add {
        name: String,
        url: String,
        /// Item-id prefix (derived from the name by default).
        #[arg(long)]
        prefix: Option<String>,
        /// Default branch (detected from the remote by default).
        #[arg(long)]
        branch: Option<String>,
    },
    List,
}

#[derive(Subcommand)]
enum RaiderCommand {
    List {
        rig: Option<String>,
    },
    Add {
        rig: String,
        /// Defaults to the next free themed name.
        name: Option<String>,
    },
    Remove {
        rig: String,
        name: String,
        #[arg(long)]
        force: bool,
    },
    /// Kill the session and delete worktree, branch and record.
    Nuke {
        rig: String,
        name: String,
        #[arg(long)]
        force: bool,
    },
    /// Exit non-zero unless the raider can be nuked without losing work.
    CheckRecovery {
        rig: String,
        name: String,
    },
    GitState {
        rig: String,
        name: String,
    },
    Stale {
        rig: Option<String>,
    },
    /// Delete raider branches no worktree uses.
    Gc {
        rig: String,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum CrewCommand {
    Add {
        rig: String,
        name: String,
    },
    Start {
        rig: String,
        name: String,
    },
    Stop {
        rig: String,
        name: String,
    },
    /// Start if needed, then attach.
    At {
        rig: String,
        name: String,
    },
    List {
        rig: Option<String>,
    },
    Remove {
        rig: String,
        name: String,
        #[arg(long)]
        force: bool,
    },
    /// Hand off to a fresh runtime in the same session.
    Refresh {
        rig: String,
        name: String,
        /// Added to the handoff drum.
        #[arg(long)]
        note: Option<String>,
    },
    Restart {
        rig: String,
        name: String,
    },
    Rename {
        rig: String,
        from: String,
        to: String,
    },
    /// Fast-forward a clean worktree from origin.
    Pristine {
        rig: String,
        name: String,
    },
    Status {
        rig: String,
        name: String,
    },
}

#[derive(Subcommand)]
enum RaidCommand {
    Create {
        /// Items to track.
        #[arg(required = true)]
        items: Vec<String>,
        /// Defaults to the first item's title.
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        owner: Option<String>,
        /// Comma-separated addresses told when the raid lands.
        #[arg(long)]
        notify: Option<String>,
        #[arg(long)]
        totem: Option<String>,
    },
    Add {
        raid: String,
        #[arg(required = true)]
        items: Vec<String>,
    },
    Close {
        raid: String,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long)]
        notify: Option<String>,
    },
    Status {
        raid: String,
    },
    List {
        /// Include closed raids.
        #[arg(long)]
        all: bool,
    },
    /// Close every raid whose items are all done.
    Check,
    /// Raids with ready work and nobody driving it.
    Stranded,
}

#[derive(Subcommand)]
enum DrumsCommand {
    Send {
        to: String,
        #[arg(short, long)]
        subject: String,
        #[arg(short, long, default_value = "")]
        message: String,
    },
    Inbox {
        /// Defaults to your identity.
        address: Option<String>,
        #[arg(long)]
        unread: bool,
        /// Print only a one-line unread notice.
        #[arg(long)]
        quiet: bool,
    },
    Read {
        id: String,
        #[arg(long)]
        address: Option<String>,
    },
}

#[derive(Args)]
#[command(args_conflicts_with_subcommands = true)]
struct LogArgs {
    #[command(subcommand)]
    action: Option<LogAction>,

    /// Only these kinds (repeatable).
    #[arg(long = "kind")]
    kinds: Vec<EventKind>,

    /// Only actors starting with this prefix.
    #[arg(long)]
    actor: Option<String>,

    /// RFC 3339 time or an age such as 30m, 2h, 1d.
    #[arg(long)]
    since: Option<String>,

    #[arg(long)]
    until: Option<String>,

    /// Show only the last N events.
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Keep printing events as they are appended.
    #[arg(short, long)]
    follow: bool,
}

#[derive(Subcommand)]
enum LogAction {
    #[command(hide = true)]
    Emit { kind: EventKind, detail: String },
}

#[derive(Subcommand)]
enum CheckpointCommand {
    Write {
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        molecule: Option<String>,
        #[arg(long)]
        step: Option<String>,
        #[arg(long)]
        step_title: Option<String>,
    },
    Read,
    Clear,
}

#[derive(Args, Clone, Default)]
struct RoleFlags {
    #[arg(long)]
    role: Option<RoleKind>,
    #[arg(long)]
    rig: Option<String>,
    #[arg(long)]
    name: Option<String>,
}

impl RoleFlags {
    fn overrides(&self) -> Overrides {
        Overrides {
            role: self.role,
            rig: self.rig.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Subcommand)]
enum RoleCommand {
    /// Print the home directory of a role.
    Home {
        identity: Option<String>,
        #[command(flatten)]
        flags: RoleFlags,
    },
    /// Print shell exports for a role.
    Env {
        #[command(flatten)]
        flags: RoleFlags,
    },
    /// What the working directory alone says.
    Detect,
    Show {
        #[command(flatten)]
        flags: RoleFlags,
    },
    List,
}

#[derive(Subcommand)]
enum CallbackCommand {
    PaneDied { session: String, code: i32 },
}

fn log_options(cli: &Cli, config: Option<&HordeConfig>) -> LogOptions {
    let general = config.map(|c| &c.general);
    let json = cli.log_json || general.is_some_and(|g| g.log_json);
    LogOptions {
        level: general.map_or_else(|| LogOptions::default().level, |g| g.log_level.clone()),
        format: if json { LogFormat::Json } else { LogFormat::Human },
        debug: cli.debug,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let env = Env::from_process();
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        // `done` may run from a worktree that no longer exists.
        Err(e) => env.get("HD_WORKSPACE_ROOT").map(PathBuf::from).ok_or(e)?,
    };

    let root = resolver::locate_root(&cwd, &env).ok();
    let config = HordeConfig::load(root.as_deref());
    logging::init(&log_options(&cli, config.as_ref().ok()));
    let config = config?;

    let actor = env.get("HD_ACTOR").unwrap_or("-").to_string();
    let (span, _trace_id) = hd_telemetry::tracing_setup::create_operation_span(cli.command.operation(), &actor);
    let inv = Invocation { cwd, env, config };
    run(&inv, cli.command).instrument(span).await
}

async fn run(inv: &Invocation, command: Commands) -> anyhow::Result<()> {
    use commands::*;

    match command {
        Commands::Install { path, name, owner } => install::install(inv, &path, name, owner).await,
        Commands::Rig(RigCommand::Add {
            name,
            url,
            prefix,
            branch,
        }) => install::rig_add(inv, &name, &url, prefix, branch).await,
        Commands::Rig(RigCommand::List) => install::rig_list(inv),

        Commands::Charge {
            item,
            target,
            force,
            create,
            no_start,
        } => {
            let opts = hd_agents::hook::ChargeOptions {
                force,
                create,
                no_start,
            };
            work::charge(inv, &item, target.as_deref(), &opts).await
        }
        Commands::Unsling {
            item,
            target,
            force,
        } => work::unsling(inv, item.as_deref(), target.as_deref(), force).await,
        Commands::Done {
            status,
            phase_complete,
            gate,
            issue,
            cleanup_status,
        } => {
            let exit = hd_agents::done::ExitKind::from_flags(status.as_deref(), phase_complete, gate.as_deref())?;
            let opts = hd_agents::done::DoneOptions {
                exit,
                issue,
                cleanup_status,
            };
            work::done(inv, &opts).await
        }

        Commands::Raider(cmd) => match cmd {
            RaiderCommand::List { rig } => raider::list(inv, rig.as_deref()),
            RaiderCommand::Add { rig, name } => raider::add(inv, &rig, name.as_deref()),
            RaiderCommand::Remove { rig, name, force } => raider::remove(inv, &rig, &name, force),
            RaiderCommand::Nuke { rig, name, force } => raider::nuke(inv, &rig, &name, force),
            RaiderCommand::CheckRecovery { rig, name } => raider::check_recovery(inv, &rig, &name),
            RaiderCommand::GitState { rig, name } => raider::git_state(inv, &rig, &name),
            RaiderCommand::Stale { rig } => raider::stale(inv, rig.as_deref()),
            RaiderCommand::Gc { rig, dry_run } => raider::gc(inv, &rig, dry_run),
        },

        Commands::Crew(cmd) => match cmd {
            CrewCommand::Add { rig, name } => crew::add(inv, &rig, &name),
            CrewCommand::Start { rig, name } => crew::start(inv, &rig, &name).await,
            CrewCommand::Stop { rig, name } => crew::stop(inv, &rig, &name),
            CrewCommand::At { rig, name } => crew::at(inv, &rig, &name).await,
            CrewCommand::List { rig } => crew::list(inv, rig.as_deref()),
            CrewCommand::Remove { rig, name, force } => crew::remove(inv, &rig, &name, force),
            CrewCommand::Refresh { rig, name, note } => crew::refresh(inv, &rig, &name, note.as_deref()),
            CrewCommand::Restart { rig, name } => crew::restart(inv, &rig, &name).await,
            CrewCommand::Rename { rig, from, to } => crew::rename(inv, &rig, &from, &to),
            CrewCommand::Pristine { rig, name } => crew::pristine(inv, &rig, &name),
            CrewCommand::Status { rig, name } => crew::status(inv, &rig, &name),
        },

        Commands::Raid(cmd) => match cmd {
            RaidCommand::Create {
                items,
                name,
                owner,
                notify,
                totem,
            } => {
                let spec = hd_agents::raid::NewRaid {
                    name,
                    items,
                    owner,
                    notify,
                    totem,
                };
                raid::create(inv, &spec).await
            }
            RaidCommand::Add { raid: id, items } => raid::add(inv, &id, &items).await,
            RaidCommand::Close { raid: id, reason, notify } => {
                raid::close(inv, &id, reason.as_deref(), notify.as_deref()).await
            }
            RaidCommand::Status { raid: id } => raid::status(inv, &id).await,
            RaidCommand::List { all } => raid::list(inv, all).await,
            RaidCommand::Check => raid::check(inv).await,
            RaidCommand::Stranded => raid::stranded(inv).await,
        },

        Commands::Drums(cmd) => match cmd {
            DrumsCommand::Send { to, subject, message } => drums::send(inv, &to, &subject, &message),
            DrumsCommand::Inbox {
                address,
                unread,
                quiet,
            } => drums::inbox(inv, address.as_deref(), unread, quiet),
            DrumsCommand::Read { id, address } => drums::read(inv, &id, address.as_deref()),
        },

        Commands::Log(args) => match args.action {
            Some(LogAction::Emit { kind, detail }) => log::emit(inv, kind, &detail),
            None => {
                let query = log::query_from(args.kinds, args.actor, args.since.as_deref(), args.until.as_deref(), args.limit)?;
                if args.follow {
                    log::follow(inv, &query).await
                } else {
                    log::show(inv, &query)
                }
            }
        },

        Commands::Checkpoint(cmd) => match cmd {
            CheckpointCommand::Write {
                notes,
                molecule,
                step,
                step_title,
            } => checkpoint::write(inv, notes, molecule, step, step_title),
            CheckpointCommand::Read => checkpoint::read(inv),
            CheckpointCommand::Clear => checkpoint::clear(inv),
        },

        Commands::Role(cmd) => match cmd {
            RoleCommand::Home { identity, flags } => role::home(inv, identity.as_deref(), &flags.overrides()),
            RoleCommand::Env { flags } => role::env(inv, &flags.overrides()),
            RoleCommand::Detect => role::detect(inv),
            RoleCommand::Show { flags } => role::show(inv, &flags.overrides()),
            RoleCommand::List => role::list(),
        },

        Commands::Callback {
            hook: CallbackCommand::PaneDied { session, code },
        } => callback::pane_died(inv, &session, code),
    }
}
