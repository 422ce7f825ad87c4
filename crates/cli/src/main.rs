//! Tontine CLI - Main entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tontine_cli::{commands, AppContext};
use tontine_core::{ActionKind, Principal, ResourceKind, ResourceRef, Role};

#[derive(Parser)]
#[command(name = "tontine")]
#[command(about = "Tontine - dual-control validation engine", long_about = None)]
struct Cli {
    /// Data directory path
    #[arg(short, long, default_value = "./data")]
    data: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the local resource directory
    Resource {
        #[command(subcommand)]
        command: ResourceCommands,
    },

    /// Open a validation request for a gated action
    Request {
        /// Gated action, e.g. deactivate-account
        #[arg(value_parser = parse_action)]
        action: ActionKind,
        /// Target resource id
        resource: String,
        /// Initiating principal as id:role
        #[arg(long, value_parser = parse_principal)]
        initiator: Principal,
        /// Approver as id:role, repeated once per stage in chain order
        #[arg(long = "approver", value_parser = parse_principal, required = true)]
        approvers: Vec<Principal>,
        /// Justification (10-500 characters)
        #[arg(long)]
        reason: String,
    },

    /// Submit a one-time code for your stage
    Verify {
        /// Request id
        id: String,
        /// Acting principal as id:role
        #[arg(long = "as", value_parser = parse_principal)]
        acting: Principal,
        /// The 6-digit code
        code: String,
    },

    /// Reject a request (final approver only)
    Reject {
        /// Request id
        id: String,
        /// Acting principal as id:role
        #[arg(long = "as", value_parser = parse_principal)]
        acting: Principal,
        /// Why the request is refused (10-500 characters)
        #[arg(long)]
        reason: String,
    },

    /// Re-issue your active code
    Resend {
        /// Request id
        id: String,
        /// Acting principal as id:role
        #[arg(long = "as", value_parser = parse_principal)]
        acting: Principal,
    },

    /// Expire timed-out requests (run this from cron)
    Sweep,

    /// List requests awaiting your code
    Pending {
        /// Acting principal as id:role
        #[arg(long = "as", value_parser = parse_principal)]
        acting: Principal,
    },

    /// Show one request (parties only)
    Show {
        /// Request id
        id: String,
        /// Acting principal as id:role
        #[arg(long = "as", value_parser = parse_principal)]
        acting: Principal,
    },

    /// Check whether a request authorizes its gated action
    Authorize {
        /// Request id
        id: String,
    },

    /// Claim a completed request's single authorization
    Consume {
        /// Request id
        id: String,
        /// Executing principal as id:role
        #[arg(long = "as", value_parser = parse_principal)]
        acting: Principal,
    },

    /// Request counts by status
    Stats,

    /// Remove terminal requests from the store
    Purge,
}

#[derive(Subcommand)]
enum ResourceCommands {
    /// Register a resource with its display data
    Add {
        /// Resource kind: account or group
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,
        /// Resource id
        id: String,
        /// Display name frozen into request snapshots
        label: String,
        /// Contact hint for the resource's owner
        #[arg(long)]
        contact: Option<String>,
    },
    /// List registered resources
    List,
}

fn parse_action(s: &str) -> Result<ActionKind, String> {
    s.parse()
        .map_err(|_| format!("unknown action '{s}' (e.g. delete-account, block-group)"))
}

fn parse_kind(s: &str) -> Result<ResourceKind, String> {
    s.parse()
        .map_err(|_| format!("unknown resource kind '{s}' (account or group)"))
}

/// Parse "id:role" into a principal, e.g. "theo:treasurer"
fn parse_principal(s: &str) -> Result<Principal, String> {
    let (id, role) = s
        .split_once(':')
        .ok_or_else(|| format!("expected id:role, got '{s}'"))?;
    if id.is_empty() {
        return Err(format!("empty principal id in '{s}'"));
    }
    let role: Role = role
        .parse()
        .map_err(|_| format!("unknown role '{role}' (member, treasurer, administrator)"))?;
    Ok(Principal::new(id, role))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    // Create application context
    let ctx = AppContext::new(&cli.data)?;

    match cli.command {
        Commands::Resource { command } => match command {
            ResourceCommands::Add {
                kind,
                id,
                label,
                contact,
            } => {
                let resource = ResourceRef { kind, id };
                commands::resource_add(&ctx, &resource, &label, contact.as_deref()).await?;
            }
            ResourceCommands::List => {
                commands::resource_list(&ctx).await?;
            }
        },

        Commands::Request {
            action,
            resource,
            initiator,
            approvers,
            reason,
        } => {
            commands::request(&ctx, action, &resource, initiator, approvers, &reason).await?;
        }

        Commands::Verify { id, acting, code } => {
            commands::verify(&ctx, &id, acting, &code).await?;
        }

        Commands::Reject { id, acting, reason } => {
            commands::reject(&ctx, &id, acting, &reason).await?;
        }

        Commands::Resend { id, acting } => {
            commands::resend(&ctx, &id, acting).await?;
        }

        Commands::Sweep => {
            commands::sweep(&ctx).await?;
        }

        Commands::Pending { acting } => {
            commands::pending(&ctx, acting).await?;
        }

        Commands::Show { id, acting } => {
            commands::show(&ctx, &id, acting).await?;
        }

        Commands::Authorize { id } => {
            commands::authorize(&ctx, &id).await?;
        }

        Commands::Consume { id, acting } => {
            commands::consume(&ctx, &id, acting).await?;
        }

        Commands::Stats => {
            commands::stats(&ctx).await?;
        }

        Commands::Purge => {
            commands::purge(&ctx).await?;
        }
    }

    Ok(())
}
