use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod registry;

use crate::commands::CommandContext;
use crate::config::RbacCliConfig;
use anyhow::Result;

/// CLI for LMS role-based access control administration
#[derive(Parser, Debug)]
#[command(name = "lms-rbac", about = "LMS RBAC Administration")]
pub struct Cli {
    /// Path to configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Data directory location (overrides $LMS_RBAC_DATA_DIR)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for the user registry
#[derive(Subcommand, Debug)]
#[command(about = "Manage registered users (add/list)")]
pub enum UserCommands {
    /// Register a user and give them the base role for their profile role
    Add {
        #[arg(long)]
        id: u64,
        #[arg(long)]
        username: String,
        #[arg(long)]
        profile_role: Option<String>,
    },
    /// List registered users
    List,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install default permissions and roles, then assign base roles
    Setup,

    /// User registry management
    #[command(subcommand)]
    User(UserCommands),

    /// Assign a role to a user
    Assign {
        /// User id or username
        #[arg(long)]
        user: String,
        /// Role code
        #[arg(long)]
        role: String,
        #[arg(long, conflicts_with_all = ["course", "offering", "custom"])]
        department: Option<u64>,
        #[arg(long, conflicts_with_all = ["offering", "custom"])]
        course: Option<u64>,
        /// Course offering id
        #[arg(long, conflicts_with = "custom")]
        offering: Option<u64>,
        /// Custom scope as KIND:ID
        #[arg(long)]
        custom: Option<String>,
        /// Start of the assignment window (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// End of the assignment window (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
    },

    /// Deactivate a role assignment
    Deactivate {
        #[arg(long)]
        assignment: u64,
    },

    /// Grant a single permission tied to a context object
    Grant {
        /// User id or username
        #[arg(long)]
        user: String,
        #[arg(long)]
        permission: String,
        #[arg(long)]
        context_type: String,
        #[arg(long)]
        context_id: u64,
        /// Expiry (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        expires: Option<String>,
    },

    /// Check whether a user holds a permission
    Check {
        /// User id or username
        #[arg(long)]
        user: String,
        #[arg(long)]
        permission: String,
        #[arg(long)]
        department: Option<u64>,
        #[arg(long)]
        course: Option<u64>,
        #[arg(long)]
        offering: Option<u64>,
    },

    /// List a user's effective permissions
    Permissions {
        /// User id or username
        #[arg(long)]
        user: String,
    },

    /// List roles with their effective permissions
    Roles,

    /// Report permission check audit entries
    Audit {
        /// Username substring
        #[arg(long)]
        user: Option<String>,
        /// Permission codename substring
        #[arg(long)]
        permission: Option<String>,
        /// GRANTED, DENIED or ERROR
        #[arg(long)]
        result: Option<String>,
        /// Only entries from the last N days
        #[arg(long, default_value_t = 7)]
        days: i64,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = RbacCliConfig::resolve_config(cli.config, cli.data_dir)?;
    let ctx = CommandContext::new(config)?;

    match cli.command {
        Commands::Setup => commands::setup::handle_setup(&ctx),
        Commands::User(command) => commands::users::handle_user_command(&ctx, command),
        Commands::Assign {
            user,
            role,
            department,
            course,
            offering,
            custom,
            start,
            end,
        } => {
            let scope = commands::assign::ScopeArgs {
                department,
                course,
                offering,
                custom,
            };
            commands::assign::handle_assign(&ctx, &user, &role, scope, start.as_deref(), end.as_deref())
        }
        Commands::Deactivate { assignment } => commands::assign::handle_deactivate(&ctx, assignment),
        Commands::Grant {
            user,
            permission,
            context_type,
            context_id,
            expires,
        } => commands::assign::handle_grant(&ctx, &user, &permission, &context_type, context_id, expires.as_deref()),
        Commands::Check {
            user,
            permission,
            department,
            course,
            offering,
        } => commands::check::handle_check(&ctx, &user, &permission, department, course, offering),
        Commands::Permissions { user } => commands::check::handle_permissions(&ctx, &user),
        Commands::Roles => commands::roles::handle_roles(&ctx),
        Commands::Audit {
            user,
            permission,
            result,
            days,
            limit,
        } => {
            let filter = commands::audit::AuditFilter {
                user,
                permission,
                result,
                days,
                limit,
            };
            commands::audit::handle_audit(&ctx, filter)
        }
    }
}
