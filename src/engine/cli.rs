//! Taskgate CLI Module
//! Command-line interface for project setup, administration and serving

pub mod formatter;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "taskgate")]
#[command(author = "Taskgate Team")]
#[command(version)]
#[command(about = "Multi-tenant task tracking API with rights-based authorization", long_about = None)]
pub struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new taskgate project
    Init {
        /// Project name
        #[arg(short, long)]
        name: String,

        /// Skip creating the default admin and user roles
        #[arg(long)]
        no_seed: bool,
    },

    /// Start the API server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short = 'P', long)]
        port: Option<u16>,

        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
    },

    /// Show project status
    Status,

    /// User management
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Role management
    Role {
        #[command(subcommand)]
        action: RoleAction,
    },

    /// Right management
    Right {
        #[command(subcommand)]
        action: RightAction,
    },

    /// Create the default roles, optionally with an admin account
    Seed {
        /// Admin user to create or promote
        #[arg(long)]
        admin: Option<String>,

        /// Password for a newly created admin user
        #[arg(long, requires = "admin")]
        password: Option<String>,
    },

    /// Token maintenance
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum UserAction {
    /// Register a user
    Create {
        name: String,

        #[arg(long)]
        password: String,
    },

    /// Delete a user with its tokens and todos
    Delete { name: String },

    /// List users
    List,

    /// Add a user to a role
    Assign { name: String, role: String },

    /// Remove a user from a role
    Unassign { name: String, role: String },
}

#[derive(Subcommand, Debug)]
pub enum RoleAction {
    /// Create a role
    Create { name: String },

    /// List roles with their rights
    List,

    /// Attach an existing right to a role
    Grant {
        role: String,

        /// Right id
        right: i64,
    },

    /// Delete a role
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
pub enum RightAction {
    /// Create a right, optionally attaching it to a role
    Create {
        /// One of User, Todo, Token, Role, Right
        #[arg(short, long)]
        model: String,

        #[arg(long)]
        read: bool,

        #[arg(long)]
        write: bool,

        /// Apply to objects owned by anyone
        #[arg(long)]
        any_owner: bool,

        /// Role to attach the new right to
        #[arg(long)]
        role: Option<String>,
    },

    /// List rights
    List,
}

#[derive(Subcommand, Debug)]
pub enum TokenAction {
    /// Delete tokens past their lifetime
    Purge,
}

impl Cli {
    pub fn get_project_dir(&self) -> PathBuf {
        self.project
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}
