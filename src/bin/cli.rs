//! Taskgate CLI - Main entry point for CLI binary
//!
//! This binary provides the `taskgate` tool for setting up projects,
//! administering users and rights, and running the API server.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

use taskgate_lib::engine::{
    api::{create_router, ApiState},
    cli::{
        formatter::{describe_right, format_duration, CliFormatter},
        Cli, Commands, OutputFormat, RightAction, RoleAction, TokenAction, UserAction,
    },
    config::{Config, CONFIG_FILE},
    database::Database,
    identity::IdentityStore,
    migrations::MigrationRunner,
    rbac::{Model, NewRight, RightsRegistry},
    seed,
    session::TokenSessionManager,
    telemetry,
};

fn main() {
    let cli = Cli::parse();
    let json_output = cli.format == OutputFormat::Json;

    if let Err(e) = run_cli(cli) {
        if json_output {
            println!("{}", json!({ "success": false, "error": format!("{:#}", e) }));
        } else {
            CliFormatter::error(&format!("{:#}", e));
        }
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    let project_dir = cli.get_project_dir();
    let json_output = cli.format == OutputFormat::Json;

    match cli.command {
        Commands::Init { name, no_seed } => cmd_init(&project_dir, &name, no_seed, json_output),
        Commands::Serve { port, host } => cmd_serve(&project_dir, host, port),
        Commands::Status => cmd_status(&project_dir, json_output),
        Commands::User { action } => cmd_user(action, &project_dir, json_output),
        Commands::Role { action } => cmd_role(action, &project_dir, json_output),
        Commands::Right { action } => cmd_right(action, &project_dir, json_output),
        Commands::Seed { admin, password } => cmd_seed(&project_dir, admin, password, json_output),
        Commands::Token { action } => cmd_token(action, &project_dir, json_output),
    }
}

/// Loads the project config, installs logging and opens the store.
fn open_project(project_dir: &Path) -> Result<(Config, Database)> {
    let config = Config::load(project_dir)
        .with_context(|| format!("Not a taskgate project: {}", project_dir.display()))?;
    telemetry::init(&config.log.filter);
    let db = Database::open(&config.database_path(project_dir), config.database.pool_size)
        .context("Failed to open database")?;
    Ok((config, db))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_init(project_dir: &Path, name: &str, no_seed: bool, json: bool) -> Result<()> {
    let target = project_dir.join(name);
    if target.join(CONFIG_FILE).exists() {
        bail!("Project already initialized at {}", target.display());
    }
    std::fs::create_dir_all(&target)
        .with_context(|| format!("Failed to create {}", target.display()))?;

    let config = Config::default_for_project(name);
    config.save(&target)?;
    let (_, db) = open_project(&target)?;

    let report = if no_seed {
        None
    } else {
        Some(seed::seed_defaults(&RightsRegistry::new(db))?)
    };

    if json {
        return print_json(&json!({
            "success": true,
            "project": name,
            "path": target.display().to_string(),
            "seed": report,
        }));
    }

    CliFormatter::success(&format!("Created taskgate project '{}'", name));
    CliFormatter::kv("Path", &target.display().to_string());
    CliFormatter::kv("Database", &config.database_path(&target).display().to_string());
    if let Some(report) = report {
        CliFormatter::kv("Roles", &report.roles_created.join(", "));
    }
    CliFormatter::blank();
    CliFormatter::info("Next steps:");
    CliFormatter::item(&format!("cd {}", name));
    CliFormatter::item("taskgate seed --admin <name> --password <password>");
    CliFormatter::item("taskgate serve");
    Ok(())
}

#[tokio::main]
async fn cmd_serve(project_dir: &Path, host: Option<String>, port: Option<u16>) -> Result<()> {
    let (mut config, db) = open_project(project_dir)?;
    if let Some(host) = host {
        config.api.host = host;
    }
    if let Some(port) = port {
        config.api.port = port;
    }

    let state = ApiState::new(db, &config.auth);
    let app = create_router(state, Duration::from_secs(config.api.request_timeout_secs));

    let addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    CliFormatter::header("Taskgate API Server");
    CliFormatter::kv("Project", &config.project.name);
    CliFormatter::kv("Listening", &format!("http://{}", addr));
    CliFormatter::kv("OpenAPI", &format!("http://{}/api-docs/openapi.json", addr));
    CliFormatter::kv("Token TTL", &format_duration(config.auth.token_ttl_secs.max(0) as u64));
    CliFormatter::info("Press Ctrl+C to stop");
    tracing::info!(%addr, "api server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("api server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

fn cmd_status(project_dir: &Path, json: bool) -> Result<()> {
    let (config, db) = open_project(project_dir)?;
    let status = MigrationRunner::new().check(&db)?;

    let mut counts = Vec::new();
    for table in ["users", "roles", "rights", "tokens", "todos"] {
        counts.push((table, db.count_rows(table)?));
    }

    if json {
        let counts: serde_json::Map<String, serde_json::Value> =
            counts.iter().map(|(t, n)| (t.to_string(), json!(n))).collect();
        return print_json(&json!({
            "project": config.project.name,
            "database": config.database_path(project_dir).display().to_string(),
            "migrations": {
                "applied": status.applied_count,
                "pending": status.pending_migrations,
            },
            "counts": counts,
            "token_ttl_secs": config.auth.token_ttl_secs,
        }));
    }

    CliFormatter::header(&format!("Project: {}", config.project.name));
    CliFormatter::kv("Database", &config.database_path(project_dir).display().to_string());
    CliFormatter::kv("Migrations applied", &status.applied_count.to_string());
    if status.pending_count > 0 {
        CliFormatter::warning(&format!("{} pending migration(s)", status.pending_count));
        for name in &status.pending_migrations {
            CliFormatter::item(name);
        }
    }
    CliFormatter::kv("Token TTL", &format_duration(config.auth.token_ttl_secs.max(0) as u64));
    CliFormatter::blank();
    CliFormatter::table_header(&["table", "rows"]);
    for (table, count) in counts {
        CliFormatter::table_row(&[table, &count.to_string()]);
    }
    Ok(())
}

fn cmd_user(action: UserAction, project_dir: &Path, json: bool) -> Result<()> {
    let (config, db) = open_project(project_dir)?;
    let identity = IdentityStore::new(db.clone()).with_default_role(config.auth.default_role.clone());
    let registry = RightsRegistry::new(db);

    match action {
        UserAction::Create { name, password } => {
            let user = identity.create_user(&name, &password)?;
            if json {
                return print_json(&json!({ "success": true, "user": user }));
            }
            CliFormatter::success(&format!("Created user '{}' (id {})", user.name, user.id));
        }
        UserAction::Delete { name } => {
            let user = identity.find_by_name(&name)?;
            identity.delete_user(user.id)?;
            if json {
                return print_json(&json!({ "success": true, "deleted": user.id }));
            }
            CliFormatter::success(&format!("Deleted user '{}' with its tokens and todos", name));
        }
        UserAction::List => {
            let mut rows = Vec::new();
            for user in identity.list_users()? {
                let roles: Vec<String> = identity
                    .roles_for_user(user.id, &registry)?
                    .into_iter()
                    .map(|r| r.name)
                    .collect();
                rows.push((user, roles));
            }
            if json {
                let users: Vec<_> = rows
                    .iter()
                    .map(|(u, roles)| json!({ "id": u.id, "name": u.name, "registration_time": u.registration_time, "roles": roles }))
                    .collect();
                return print_json(&json!(users));
            }
            if rows.is_empty() {
                CliFormatter::info("No users");
                return Ok(());
            }
            CliFormatter::table_header(&["id", "name", "registered", "roles"]);
            for (user, roles) in rows {
                CliFormatter::table_row(&[
                    &user.id.to_string(),
                    &user.name,
                    &user.registration_time.format("%Y-%m-%d %H:%M").to_string(),
                    &roles.join(", "),
                ]);
            }
        }
        UserAction::Assign { name, role } => {
            let user = identity.find_by_name(&name)?;
            let role = registry.find_role(&role)?;
            identity.assign_role(user.id, role.id)?;
            if json {
                return print_json(&json!({ "success": true, "user": user.id, "role": role.id }));
            }
            CliFormatter::success(&format!("Added '{}' to role '{}'", user.name, role.name));
        }
        UserAction::Unassign { name, role } => {
            let user = identity.find_by_name(&name)?;
            let role = registry.find_role(&role)?;
            let removed = identity.remove_role(user.id, role.id)?;
            if json {
                return print_json(&json!({ "success": removed, "user": user.id, "role": role.id }));
            }
            if removed {
                CliFormatter::success(&format!("Removed '{}' from role '{}'", user.name, role.name));
            } else {
                CliFormatter::warning(&format!("'{}' was not in role '{}'", user.name, role.name));
            }
        }
    }
    Ok(())
}

fn cmd_role(action: RoleAction, project_dir: &Path, json: bool) -> Result<()> {
    let (_, db) = open_project(project_dir)?;
    let registry = RightsRegistry::new(db);

    match action {
        RoleAction::Create { name } => {
            let role = registry.create_role(&name)?;
            if json {
                return print_json(&json!({ "success": true, "role": role }));
            }
            CliFormatter::success(&format!("Created role '{}' (id {})", role.name, role.id));
        }
        RoleAction::List => {
            let roles = registry.list_roles()?;
            if json {
                let mut out = Vec::new();
                for role in &roles {
                    out.push(json!({ "role": role, "rights": registry.rights_for_role(role.id)? }));
                }
                return print_json(&json!(out));
            }
            if roles.is_empty() {
                CliFormatter::info("No roles");
                return Ok(());
            }
            for role in roles {
                CliFormatter::header(&format!("{} (id {})", role.name, role.id));
                let rights = registry.rights_for_role(role.id)?;
                if rights.is_empty() {
                    CliFormatter::item("no rights");
                }
                for right in rights {
                    CliFormatter::item(&format!("#{} {}", right.id, describe_right(&right)));
                }
            }
        }
        RoleAction::Grant { role, right } => {
            let role = registry.find_role(&role)?;
            let right = registry.get_right(right)?;
            registry.grant_right(role.id, right.id)?;
            if json {
                return print_json(&json!({ "success": true, "role": role.id, "right": right.id }));
            }
            CliFormatter::success(&format!("Granted {} to role '{}'", describe_right(&right), role.name));
        }
        RoleAction::Delete { name } => {
            let role = registry.find_role(&name)?;
            registry.delete_role(role.id)?;
            if json {
                return print_json(&json!({ "success": true, "deleted": role.id }));
            }
            CliFormatter::success(&format!("Deleted role '{}'", role.name));
        }
    }
    Ok(())
}

fn cmd_right(action: RightAction, project_dir: &Path, json: bool) -> Result<()> {
    let (_, db) = open_project(project_dir)?;
    let registry = RightsRegistry::new(db);

    match action {
        RightAction::Create { model, read, write, any_owner, role } => {
            let mut new = NewRight::new(model.parse::<Model>()?);
            if read {
                new = new.read();
            }
            if write {
                new = new.write();
            }
            if any_owner {
                new = new.any_owner();
            }
            let right = match role {
                Some(role) => {
                    let role = registry.find_role(&role)?;
                    registry.create_right_for_role(role.id, &new)?
                }
                None => registry.create_right(&new)?,
            };
            if json {
                return print_json(&json!({ "success": true, "right": right }));
            }
            CliFormatter::success(&format!("Created right #{} {}", right.id, describe_right(&right)));
        }
        RightAction::List => {
            let rights = registry.list_rights()?;
            if json {
                return print_json(&json!(rights));
            }
            if rights.is_empty() {
                CliFormatter::info("No rights");
                return Ok(());
            }
            CliFormatter::table_header(&["id", "right"]);
            for right in rights {
                CliFormatter::table_row(&[&right.id.to_string(), &describe_right(&right)]);
            }
        }
    }
    Ok(())
}

fn cmd_seed(project_dir: &Path, admin: Option<String>, password: Option<String>, json: bool) -> Result<()> {
    let (config, db) = open_project(project_dir)?;
    let registry = RightsRegistry::new(db.clone());

    let report = match admin {
        Some(name) => {
            let identity = IdentityStore::new(db).with_default_role(config.auth.default_role.clone());
            seed::seed_admin(&registry, &identity, &name, password.as_deref().unwrap_or_default())?
        }
        None => seed::seed_defaults(&registry)?,
    };

    if json {
        return print_json(&json!({ "success": true, "seed": report }));
    }
    if report.roles_created.is_empty() && report.rights_created == 0 {
        CliFormatter::info("Default roles already present");
    } else {
        CliFormatter::success(&format!(
            "Seeded {} role(s) and {} right(s)",
            report.roles_created.len(),
            report.rights_created
        ));
    }
    if let Some(admin) = report.admin_user {
        CliFormatter::success(&format!("'{}' is an administrator", admin));
    }
    Ok(())
}

fn cmd_token(action: TokenAction, project_dir: &Path, json: bool) -> Result<()> {
    let (config, db) = open_project(project_dir)?;
    let sessions = TokenSessionManager::new(db, config.token_ttl());

    match action {
        TokenAction::Purge => {
            let removed = sessions.purge_expired(Utc::now())?;
            if json {
                return print_json(&json!({ "success": true, "removed": removed }));
            }
            CliFormatter::success(&format!("Removed {} expired token(s)", removed));
        }
    }
    Ok(())
}
