use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use church_admin::authz::{AuthEvent, Identity, LazyCatalog, ModuleAccess, PermissionSession};
use church_admin::db::{access, SqlitePermissionGateway};
use church_admin::jwt::JwtConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "church-admin access-control tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Give a user a profile, replacing the one they had
    AssignProfile { user_id: Uuid, profile_code: String },
    /// Remove a user's profile
    UnassignProfile { user_id: Uuid },
    /// Grant a function on a module to a profile
    Grant {
        profile_code: String,
        module: String,
        function: String,
    },
    /// Take a granted function on a module back from a profile
    Revoke {
        profile_code: String,
        module: String,
        function: String,
    },
    /// List the grants a profile holds
    Grants { profile_code: String },
    /// List profiles
    Profiles,
    /// List modules with the functions that apply to each
    Modules,
    /// Print what a user may do in a module
    Check { user_id: Uuid, module: String },
    /// Mint a bearer token for local development
    IssueToken {
        user_id: Uuid,
        email: String,
        #[arg(long)]
        session_id: Option<Uuid>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::AssignProfile { user_id, profile_code } => {
            let pool = get_pool().await?;
            let assignment = access::assign_profile(&pool, user_id, &profile_code).await?;
            println!("{} -> {}", assignment.user_id, assignment.profile_code);
        }
        Commands::UnassignProfile { user_id } => {
            let pool = get_pool().await?;
            if access::unassign_profile(&pool, user_id).await? {
                println!("{} has no profile now", user_id);
            } else {
                println!("{} had no profile", user_id);
            }
        }
        Commands::Grant {
            profile_code,
            module,
            function,
        } => {
            let pool = get_pool().await?;
            access::grant(&pool, &profile_code, &module, &function).await?;
            println!("granted {} on {} to {}", function, module, profile_code);
        }
        Commands::Revoke {
            profile_code,
            module,
            function,
        } => {
            let pool = get_pool().await?;
            if access::revoke(&pool, &profile_code, &module, &function).await? {
                println!("revoked {} on {} from {}", function, module, profile_code);
            } else {
                println!("{} did not hold {} on {}", profile_code, function, module);
            }
        }
        Commands::Grants { profile_code } => {
            let pool = get_pool().await?;
            println!("{:<16} {}", "Module", "Function");
            for grant in access::list_profile_grants(&pool, &profile_code).await? {
                println!("{:<16} {}", grant.module, grant.function);
            }
        }
        Commands::Profiles => {
            let pool = get_pool().await?;
            println!("{:<14} {:<8} {}", "Code", "Active", "Description");
            for profile in access::list_profiles(&pool).await? {
                println!("{:<14} {:<8} {}", profile.code, profile.active, profile.description);
            }
        }
        Commands::Modules => {
            let pool = get_pool().await?;
            println!("{:<6} {:<16} {}", "Order", "Module", "Functions");
            for module in access::list_catalog(&pool).await? {
                println!("{:<6} {:<16} {}", module.order_index, module.name, module.functions.join(", "));
            }
        }
        Commands::Check { user_id, module } => {
            let pool = get_pool().await?;
            let summary = check(pool, user_id, &module).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::IssueToken {
            user_id,
            email,
            session_id,
        } => {
            let jwt = JwtConfig::from_env()?;
            println!("{}", jwt.encode(user_id, &email, session_id)?);
        }
    }

    Ok(())
}

async fn check(pool: SqlitePool, user_id: Uuid, module: &str) -> ModuleAccess {
    let gateway = Arc::new(SqlitePermissionGateway::new(pool));
    let session = PermissionSession::new(gateway, Arc::new(LazyCatalog::new()));
    session
        .apply(AuthEvent::SignedIn(Identity::new(user_id, String::new())))
        .await;

    if let Some(reason) = session.load_user_permissions().await.deny_reason() {
        eprintln!("permissions denied: {:?}", reason);
    }

    ModuleAccess::load(&session, module).await
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let table = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
        .fetch_optional(pool)
        .await?;
    let applied_versions: HashSet<i64> = if table.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) {
            "applied"
        } else {
            "pending"
        };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", display))
}
