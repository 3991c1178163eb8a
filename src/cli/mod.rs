//! CLI module for the GeoAgriTech server binary.
//!
//! Without a subcommand the binary starts the API server. Offline subcommands
//! work directly against the configured data directory:
//! - `config check` - Validate configuration file
//! - `import-barangays <file>` - Load barangay boundaries from GeoJSON
//! - `create-superadmin` - Create a verified super-admin account

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::api::auth::hash_password;
use crate::api::validation::{validate_email, validate_password_strength, validate_person_name};
use crate::config::Config;
use crate::db::{find_user_by_email, insert_user, NewUser, Role};
use crate::utils::mask_email;

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "geoagritech")]
#[command(author, version, about = "Municipal agriculture data backend", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "GEOAGRITECH_CONFIG", default_value = "geoagritech.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Import barangays from a GeoJSON FeatureCollection
    ImportBarangays {
        /// Path to the .geojson file
        file: PathBuf,

        /// Municipality recorded on every imported barangay
        #[arg(long)]
        municipality: Option<String>,
    },

    /// Create a verified super-admin account
    CreateSuperadmin {
        #[arg(long)]
        email: String,

        #[arg(long, env = "GEOAGRITECH_SUPERADMIN_PASSWORD")]
        password: String,

        #[arg(long, default_value = "Super")]
        first_name: String,

        #[arg(long, default_value = "Admin")]
        last_name: String,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate the configuration file
    Check,
}

/// Run a CLI command
pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli),
        Some(Commands::ImportBarangays { file, municipality }) => {
            cmd_import_barangays(cli, file, municipality.as_deref()).await
        }
        Some(Commands::CreateSuperadmin {
            email,
            password,
            first_name,
            last_name,
        }) => cmd_create_superadmin(cli, email, password, first_name, last_name).await,
        None => {
            // No subcommand means start the server - this is handled in main.rs
            Ok(())
        }
    }
}

/// Open the configured database, applying pending migrations
async fn open_database(cli: &Cli) -> Result<crate::DbPool> {
    let config = Config::load(&cli.config)?;
    crate::utils::ensure_dir(&config.server.data_dir)?;
    crate::db::init(&config.server.data_dir)
        .await
        .context("Failed to open database")
}

/// Validate configuration file
fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!(
            "[!!] Configuration file not found: {}",
            config_path.display()
        );
        println!();
        println!("A default configuration will be used when starting the server.");
        println!("To create a custom configuration, copy geoagritech.example.toml to geoagritech.toml");
        return Ok(());
    }

    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("[!!] Configuration file is invalid!");
            println!();
            println!("Error: {:#}", e);
            anyhow::bail!("Configuration validation failed");
        }
    };

    println!("[OK] Configuration file parsed");
    println!();
    println!("=== Configuration Summary ===");
    println!();
    println!("Server:");
    println!("  Address:      {}:{}", config.server.host, config.server.port);
    println!("  Data Dir:     {}", config.server.data_dir.display());
    println!("  CORS Origin:  {}", config.server.cors_origin);
    println!();
    println!("Auth:");
    println!("  Session TTL:  {} days", config.auth.session_ttl_days);
    println!("  Cookie:       {}", config.auth.cookie_name);
    println!(
        "  Secure:       {}",
        if config.auth.secure_cookies { "Yes" } else { "No" }
    );
    println!();
    println!("Backups:");
    println!("  Directory:    {}", config.backups.directory.display());
    println!("  Max Size:     {} MB", config.backups.max_size_mb);
    println!();

    let problems = config_problems(&config);
    if problems.is_empty() {
        println!("[OK] Configuration is valid!");
        return Ok(());
    }

    for problem in &problems {
        println!("[!!] {}", problem);
    }
    anyhow::bail!("Configuration has {} problem(s)", problems.len())
}

/// Semantic checks beyond what deserialization enforces
fn config_problems(config: &Config) -> Vec<String> {
    let mut problems = Vec::new();

    if config.server.port == 0 {
        problems.push("server.port must be greater than 0".to_string());
    }
    if config.auth.session_ttl_days <= 0 {
        problems.push("auth.session_ttl_days must be at least 1".to_string());
    }
    if config.auth.cookie_name.trim().is_empty() {
        problems.push("auth.cookie_name must not be empty".to_string());
    }
    if config.backups.max_size_mb == 0 {
        problems.push("backups.max_size_mb must be greater than 0".to_string());
    }
    if axum::http::HeaderValue::from_str(&config.server.cors_origin).is_err() {
        problems.push(format!(
            "server.cors_origin is not a valid origin: {}",
            config.server.cors_origin
        ));
    }

    match (
        config.auth.superadmin_email.as_deref(),
        config.auth.superadmin_password.as_deref(),
    ) {
        (Some(email), Some(password)) => {
            if let Err(e) = validate_email(email) {
                problems.push(format!("auth.superadmin_email: {}", e));
            }
            if let Err(e) = validate_password_strength(password) {
                problems.push(format!("auth.superadmin_password: {}", e));
            }
        }
        (None, None) => {}
        _ => problems.push(
            "auth.superadmin_email and auth.superadmin_password must be set together".to_string(),
        ),
    }

    problems
}

/// Import barangay boundaries from a GeoJSON file
async fn cmd_import_barangays(cli: &Cli, file: &Path, municipality: Option<&str>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("GeoJSON file not found: {}", file.display());
    }

    let pool = open_database(cli).await?;
    let summary = crate::db::import_barangays_geojson(&pool, file, municipality).await?;

    println!("[OK] Imported {} barangay(s) from {}", summary.imported, file.display());
    if summary.skipped > 0 {
        println!(
            "[!!] Skipped {} feature(s) without a code or name",
            summary.skipped
        );
    }
    Ok(())
}

/// Create a verified super-admin account
async fn cmd_create_superadmin(
    cli: &Cli,
    email: &str,
    password: &str,
    first_name: &str,
    last_name: &str,
) -> Result<()> {
    let checks = [
        validate_email(email),
        validate_password_strength(password),
        validate_person_name(first_name, "First name"),
        validate_person_name(last_name, "Last name"),
    ];
    let errors: Vec<String> = checks.into_iter().filter_map(Result::err).collect();
    if !errors.is_empty() {
        for error in &errors {
            println!("[!!] {}", error);
        }
        anyhow::bail!("Invalid super-admin details");
    }

    let pool = open_database(cli).await?;

    if find_user_by_email(&pool, email).await?.is_some() {
        anyhow::bail!("A user with email {} already exists", mask_email(email));
    }

    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    let user = insert_user(
        &pool,
        &NewUser {
            first_name,
            last_name,
            email,
            password_hash: &password_hash,
            role: Role::SuperAdmin,
            is_verified: true,
            contact_number: None,
        },
    )
    .await?;

    println!("[OK] Created super-admin {} ({})", user.id, mask_email(&user.email));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_import_barangays() {
        let cli = Cli::try_parse_from([
            "geoagritech",
            "import-barangays",
            "guagua.geojson",
            "--municipality",
            "Guagua",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::ImportBarangays { file, municipality }) => {
                assert_eq!(file, PathBuf::from("guagua.geojson"));
                assert_eq!(municipality.as_deref(), Some("Guagua"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.config, PathBuf::from("geoagritech.toml"));
    }

    #[test]
    fn test_parse_without_subcommand_serves() {
        let cli = Cli::try_parse_from(["geoagritech", "--log-level", "debug"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_default_config_has_no_problems() {
        assert!(config_problems(&Config::default()).is_empty());
    }

    #[test]
    fn test_config_problems() {
        let mut config = Config::default();
        config.auth.session_ttl_days = 0;
        config.backups.max_size_mb = 0;
        config.auth.superadmin_email = Some("root@example.com".to_string());

        let problems = config_problems(&config);
        assert_eq!(problems.len(), 3);
        assert!(problems.iter().any(|p| p.contains("session_ttl_days")));
        assert!(problems.iter().any(|p| p.contains("must be set together")));
    }

    #[tokio::test]
    async fn test_create_superadmin_writes_verified_account() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("geoagritech.toml");
        let data_dir = dir.path().join("data");
        std::fs::write(
            &config_path,
            format!("[server]\ndata_dir = {:?}\n", data_dir.display().to_string()),
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "geoagritech".to_string(),
            "--config".to_string(),
            config_path.display().to_string(),
            "create-superadmin".to_string(),
            "--email".to_string(),
            "root@example.com".to_string(),
            "--password".to_string(),
            "Harvest#2024".to_string(),
        ])
        .unwrap();

        run_command(&cli).await.unwrap();

        let pool = crate::db::init(&data_dir).await.unwrap();
        let user = find_user_by_email(&pool, "root@example.com").await.unwrap().unwrap();
        assert_eq!(user.role_enum(), Role::SuperAdmin);
        assert!(user.is_verified);

        // A second run must not create a duplicate
        assert!(run_command(&cli).await.is_err());
    }
}
