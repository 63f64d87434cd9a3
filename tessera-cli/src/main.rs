//! Tessera CLI - administrative command line for the permission engine
//!
//! Grants, revokes and inspects permissions stored in the configured grant
//! store (SQLite by default).

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tessera_core::{
    config_error, init_logging, log_operation_error, log_operation_start, log_operation_success,
    validation_error, ErrorContext, LoggingConfig, StorageBackend, TenantId, TesseraConfig,
    TesseraError, TesseraResult, UserId,
};
use tessera_permissions::{
    ContentTypeScope, PermissionService, PermissionType, ResourceKind, Subject,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Manage hierarchical tenant permissions")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured SQLite database URL
    #[arg(long)]
    database: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Who a command applies to. Without a user the tenant default (or, without
/// a tenant as well, the global default) is addressed.
#[derive(clap::Args, Debug, Clone, Copy)]
struct SubjectArgs {
    /// User ID
    #[arg(short, long)]
    user: Option<UserId>,

    /// Tenant ID
    #[arg(short, long)]
    tenant: Option<TenantId>,
}

impl SubjectArgs {
    fn subject(&self) -> Subject {
        Subject::from_parts(self.user, self.tenant)
    }
}

#[derive(clap::Args, Debug, Clone, Copy)]
struct MemberArgs {
    /// User ID
    #[arg(short, long)]
    user: UserId,

    /// Tenant ID
    #[arg(short, long)]
    tenant: TenantId,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ResourceKindArg {
    Document,
    Folder,
}

struct Document;

impl ResourceKind for Document {
    const KIND: &'static str = "document";
    type Id = str;
}

struct Folder;

impl ResourceKind for Folder {
    const KIND: &'static str = "folder";
    type Id = str;
}

#[derive(clap::Args, Debug, Clone)]
struct ResourceArgs {
    /// Resource kind
    #[arg(long = "kind", value_enum)]
    kind: ResourceKindArg,

    /// Resource ID
    #[arg(long = "resource")]
    resource_id: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Add permissions to a grant
    Grant {
        #[command(flatten)]
        subject: SubjectArgs,

        /// Comma-separated permissions (e.g. read,edit)
        #[arg(short, long, value_delimiter = ',', required = true)]
        permissions: Vec<PermissionType>,

        /// Restrict the grant to one content type
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Remove permissions from a grant
    Revoke {
        #[command(flatten)]
        subject: SubjectArgs,

        /// Comma-separated permissions (e.g. read,edit)
        #[arg(short, long, value_delimiter = ',', required_unless_present = "all")]
        permissions: Vec<PermissionType>,

        /// Restrict the revocation to one content type
        #[arg(long, conflicts_with = "all")]
        content_type: Option<String>,

        /// Revoke the whole tenant-wide grant
        #[arg(long)]
        all: bool,
    },

    /// Check a single permission
    Check {
        #[command(flatten)]
        subject: SubjectArgs,

        /// Permission to check
        #[arg(short, long)]
        permission: PermissionType,

        /// Check within one content type
        #[arg(long, conflicts_with = "kind")]
        content_type: Option<String>,

        /// Check access to one resource
        #[arg(long = "kind", value_enum, requires = "resource_id")]
        kind: Option<ResourceKindArg>,

        /// Resource ID
        #[arg(long = "resource")]
        resource_id: Option<String>,
    },

    /// Show the effective permissions of a user
    Effective {
        /// User ID
        #[arg(short, long)]
        user: UserId,

        /// Tenant ID
        #[arg(short, long)]
        tenant: Option<TenantId>,
    },

    /// Add a user to a tenant
    Join {
        #[command(flatten)]
        member: MemberArgs,
    },

    /// Remove a user from a tenant
    Leave {
        #[command(flatten)]
        member: MemberArgs,
    },

    /// Set or clear the expiration of a membership
    Expire {
        #[command(flatten)]
        member: MemberArgs,

        /// Expiration time (RFC 3339)
        #[arg(long, conflicts_with = "never")]
        at: Option<DateTime<Utc>>,

        /// Remove the expiration
        #[arg(long)]
        never: bool,
    },

    /// List the tenants a user belongs to
    Members {
        /// User ID
        #[arg(short, long)]
        user: UserId,
    },

    /// Share a resource with a user
    Share {
        #[command(flatten)]
        resource: ResourceArgs,

        /// User to share with
        #[arg(short, long)]
        user: UserId,

        /// Tenant ID
        #[arg(short, long)]
        tenant: Option<TenantId>,

        /// Comma-separated permissions (e.g. read,comment)
        #[arg(short, long, value_delimiter = ',', required = true)]
        permissions: Vec<PermissionType>,

        /// Expire the share after this many hours
        #[arg(long)]
        expires_in_hours: Option<i64>,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize default configuration
        #[arg(long)]
        init: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    subject: String,
    permission: PermissionType,
    scope: &'a str,
    allowed: bool,
}

#[tokio::main]
async fn main() -> TesseraResult<()> {
    let cli = Cli::parse();
    let result = run(cli).await;
    if let Err(e) = &result {
        e.log();
    }
    result
}

async fn run(cli: Cli) -> TesseraResult<()> {
    let mut config = load_config(cli.config.as_ref())?;
    if let Some(url) = &cli.database {
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.database_url = url.clone();
    }

    let mut logging_config: LoggingConfig = config.logging.clone();
    if cli.verbose {
        logging_config.level = "debug".to_string();
    }

    init_logging(&logging_config).map_err(|e| TesseraError::Config {
        message: format!("Failed to initialize logging: {}", e),
        source: Some(e),
        context: ErrorContext::new("cli")
            .with_operation("init_logging")
            .with_suggestion("Check the [logging] section of your configuration"),
    })?;

    info!("Starting Tessera CLI v{}", env!("CARGO_PKG_VERSION"));

    if let Commands::Config {
        show,
        init,
        validate,
    } = cli.command
    {
        return handle_config(show, init, validate, cli.config.as_ref());
    }

    config.validate()?;
    let service = PermissionService::from_config(&config).await?;

    match cli.command {
        Commands::Grant {
            subject,
            permissions,
            content_type,
        } => handle_grant(&service, subject.subject(), &permissions, content_type, cli.json).await,
        Commands::Revoke {
            subject,
            permissions,
            content_type,
            all,
        } => {
            handle_revoke(
                &service,
                subject.subject(),
                &permissions,
                content_type,
                all,
                cli.json,
            )
            .await
        }
        Commands::Check {
            subject,
            permission,
            content_type,
            kind,
            resource_id,
        } => {
            handle_check(
                &service,
                subject,
                permission,
                content_type,
                kind.zip(resource_id),
                cli.json,
            )
            .await
        }
        Commands::Effective { user, tenant } => {
            let permissions = service.effective_permissions(user, tenant).await?;
            if cli.json {
                print_json(&permissions)?;
            } else if permissions.is_empty() {
                println!("{}: no permissions", Subject::user(user, tenant));
            } else {
                let names: Vec<String> = permissions.iter().map(|p| p.to_string()).collect();
                println!("{}: {}", Subject::user(user, tenant), names.join(", "));
            }
            Ok(())
        }
        Commands::Join { member } => {
            log_operation_start!("join", user = %member.user, tenant = %member.tenant);
            let grant = service.join(member.user, member.tenant).await?;
            log_operation_success!("join", grant_id = %grant.id);
            print_grant(&grant, cli.json)
        }
        Commands::Leave { member } => {
            match service.leave(member.user, member.tenant).await? {
                Some(grant) => print_grant(&grant, cli.json)?,
                None => println!("{} is not a member", Subject::member(member.user, member.tenant)),
            }
            Ok(())
        }
        Commands::Expire { member, at, never } => {
            if at.is_none() && !never {
                return Err(validation_error!(
                    "either --at or --never is required",
                    "at",
                    "cli"
                ));
            }
            let grant = service
                .update_expiration(member.user, member.tenant, at)
                .await?;
            print_grant(&grant, cli.json)
        }
        Commands::Members { user } => {
            let grants = service.list_tenants_for_user(user).await?;
            if cli.json {
                return print_json(&grants);
            }
            if grants.is_empty() {
                println!("User {} is not a member of any tenant", user);
            }
            for grant in grants {
                if let Some(tenant) = grant.subject().tenant_id() {
                    println!("{}  [{}]", tenant, grant.permissions);
                }
            }
            Ok(())
        }
        Commands::Share {
            resource,
            user,
            tenant,
            permissions,
            expires_in_hours,
        } => {
            let expires_at = share_expiry(Utc::now(), expires_in_hours)?;
            handle_share(&service, resource, user, tenant, &permissions, expires_at, cli.json).await
        }
        Commands::Config { .. } => Ok(()),
    }
}

/// Absolute expiry for `share --expires-in-hours`
fn share_expiry(
    now: DateTime<Utc>,
    expires_in_hours: Option<i64>,
) -> TesseraResult<Option<DateTime<Utc>>> {
    expires_in_hours
        .map(|hours| {
            Duration::try_hours(hours)
                .and_then(|delta| now.checked_add_signed(delta))
                .ok_or_else(|| {
                    validation_error!("expires_in_hours out of range", "expires_in_hours", "cli")
                })
        })
        .transpose()
}

fn load_config(config_path: Option<&PathBuf>) -> TesseraResult<TesseraConfig> {
    if let Some(path) = config_path {
        return TesseraConfig::from_file(path);
    }

    // Try to load from default locations
    let default_paths = [
        dirs::config_dir().map(|d| d.join("tessera").join("config.toml")),
        dirs::home_dir().map(|d| d.join(".tessera").join("config.toml")),
        Some(PathBuf::from("tessera.toml")),
    ];

    for path in default_paths.iter().flatten() {
        if path.exists() {
            return TesseraConfig::from_file(path);
        }
    }

    Ok(TesseraConfig::default())
}

/// Get the default configuration file path
fn get_config_path() -> TesseraResult<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
        .map(|dir| dir.join("tessera").join("config.toml"))
        .ok_or_else(|| config_error!("Could not determine a configuration directory", "cli"))
}

fn handle_config(
    show: bool,
    init: bool,
    validate: bool,
    config_path: Option<&PathBuf>,
) -> TesseraResult<()> {
    if init {
        let path = match config_path {
            Some(path) => path.clone(),
            None => get_config_path()?,
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        TesseraConfig::default().save_to_file(&path)?;
        println!("Configuration initialized at: {}", path.display());
    }

    if show {
        let config = load_config(config_path)?;
        let rendered = toml::to_string_pretty(&config).map_err(|e| TesseraError::Config {
            message: format!("Failed to render configuration: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("cli").with_operation("config_show"),
        })?;
        println!("{}", rendered);
    }

    if validate {
        let config = load_config(config_path)?;
        match config.validate() {
            Ok(()) => println!("Configuration is valid"),
            Err(e) => {
                println!("Configuration validation failed: {}", e);
                return Err(e);
            }
        }
    }

    Ok(())
}

async fn handle_grant(
    service: &PermissionService,
    subject: Subject,
    permissions: &[PermissionType],
    content_type: Option<String>,
    json: bool,
) -> TesseraResult<()> {
    log_operation_start!("grant", subject = %subject);

    let result = match content_type {
        Some(content_type) => service
            .grant_content_type(ContentTypeScope::new(subject, content_type), permissions)
            .await
            .map(|grant| (grant.id, grant.permissions)),
        None => service
            .grant(subject, permissions)
            .await
            .map(|grant| (grant.id, grant.permissions)),
    };

    let (id, granted) = result.map_err(|e| {
        log_operation_error!("grant", e, subject = %subject);
        e
    })?;
    log_operation_success!("grant", grant_id = %id);

    if json {
        print_json(&granted)
    } else {
        println!("{} now holds [{}]", subject, granted);
        Ok(())
    }
}

async fn handle_revoke(
    service: &PermissionService,
    subject: Subject,
    permissions: &[PermissionType],
    content_type: Option<String>,
    all: bool,
    json: bool,
) -> TesseraResult<()> {
    log_operation_start!("revoke", subject = %subject, all = all);

    let remaining = if all {
        service
            .revoke_all(subject)
            .await?
            .map(|_| tessera_permissions::PermissionSet::empty())
    } else {
        match content_type {
            Some(content_type) => service
                .revoke_content_type(ContentTypeScope::new(subject, content_type), permissions)
                .await?
                .map(|grant| grant.permissions),
            None => service
                .revoke(subject, permissions)
                .await?
                .map(|grant| grant.permissions),
        }
    };

    log_operation_success!("revoke", found = remaining.is_some());

    match (remaining, json) {
        (Some(set), true) => print_json(&set),
        (Some(set), false) => {
            println!("{} now holds [{}]", subject, set);
            Ok(())
        }
        (None, _) => {
            println!("No grant found for {}", subject);
            Ok(())
        }
    }
}

async fn handle_check(
    service: &PermissionService,
    subject: SubjectArgs,
    permission: PermissionType,
    content_type: Option<String>,
    resource: Option<(ResourceKindArg, String)>,
    json: bool,
) -> TesseraResult<()> {
    let (user, tenant) = (subject.user, subject.tenant);

    let (scope, allowed) = match (&content_type, &resource) {
        (_, Some((ResourceKindArg::Document, id))) => (
            Document::KIND,
            service
                .can_access_resource::<Document>(user, tenant, id, permission)
                .await?,
        ),
        (_, Some((ResourceKindArg::Folder, id))) => (
            Folder::KIND,
            service
                .can_access_resource::<Folder>(user, tenant, id, permission)
                .await?,
        ),
        (Some(content_type), None) => (
            content_type.as_str(),
            service
                .has_content_type_permission(user, tenant, content_type, permission)
                .await?,
        ),
        (None, None) => (
            "tenant",
            service.has_permission(user, tenant, permission).await?,
        ),
    };

    let output = CheckOutput {
        subject: subject.subject().to_string(),
        permission,
        scope,
        allowed,
    };

    if json {
        print_json(&output)
    } else {
        println!(
            "{} {} {} ({})",
            output.subject,
            if allowed { "has" } else { "lacks" },
            permission,
            scope
        );
        Ok(())
    }
}

async fn handle_share(
    service: &PermissionService,
    resource: ResourceArgs,
    user: UserId,
    tenant: Option<TenantId>,
    permissions: &[PermissionType],
    expires_at: Option<DateTime<Utc>>,
    json: bool,
) -> TesseraResult<()> {
    log_operation_start!("share", user = %user, resource = %resource.resource_id);

    let id = resource.resource_id.as_str();
    let grant = match resource.kind {
        ResourceKindArg::Document => {
            service
                .share_resource::<Document>(id, user, tenant, permissions, expires_at)
                .await?
        }
        ResourceKindArg::Folder => {
            service
                .share_resource::<Folder>(id, user, tenant, permissions, expires_at)
                .await?
        }
    };

    log_operation_success!("share", grant_id = %grant.id);

    if json {
        return print_json(&grant);
    }
    match grant.expires_at {
        Some(expires_at) => println!(
            "Shared {}/{} with {} [{}] until {}",
            grant.scope.resource_kind, grant.scope.resource_id, user, grant.permissions, expires_at
        ),
        None => println!(
            "Shared {}/{} with {} [{}]",
            grant.scope.resource_kind, grant.scope.resource_id, user, grant.permissions
        ),
    }
    Ok(())
}

fn print_grant(grant: &tessera_permissions::TenantGrant, json: bool) -> TesseraResult<()> {
    if json {
        return print_json(grant);
    }

    print!("{} [{}]", grant.subject(), grant.permissions);
    match grant.expires_at {
        Some(expires_at) => println!(" expires {}", expires_at),
        None => println!(),
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> TesseraResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
