use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use dokploy_cli::{
    CertificateType, ComposeSpec, DokployClient, DomainSpec, FallbackPolicy, Overrides, Settings,
    parse_env_var,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dokploy", version)]
#[command(about = "Manage Dokploy projects, environments, compose apps, and domains")]
struct Cli {
    /// Dokploy base URL (falls back to DOKPLOY_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Dokploy API key (falls back to DOKPLOY_API_KEY)
    #[arg(long, global = true)]
    key: Option<String>,

    /// Per-request timeout in seconds (falls back to DOKPLOY_TIMEOUT_SECS, default 30)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Log requests and decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Manage environments
    Environment {
        #[command(subcommand)]
        command: EnvironmentCommands,
    },
    /// Manage compose apps
    Compose {
        #[command(subcommand)]
        command: ComposeCommands,
    },
    /// Manage domains
    Domain {
        #[command(subcommand)]
        command: DomainCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ProjectCommands {
    /// Create a project and its default environment
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Name of the default environment
        #[arg(long, default_value = "production")]
        environment: String,
    },
    /// Look a project up by name, creating it if it does not exist
    Ensure {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "production")]
        environment: String,
    },
    /// Resolve a project and environment name to their ids
    Get {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "production")]
        environment: String,
    },
    /// List all projects
    List {
        /// Print the raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a project
    Delete {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum EnvironmentCommands {
    /// Create an environment
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, alias = "projectId")]
        project_id: String,
    },
    /// Delete an environment
    Delete {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum ComposeCommands {
    /// Get a compose app by id
    Get {
        #[arg(long)]
        id: Option<String>,
        /// Not supported by the API; accepted for a clearer error
        #[arg(long)]
        name: Option<String>,
    },
    /// Create or update a compose app
    Create {
        /// Compose id; when given the compose is updated
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, alias = "environmentId")]
        environment_id: String,
        /// Path to the docker compose file
        #[arg(long)]
        compose_file: Option<PathBuf>,
        /// Environment variable in KEY=VALUE form (repeatable)
        #[arg(long = "env-var", alias = "env-vars", value_name = "KEY=VALUE")]
        env_vars: Vec<String>,
    },
    /// Delete a compose app
    Delete {
        #[arg(long)]
        id: String,
        /// Also delete associated volumes
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        delete_volumes: bool,
    },
    /// Deploy a compose app
    Deploy {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum DomainCommands {
    /// Create or update a domain
    Create {
        /// Domain id; when omitted an existing domain of the compose is reused
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        host: String,
        #[arg(long, default_value = "/")]
        path: String,
        #[arg(long)]
        port: u16,
        #[arg(long, alias = "serviceName")]
        service_name: String,
        #[arg(long, alias = "composeId")]
        compose_id: String,
        /// none or letsencrypt
        #[arg(long, alias = "certificateType", default_value = "none")]
        certificate_type: CertificateType,
        #[arg(long)]
        https: bool,
        /// Only reuse a domain with the same host and path
        #[arg(long)]
        exact_match: bool,
    },
    /// List the domains of a compose app
    List {
        #[arg(long, alias = "composeId")]
        compose_id: String,
    },
    /// Delete a domain
    Delete {
        #[arg(long)]
        id: String,
    },
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("warn,dokploy_cli=debug,dokploy=debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(&Overrides {
        url: cli.url,
        api_key: cli.key,
        timeout_secs: cli.timeout,
    })?;
    let client = DokployClient::from_settings(settings)?;
    tracing::debug!(base_url = client.base_url(), "dokploy client ready");

    match cli.command {
        Commands::Project { command } => project(&client, command).await,
        Commands::Environment { command } => environment(&client, command).await,
        Commands::Compose { command } => compose(&client, command).await,
        Commands::Domain { command } => domain(&client, command).await,
    }
}

async fn project(client: &DokployClient, command: ProjectCommands) -> anyhow::Result<()> {
    match command {
        ProjectCommands::Create {
            name,
            description,
            environment,
        } => {
            let (project_id, environment_id) = client
                .create_project(&name, &description, &environment)
                .await?;
            println!("{project_id}\t{environment_id}");
        }
        ProjectCommands::Ensure {
            name,
            description,
            environment,
        } => {
            let (project_id, environment_id, created) = client
                .ensure_project(&name, &description, &environment)
                .await?;
            if created {
                tracing::info!(%project_id, "created project");
            }
            println!("{project_id}\t{environment_id}");
        }
        ProjectCommands::Get { name, environment } => {
            let (project_id, environment_id) = client.resolve_project(&name, &environment).await?;
            println!("{project_id}\t{environment_id}");
        }
        ProjectCommands::List { json } => {
            let projects = client.list_projects().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
                return Ok(());
            }
            for p in &projects {
                let created = p
                    .created()
                    .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}\t{}\t{}", p.project_id, p.name, created);
                for e in &p.environments {
                    println!("  {}\t{}", e.environment_id, e.name);
                }
            }
        }
        ProjectCommands::Delete { id } => {
            client.delete_project(&id).await?;
            println!("Deleted project {id}");
        }
    }
    Ok(())
}

async fn environment(client: &DokployClient, command: EnvironmentCommands) -> anyhow::Result<()> {
    match command {
        EnvironmentCommands::Create { name, project_id } => {
            let id = client.create_environment(&name, &project_id).await?;
            println!("{id}");
        }
        EnvironmentCommands::Delete { id } => {
            client.delete_environment(&id).await?;
            println!("Deleted environment {id}");
        }
    }
    Ok(())
}

fn collect_env_vars(raw: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|kv| parse_env_var(kv).map_err(anyhow::Error::from))
        .collect()
}

async fn compose(client: &DokployClient, command: ComposeCommands) -> anyhow::Result<()> {
    match command {
        ComposeCommands::Get { id, name } => {
            if id.is_none() && name.is_none() {
                bail!("either --id or --name is required");
            }
            let compose = client.get_compose(id.as_deref().unwrap_or_default()).await?;
            println!("{}", serde_json::to_string_pretty(&compose)?);
        }
        ComposeCommands::Create {
            id,
            name,
            environment_id,
            compose_file,
            env_vars,
        } => {
            let id = id.filter(|s| !s.is_empty());
            let name = name.unwrap_or_default();
            if id.is_none() && name.is_empty() {
                bail!("--name is required when creating a compose (no --id given)");
            }
            let compose_file = match compose_file {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read compose file {}", path.display()))?,
                None => String::new(),
            };
            let spec = ComposeSpec {
                name,
                environment_id,
                compose_file,
                env: collect_env_vars(&env_vars)?,
            };
            let compose_id = client.create_or_update_compose(id.as_deref(), &spec).await?;
            println!("{compose_id}");
        }
        ComposeCommands::Delete { id, delete_volumes } => {
            client.delete_compose(&id, delete_volumes).await?;
            println!("Deleted compose {id}");
        }
        ComposeCommands::Deploy { id } => {
            client.deploy_compose(&id).await?;
            println!("Deployed compose {id}");
        }
    }
    Ok(())
}

async fn domain(client: &DokployClient, command: DomainCommands) -> anyhow::Result<()> {
    match command {
        DomainCommands::Create {
            id,
            host,
            path,
            port,
            service_name,
            compose_id,
            certificate_type,
            https,
            exact_match,
        } => {
            let policy = if exact_match {
                FallbackPolicy::ExactOnly
            } else {
                FallbackPolicy::FirstCandidate
            };
            let spec = DomainSpec {
                host,
                path,
                port,
                service_name,
                compose_id,
                certificate_type,
                https,
            };
            let domain_id = client
                .create_or_update_domain_with(id.as_deref(), spec, policy)
                .await?;
            println!("{domain_id}");
        }
        DomainCommands::List { compose_id } => {
            let domains = client.list_domains_by_compose_id(&compose_id).await?;
            println!("{}", serde_json::to_string_pretty(&domains)?);
        }
        DomainCommands::Delete { id } => {
            client.delete_domain(&id).await?;
            println!("Deleted domain {id}");
        }
    }
    Ok(())
}
