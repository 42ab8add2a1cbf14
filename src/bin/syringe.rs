#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use syringe::client::{self, TerminalPasswordReader};
use syringe::command::{IDENTITY_FLAG, Invocation};
use syringe::config::ClientConfig;

/// Manage projects, environments and secrets on a syringe server.
#[derive(Debug, Parser)]
#[command(name = "syringe", version)]
struct Cli {
    /// Server host (default: SYRINGE_HOST or localhost)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Server port (default: SYRINGE_PORT or 22)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Identity key file, without the .pub extension
    #[arg(long, short = 'i', global = true)]
    identity: Option<PathBuf>,

    /// Username to authenticate as (default: USER)
    #[arg(long, env = "USER", global = true)]
    user: Option<String>,

    /// Connection timeout in seconds
    #[arg(long, global = true)]
    connect_timeout: Option<u64>,

    /// Never use the SSH agent, sign with the identity file directly
    #[arg(long, global = true)]
    no_agent: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register your public key under your username
    Register,
    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Manage environments of a project
    #[command(subcommand)]
    Environment(EnvironmentCommand),
    /// Manage secrets of an environment
    #[command(subcommand)]
    Secret(SecretCommand),
    /// Print every secret of an environment as KEY=value lines
    Inject(Scope),
}

#[derive(Debug, Subcommand)]
enum ProjectCommand {
    Add { name: String },
    Remove { name: String },
    Rename { name: String, new_name: String },
    List,
}

#[derive(Debug, Args)]
struct ProjectFlag {
    #[arg(long, short = 'p')]
    project: String,
}

#[derive(Debug, Subcommand)]
enum EnvironmentCommand {
    Add {
        name: String,
        #[command(flatten)]
        project: ProjectFlag,
    },
    Remove {
        name: String,
        #[command(flatten)]
        project: ProjectFlag,
    },
    Rename {
        name: String,
        new_name: String,
        #[command(flatten)]
        project: ProjectFlag,
    },
    List {
        #[command(flatten)]
        project: ProjectFlag,
    },
}

#[derive(Debug, Args)]
struct Scope {
    #[arg(long, short = 'p')]
    project: String,
    #[arg(long, short = 'e')]
    environment: String,
}

#[derive(Debug, Subcommand)]
enum SecretCommand {
    /// Set a secret; the value is encrypted before it is sent
    Set {
        key: String,
        value: String,
        #[command(flatten)]
        scope: Scope,
    },
    Get {
        key: String,
        #[command(flatten)]
        scope: Scope,
    },
    Remove {
        key: String,
        #[command(flatten)]
        scope: Scope,
    },
    List {
        #[command(flatten)]
        scope: Scope,
    },
}

fn scoped(invocation: Invocation, scope: Scope) -> Invocation {
    invocation
        .flag("project", scope.project)
        .flag("environment", scope.environment)
}

fn build_invocation(command: Command) -> Invocation {
    match command {
        Command::Register => Invocation::new(["register"]),
        Command::Project(command) => match command {
            ProjectCommand::Add { name } => Invocation::new(["project", "add"]).arg(name),
            ProjectCommand::Remove { name } => Invocation::new(["project", "remove"]).arg(name),
            ProjectCommand::Rename { name, new_name } => Invocation::new(["project", "rename"])
                .arg(name)
                .arg(new_name),
            ProjectCommand::List => Invocation::new(["project", "list"]),
        },
        Command::Environment(command) => match command {
            EnvironmentCommand::Add { name, project } => Invocation::new(["environment", "add"])
                .arg(name)
                .flag("project", project.project),
            EnvironmentCommand::Remove { name, project } => {
                Invocation::new(["environment", "remove"])
                    .arg(name)
                    .flag("project", project.project)
            }
            EnvironmentCommand::Rename {
                name,
                new_name,
                project,
            } => Invocation::new(["environment", "rename"])
                .arg(name)
                .arg(new_name)
                .flag("project", project.project),
            EnvironmentCommand::List { project } => {
                Invocation::new(["environment", "list"]).flag("project", project.project)
            }
        },
        Command::Secret(command) => match command {
            SecretCommand::Set { key, value, scope } => {
                scoped(Invocation::new(["secret", "set"]).arg(key).arg(value), scope)
            }
            SecretCommand::Get { key, scope } => {
                scoped(Invocation::new(["secret", "get"]).arg(key), scope)
            }
            SecretCommand::Remove { key, scope } => {
                scoped(Invocation::new(["secret", "remove"]).arg(key), scope)
            }
            SecretCommand::List { scope } => scoped(Invocation::new(["secret", "list"]), scope),
        },
        Command::Inject(scope) => scoped(Invocation::new(["inject"]), scope),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    // Diagnostics go to stderr so stdout only carries command output
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(user) = cli.user else {
        eprintln!("error: no username, pass --user or set USER");
        return ExitCode::FAILURE;
    };
    let config = ClientConfig::resolve(cli.host, cli.port, cli.identity, cli.connect_timeout);

    let mut invocation = build_invocation(cli.command);
    if let Some(identity) = config.identity.to_str() {
        invocation = invocation.flag(IDENTITY_FLAG, identity);
    }

    let result = client::run(
        &config,
        &user,
        invocation,
        !cli.no_agent,
        std::io::stdout(),
        std::io::stderr(),
        &mut TerminalPasswordReader,
    )
    .await;

    match result {
        Ok(status) => ExitCode::from(u8::try_from(status).unwrap_or(u8::MAX)),
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
