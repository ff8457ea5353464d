//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use visor_core::config;

mod commands;

#[derive(Parser)]
#[command(name = "visor")]
#[command(version = "0.1")]
#[command(about = "Terminal client for the visor vision backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Sign in with email/password or a federated provider
    Login {
        /// Email address (prompted when omitted)
        #[arg(long)]
        email: Option<String>,

        /// Password (prompted when omitted)
        #[arg(long)]
        password: Option<String>,

        /// Sign in with Google instead of email/password
        #[arg(long, conflicts_with_all = ["email", "password"])]
        google: bool,
    },

    /// Create an account and sign in
    Signup {
        /// Email address
        #[arg(long)]
        email: String,

        /// Password
        #[arg(long)]
        password: String,
    },

    /// Sign out (clear the local session)
    Logout,

    /// Show the current session
    Whoami,

    /// Analyze an image (text extraction, labeling)
    Analyze {
        /// Path to the image file
        #[arg(value_name = "IMAGE")]
        image: String,

        /// Extract printed text
        #[arg(long)]
        text: bool,

        /// Generate semantic labels
        #[arg(long)]
        labels: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Set the backend base URL
    SetBackend {
        /// New base URL
        #[arg(value_name = "URL")]
        url: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = config::Config::load().context("load config")?;
    tracing::debug!(backend = %config.backend.effective_base_url(), "config loaded");

    match cli.command {
        Commands::Login {
            email,
            password,
            google,
        } => {
            if google {
                commands::auth::login_google(&config).await
            } else {
                commands::auth::login_password(&config, email.as_deref(), password.as_deref())
                    .await
            }
        }

        Commands::Signup { email, password } => {
            commands::auth::sign_up(&config, &email, &password).await
        }

        Commands::Logout => commands::auth::logout(),

        Commands::Whoami => commands::auth::whoami(),

        Commands::Analyze {
            image,
            text,
            labels,
        } => {
            commands::analyze::run(commands::analyze::AnalyzeRunOptions {
                image: &image,
                text,
                labels,
                config: &config,
            })
            .await
        }

        Commands::Config { command } => match command {
            ConfigCommands::Path => commands::config::path(),
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::SetBackend { url } => commands::config::set_backend(&url),
        },
    }
}
