//! Orderline CLI - Migrations, seeding and checkout runs.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! ol-cli migrate
//!
//! # Seed the catalog, and a cart for one user
//! ol-cli seed --user 6c1f0c1e-3a52-4a57-9a55-1f8b3f2a9c11
//!
//! # Price the cart, then place the order
//! ol-cli quote --user 6c1f0c1e-...
//! ol-cli checkout --user 6c1f0c1e-... --first-name Ada --last-name Lovelace \
//!     --line1 "1 Analytical Row" --city London --state London --postal-code N1 --country GB
//!
//! # Look after orders
//! ol-cli order show ORD-20260504-0001
//! ol-cli order status <order-id> shipped
//! ol-cli order cancel <order-id>
//!
//! # End-to-end run against an in-memory store
//! ol-cli demo
//! ```
//!
//! Every command except `demo` needs `ORDERLINE_DATABASE_URL`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Args, Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orderline_core::{OrderId, OrderNumber, OrderStatus, ShippingAddress, UserId};
use orderline_engine::EngineConfig;

mod commands;

#[derive(Parser)]
#[command(name = "ol-cli")]
#[command(author, version, about = "Orderline CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Insert the sample catalog, and optionally a cart
    Seed {
        /// Also fill this user's cart
        #[arg(long)]
        user: Option<UserId>,
    },
    /// Show what the user's cart would cost
    Quote {
        #[arg(long)]
        user: UserId,
    },
    /// Place an order from the user's cart
    Checkout {
        #[arg(long)]
        user: UserId,

        #[command(flatten)]
        address: AddressArgs,

        /// Free-text delivery notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// Inspect and update orders
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
    /// Run a full checkout against an in-memory store
    Demo,
}

#[derive(Subcommand)]
enum OrderAction {
    /// Show an order and its lines
    Show { number: OrderNumber },
    /// List a user's orders, newest first
    List {
        #[arg(long)]
        user: UserId,
    },
    /// Cancel an order and restore its stock
    Cancel { id: OrderId },
    /// Move an order to a new status
    Status {
        id: OrderId,
        /// `pending`, `confirmed`, `shipped`, `delivered` or `cancelled`
        status: OrderStatus,
    },
}

#[derive(Args)]
struct AddressArgs {
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long)]
    line1: String,
    #[arg(long)]
    line2: Option<String>,
    #[arg(long)]
    city: String,
    #[arg(long)]
    state: String,
    #[arg(long)]
    postal_code: String,
    #[arg(long, default_value = "US")]
    country: String,
}

impl From<AddressArgs> for ShippingAddress {
    fn from(args: AddressArgs) -> Self {
        Self {
            first_name: args.first_name,
            last_name: args.last_name,
            address_line1: args.line1,
            address_line2: args.line2,
            city: args.city,
            state: args.state,
            postal_code: args.postal_code,
            country: args.country,
        }
    }
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &EngineConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("Invalid configuration: {e}");
            }
            std::process::exit(2);
        }
    };

    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "orderline_engine=info,orderline_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli, &config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run(config).await?,
        Commands::Seed { user } => commands::seed::run(config, user).await?,
        Commands::Quote { user } => commands::checkout::quote(config, user).await?,
        Commands::Checkout {
            user,
            address,
            notes,
        } => commands::checkout::place(config, user, address.into(), notes).await?,
        Commands::Order { action } => match action {
            OrderAction::Show { number } => commands::order::show(config, &number).await?,
            OrderAction::List { user } => commands::order::list(config, user).await?,
            OrderAction::Cancel { id } => commands::order::cancel(config, id).await?,
            OrderAction::Status { id, status } => {
                commands::order::set_status(config, id, status).await?;
            }
        },
        Commands::Demo => commands::demo::run(config).await?,
    }
    Ok(())
}
