//! assetctl
//!
//! Command line front end for the attribution engine, backed by Redis.
//! Every command prints its result as pretty JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use assets_common::{
    parse_date, AssetKind, AssetRef, AttributionId, AttributionStatus, PhoneId, PhoneStatus, Role,
    SimCardId, SimStatus, UserId,
};
use attribution_engine::{
    AttributionEngine, AttributionFilter, Config, CreateAttribution, Inventory, NewPhone,
    NewSimCard, NewUser, PageRequest, RedisStore, Store, UpdateAttribution,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "assetctl", version, about = "Assign phones and SIM cards to users")]
struct Cli {
    /// Email of the acting user
    #[arg(long = "as", env = "ASSETCTL_ACTOR", global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage directory users
    #[command(subcommand)]
    User(UserCommand),
    /// Manage phones
    #[command(subcommand)]
    Phone(PhoneCommand),
    /// Manage SIM cards
    #[command(subcommand)]
    Sim(SimCommand),
    /// Assign, unassign or transfer a single asset
    #[command(subcommand)]
    Asset(AssetCommand),
    /// Assign a phone and/or SIM card to a user
    Create {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        phone: Option<PhoneId>,
        #[arg(long)]
        sim: Option<SimCardId>,
        /// Assignment date (YYYY-MM-DD), defaults to today
        #[arg(long, value_parser = date_arg)]
        date: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Edit the notes or status of an attribution
    Update {
        id: AttributionId,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        status: Option<AttributionStatus>,
    },
    /// Return an active attribution
    Return {
        id: AttributionId,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Move an active attribution to another user
    Transfer {
        id: AttributionId,
        #[arg(long)]
        to: UserId,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete an attribution, returning it first if still active
    Delete { id: AttributionId },
    /// Show one attribution
    Show { id: AttributionId },
    /// List attributions
    List {
        #[arg(long)]
        status: Option<AttributionStatus>,
        #[arg(long)]
        user: Option<UserId>,
        #[arg(long)]
        assigned_by: Option<UserId>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Every attribution that referenced an asset
    History { kind: AssetKind, id: u64 },
    /// Active attributions of a user
    Holdings { user: UserId },
    /// Read the assignment ledger
    #[command(subcommand)]
    Ledger(LedgerCommand),
}

#[derive(Subcommand)]
enum UserCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "USER")]
        role: Role,
        #[arg(long, default_value = "")]
        department: String,
    },
    List,
}

#[derive(Subcommand)]
enum PhoneCommand {
    Add {
        #[arg(long)]
        brand: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        imei: String,
        #[arg(long)]
        serial: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Set the inventory status (AVAILABLE, LOST, DAMAGED)
    Status { id: PhoneId, status: PhoneStatus },
    List,
}

#[derive(Subcommand)]
enum SimCommand {
    Add {
        #[arg(long)]
        number: String,
        #[arg(long)]
        iccid: String,
        #[arg(long)]
        carrier: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Set the inventory status (AVAILABLE, LOST, BLOCKED)
    Status { id: SimCardId, status: SimStatus },
    List,
}

#[derive(Subcommand)]
enum AssetCommand {
    Assign {
        kind: AssetKind,
        id: u64,
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        notes: Option<String>,
    },
    Unassign {
        kind: AssetKind,
        id: u64,
        #[arg(long)]
        notes: Option<String>,
    },
    Transfer {
        kind: AssetKind,
        id: u64,
        #[arg(long)]
        to: UserId,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Subcommand)]
enum LedgerCommand {
    Asset { kind: AssetKind, id: u64 },
    User { id: UserId },
}

fn date_arg(raw: &str) -> std::result::Result<NaiveDate, String> {
    parse_date(raw).map_err(|e| e.to_string())
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

struct App {
    engine: AttributionEngine,
    inventory: Inventory,
    actor: Option<String>,
    page_size: u32,
}

impl App {
    async fn actor(&self) -> Result<Option<UserId>> {
        match &self.actor {
            Some(email) => Ok(Some(self.engine.resolve_actor(email).await?.id)),
            None => Ok(None),
        }
    }

    async fn required_actor(&self) -> Result<UserId> {
        self.actor()
            .await?
            .context("This command needs an acting user: pass --as <email> or set ASSETCTL_ACTOR")
    }

    async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::User(UserCommand::Add {
                name,
                email,
                role,
                department,
            }) => print(
                &self
                    .inventory
                    .register_user(NewUser {
                        name,
                        email,
                        role,
                        department,
                    })
                    .await?,
            ),
            Command::User(UserCommand::List) => print(&self.inventory.users().await?),

            Command::Phone(PhoneCommand::Add {
                brand,
                model,
                imei,
                serial,
                notes,
            }) => print(
                &self
                    .inventory
                    .register_phone(NewPhone {
                        brand,
                        model,
                        imei,
                        serial_number: serial,
                        notes,
                    })
                    .await?,
            ),
            Command::Phone(PhoneCommand::Status { id, status }) => {
                print(&self.inventory.set_phone_status(id, status).await?)
            }
            Command::Phone(PhoneCommand::List) => {
                print(&self.inventory.assets(AssetKind::Phone).await?)
            }

            Command::Sim(SimCommand::Add {
                number,
                iccid,
                carrier,
                notes,
            }) => print(
                &self
                    .inventory
                    .register_sim_card(NewSimCard {
                        number,
                        iccid,
                        carrier,
                        notes,
                    })
                    .await?,
            ),
            Command::Sim(SimCommand::Status { id, status }) => {
                print(&self.inventory.set_sim_card_status(id, status).await?)
            }
            Command::Sim(SimCommand::List) => print(&self.inventory.assets(AssetKind::Sim).await?),

            Command::Asset(AssetCommand::Assign {
                kind,
                id,
                user,
                notes,
            }) => {
                let actor = self.required_actor().await?;
                print(
                    &self
                        .engine
                        .assign_asset(AssetRef { kind, id }, user, actor, notes)
                        .await?,
                )
            }
            Command::Asset(AssetCommand::Unassign { kind, id, notes }) => {
                let actor = self.actor().await?;
                print(
                    &self
                        .engine
                        .unassign_asset(AssetRef { kind, id }, actor, notes)
                        .await?,
                )
            }
            Command::Asset(AssetCommand::Transfer {
                kind,
                id,
                to,
                notes,
            }) => {
                let actor = self.required_actor().await?;
                print(
                    &self
                        .engine
                        .transfer_asset(AssetRef { kind, id }, to, actor, notes)
                        .await?,
                )
            }

            Command::Create {
                user,
                phone,
                sim,
                date,
                notes,
            } => {
                let actor = self.required_actor().await?;
                let request = CreateAttribution {
                    user_id: user,
                    phone_id: phone,
                    sim_card_id: sim,
                    assignment_date: date,
                    notes,
                };
                print(&self.engine.create_attribution(request, actor).await?)
            }
            Command::Update { id, notes, status } => {
                let actor = self.actor().await?;
                let changes = UpdateAttribution { notes, status };
                print(&self.engine.update_attribution(id, changes, actor).await?)
            }
            Command::Return { id, notes } => {
                let actor = self.actor().await?;
                print(&self.engine.return_attribution(id, notes, actor).await?)
            }
            Command::Transfer { id, to, notes } => {
                let actor = self.required_actor().await?;
                print(&self.engine.transfer_attribution(id, to, actor, notes).await?)
            }
            Command::Delete { id } => {
                let actor = self.actor().await?;
                self.engine.delete_attribution(id, actor).await?;
                print(&serde_json::json!({ "deleted": id }))
            }
            Command::Show { id } => print(&self.engine.get_attribution(id).await?),
            Command::List {
                status,
                user,
                assigned_by,
                search,
                page,
                limit,
            } => {
                let filter = AttributionFilter {
                    status,
                    user_id: user,
                    assigned_by_id: assigned_by,
                    search,
                };
                let page = match (page, limit) {
                    (None, None) => None,
                    (page, limit) => Some(PageRequest::new(
                        page.unwrap_or(1),
                        limit.unwrap_or(self.page_size),
                    )),
                };
                print(&self.engine.list_attributions(&filter, page).await?)
            }
            Command::History { kind, id } => {
                print(&self.engine.attribution_history(AssetRef { kind, id }).await?)
            }
            Command::Holdings { user } => {
                print(&self.engine.active_attributions_by_user(user).await?)
            }
            Command::Ledger(LedgerCommand::Asset { kind, id }) => {
                print(&self.engine.asset_history(AssetRef { kind, id }).await?)
            }
            Command::Ledger(LedgerCommand::User { id }) => {
                print(&self.engine.user_history(id).await?)
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,attribution_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    info!("Redis URL: {}", config.redis_url);

    let store: Arc<dyn Store> = Arc::new(
        RedisStore::connect(&config.redis_url)
            .await
            .context("Failed to initialize storage")?,
    );

    let app = App {
        engine: AttributionEngine::new(Arc::clone(&store), &config),
        inventory: Inventory::new(store, &config),
        actor: cli.actor,
        page_size: config.default_page_size,
    };

    app.run(cli.command).await
}
