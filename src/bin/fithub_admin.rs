use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use fithub::config::{run_migrations, AppConfig, CatalogSeeder, DatabaseConfig};
use fithub::services::{CoachService, GiftCardService, LexiconFilter, WorkoutDayService};

#[derive(Parser)]
#[command(name = "fithub-admin")]
#[command(about = "Operational tasks for the FitHub backend", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database URL, overriding DATABASE_URL
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,

    /// Seed the subscription plan and its discount tiers
    SeedCatalog {
        /// Plan name
        #[arg(long, default_value = "standard")]
        name: String,

        /// Price per day in tenths of a currency unit
        #[arg(long, default_value = "10")]
        unit_price: i64,
    },

    /// Replace the password of an email account
    ResetPassword {
        #[arg(long)]
        email: String,

        #[arg(long, env = "FITHUB_NEW_PASSWORD")]
        password: String,
    },

    /// Create a reward and a batch of unused gift cards for it
    GenerateGiftCards {
        #[arg(long)]
        plan_id: i64,

        #[arg(long)]
        day_count: i32,

        #[arg(long, default_value = "1")]
        count: usize,
    },

    /// Recompute title, type, duration and volume of finished workout days
    BackfillWorkoutDays,
}

impl Cli {
    async fn execute(self) -> Result<()> {
        let pool = self.connect().await?;

        match self.command {
            Commands::Migrate => {
                run_migrations(&pool).await?;
                println!("Migrations applied");
            }
            Commands::SeedCatalog { name, unit_price } => {
                match CatalogSeeder::new(pool).seed_pricing(&name, unit_price).await? {
                    Some(plan_id) => println!("Seeded plan {plan_id}"),
                    None => println!("Catalog already seeded"),
                }
            }
            Commands::ResetPassword { email, password } => {
                let config = Arc::new(AppConfig::from_env()?);
                let filter = Arc::new(LexiconFilter::new(&config.sensitive_words)?);
                let coach_id = CoachService::new(pool, config, filter)
                    .reset_password(&email, &password)
                    .await?;
                println!("Password reset for coach {coach_id}");
            }
            Commands::GenerateGiftCards {
                plan_id,
                day_count,
                count,
            } => {
                let codes = GiftCardService::new(pool).generate(plan_id, day_count, count).await?;
                for code in codes {
                    println!("{code}");
                }
            }
            Commands::BackfillWorkoutDays => {
                let report = WorkoutDayService::new(pool).backfill().await?;
                println!(
                    "scanned={} updated={} skipped={}",
                    report.scanned, report.updated, report.skipped
                );
            }
        }

        Ok(())
    }

    async fn connect(&self) -> Result<PgPool> {
        DatabaseConfig::for_command(self.database_url.clone())?.create_pool().await
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    Cli::parse().execute().await
}
