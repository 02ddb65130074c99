use std::env;

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use diesel::prelude::*;

use closingdesk::{
    config::AppConfig,
    db, init_tracing,
    models::User,
    notifications::{reminders, transport},
    parser::{ContractParser, MockContractParser, ParseRequest, SignerInfo},
    schema::users,
    transactions::{self, FullIntake, SeedOptions},
};

const USAGE: &str = "Usage:
  scheduler reminders [YYYY-MM-DD]
  scheduler weekly-digest
  scheduler seed-demo <email>";

const DEMO_ELAPSED_DAYS: i64 = 20;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("reminders") => {
            let today = match args.next() {
                Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .with_context(|| format!("invalid date '{raw}', expected YYYY-MM-DD"))?,
                None => Utc::now().date_naive(),
            };
            run_reminders(today).await
        }
        Some("weekly-digest") => run_weekly_digest().await,
        Some("seed-demo") => {
            let email = args.next().context("seed-demo needs the account email")?;
            seed_demo(&email)
        }
        Some(cmd) => bail!("unknown command: {cmd}\n{USAGE}"),
        None => bail!("{USAGE}"),
    }
}

fn load_config() -> Result<AppConfig> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "scheduler",
        database_url = %config.redacted_database_url(),
        mail_enabled = config.mail_api_url.is_some(),
        "loaded configuration"
    );
    Ok(config)
}

async fn run_reminders(today: NaiveDate) -> Result<()> {
    let config = load_config()?;
    let pool = db::init_pool(&config.database_url)?;
    let mailer = transport::from_config(&config)?;

    let report = reminders::run_daily_scan(
        &pool,
        mailer.as_ref(),
        today,
        config.reminder_default_lead_days,
    )
    .await
    .context("daily reminder scan failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_weekly_digest() -> Result<()> {
    let config = load_config()?;
    let pool = db::init_pool(&config.database_url)?;
    let mailer = transport::from_config(&config)?;

    let report = reminders::run_weekly_digest(&pool, mailer.as_ref(), Utc::now().date_naive())
        .await
        .context("weekly digest failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Creates a transaction that started a few weeks ago so dashboards and
/// reminders have something to show. Milestones already behind us are stored
/// as completed.
fn seed_demo(email: &str) -> Result<()> {
    let config = load_config()?;
    let pool = db::init_pool(&config.database_url)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let user: User = users::table
        .filter(users::email.eq(email.trim().to_lowercase()))
        .first(&mut conn)
        .optional()?
        .with_context(|| format!("no account registered for {email}"))?;

    let today = Utc::now().date_naive();
    let parser = MockContractParser::with_effective_date(today - Duration::days(DEMO_ELAPSED_DAYS));
    let parsed = parser.parse(&ParseRequest {
        document_name: "48_Orchard_Lane_Westfield_NJ.pdf".to_string(),
        signers: vec![
            SignerInfo {
                role: "buyer".into(),
                name: "Jordan Reyes".into(),
                email: "jordan.reyes@example.com".into(),
            },
            SignerInfo {
                role: "seller".into(),
                name: "Morgan Blake".into(),
                email: "morgan.blake@example.com".into(),
            },
        ],
    })?;

    let (transaction, milestones) = transactions::create_full(
        &mut conn,
        user.id,
        &FullIntake::from(&parsed),
        SeedOptions {
            completed_before: Some(today),
        },
    )?;

    println!(
        "Seeded transaction {} ({}) with {} milestones",
        transaction.id,
        transaction.property_address.as_deref().unwrap_or("no address"),
        milestones.len()
    );
    Ok(())
}
