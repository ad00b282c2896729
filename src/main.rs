// Command line front end for the medication reminder client: talks to the
// backend configured in `.env` and keeps the session in a local JSON file.
use std::{process::exit, sync::Arc};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::{error, info};
use tokio::sync::mpsc;

use medreminder_client::{
    api::ApiClient,
    config::ClientConfig,
    error::ClientError,
    events::ReminderEvents,
    models::{ContactMessage, Credentials, NewReminder},
    push::{ProvidedTokenPlatform, PushTokenManager},
    schedule::{derive_reminder_times, parse_times_per_day},
    session::{FileStore, Session},
    timing::{self, Countdown, TreatmentProgress, COUNTDOWN_TICK},
    types::ClockTime,
    util::{self, get_short_token},
};

#[derive(Parser, Debug)]
#[command(name = "medreminder", version, about = "Medication reminder client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the default reminder times for a dose frequency.
    Slots { times_per_day: String },
    Login {
        phone: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    Medications,
    Reminders,
    /// Create a reminder, either from explicit times or from the dose frequency.
    Remind {
        medication_id: i64,
        #[arg(long)]
        per_day: Option<String>,
        #[arg(long, value_delimiter = ',')]
        times: Vec<String>,
    },
    Toggle { reminder_id: i64 },
    DeleteMedication { medication_id: i64 },
    Adherence {
        reminder_id: i64,
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Treatment progress for a medication.
    Progress { medication_id: i64 },
    /// Live countdown to an RFC 3339 timestamp. Ctrl-C stops it.
    Countdown { end: String },
    Contact {
        name: String,
        email: String,
        message: String,
    },
    /// Push notification registration for this device.
    Notify {
        #[command(subcommand)]
        action: NotifyAction,
    },
}

#[derive(Subcommand, Debug)]
enum NotifyAction {
    /// Register a device token with the backend.
    Enable { token: String },
    Status,
    /// Ask the backend to push a test notification to the cached token.
    Test,
    Disable,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    util::init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli.command).await {
        error!("command failed: {e}");
        eprintln!("{}", e.user_message());
        exit(1);
    }
}

async fn run(command: Command) -> Result<(), ClientError> {
    match command {
        Command::Slots { times_per_day } => {
            let n = parse_times_per_day(&times_per_day)?;
            let times: Vec<String> = derive_reminder_times(n)?.iter().map(ToString::to_string).collect();
            println!("{}", times.join(" "));
            Ok(())
        }
        Command::Countdown { end } => run_countdown(&end).await,
        command => run_with_backend(command).await,
    }
}

async fn run_countdown(end: &str) -> Result<(), ClientError> {
    let end = DateTime::parse_from_rfc3339(end.trim())
        .map_err(|_| ClientError::validation("end", "Use an RFC 3339 timestamp, e.g. 2026-12-31T20:00:00Z."))?
        .timestamp_millis();

    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tx.send(()).await.ok();
        }
    });

    let last = timing::start_countdown_loop(end, COUNTDOWN_TICK, rx, |countdown| match countdown {
        Countdown::Expired => println!("expired"),
        Countdown::Remaining { days, hours, minutes, seconds } => {
            println!("{days}d {hours:02}:{minutes:02}:{seconds:02}")
        }
    })
    .await;
    info!("countdown finished, expired={}", last.is_expired());
    Ok(())
}

async fn run_with_backend(command: Command) -> Result<(), ClientError> {
    let config = ClientConfig::from_env()?;
    let session = Session::new(Arc::new(FileStore::open(&config.session_path).await?));
    if let Some(language) = &config.language {
        session.set_language(language).await?;
    }
    let api = ApiClient::new(config.api_base_url.clone(), session, ReminderEvents::new());

    match command {
        Command::Login { phone, password } => {
            let auth = api.login(&Credentials { phone, password }).await?;
            println!("Logged in as {}", auth.user.name.unwrap_or(auth.user.phone));
        }
        Command::Logout => {
            api.logout().await?;
            println!("Logged out");
        }
        Command::Medications => {
            for med in api.list_medications().await? {
                let per_day = med
                    .times_per_day()
                    .map(|n| format!("{n}x/day"))
                    .unwrap_or_else(|| "dosage not confirmed".to_string());
                println!("{:>5}  {}  ({})", med.id, med.name, per_day);
            }
        }
        Command::Reminders => {
            for reminder in api.list_reminders().await? {
                let times: Vec<String> = reminder.times.iter().map(ToString::to_string).collect();
                let state = if reminder.enabled { "on" } else { "off" };
                println!("{:>5}  medication {}  [{}]  {}", reminder.id, reminder.medication_id, state, times.join(" "));
            }
        }
        Command::Remind { medication_id, per_day, times } => {
            let created = if !times.is_empty() {
                let times = times
                    .iter()
                    .map(|t| t.parse::<ClockTime>())
                    .collect::<Result<Vec<_>, _>>()?;
                api.create_reminder(&NewReminder { medication_id, times, enabled: true }).await?
            } else {
                let medication = api.get_medication(medication_id).await?;
                let per_day = per_day.as_deref().map(parse_times_per_day).transpose()?;
                api.create_auto_reminder(&medication, per_day).await?
            };
            let times: Vec<String> = created.times.iter().map(ToString::to_string).collect();
            println!("Reminder {} created: {}", created.id, times.join(" "));
        }
        Command::Toggle { reminder_id } => {
            let reminder = api.toggle_reminder(reminder_id).await?;
            println!("Reminder {} is now {}", reminder.id, if reminder.enabled { "on" } else { "off" });
        }
        Command::DeleteMedication { medication_id } => {
            api.delete_medication(medication_id).await?;
            println!("Medication {medication_id} deleted");
        }
        Command::Adherence { reminder_id, days } => {
            let stats = api.adherence(reminder_id, days).await?;
            println!(
                "{} of {} doses taken, {} missed ({:.0}%)",
                stats.taken_doses, stats.expected_doses, stats.missed_doses, stats.adherence_rate * 100.0
            );
        }
        Command::Progress { medication_id } => {
            let medication = api.get_medication(medication_id).await?;
            match medication.treatment_progress(Utc::now()) {
                TreatmentProgress::Unspecified => println!("{}: duration unspecified", medication.name),
                TreatmentProgress::Tracked { elapsed_days, progress_percent, remaining_days } => println!(
                    "{}: day {} ({}%), {} days remaining",
                    medication.name, elapsed_days, progress_percent, remaining_days
                ),
            }
        }
        Command::Contact { name, email, message } => {
            api.send_contact_message(&ContactMessage { name, email, message }).await?;
            println!("Message sent");
        }
        Command::Notify { action } => run_notify(&config, &api, action).await?,
        Command::Slots { .. } | Command::Countdown { .. } => {}
    }
    Ok(())
}

async fn run_notify(config: &ClientConfig, api: &ApiClient, action: NotifyAction) -> Result<(), ClientError> {
    let session = api.session().clone();
    let token = match &action {
        NotifyAction::Enable { token } => Some(token.clone()),
        _ => session.push_token().await,
    };
    let mut push = PushTokenManager::new(
        Arc::new(ProvidedTokenPlatform::new(token)),
        Arc::new(api.clone()),
        session,
        config.vapid_key.clone(),
        config.device_type,
    );

    match action {
        NotifyAction::Enable { .. } => {
            let token = push.enable().await?;
            println!("Notifications enabled (...{})", get_short_token(&token));
        }
        NotifyAction::Status => {
            let enabled = push.check_status().await?;
            println!("Notifications are {}", if enabled { "enabled" } else { "disabled" });
        }
        NotifyAction::Test => {
            push.send_test_notification().await?;
            println!("Test notification sent");
        }
        NotifyAction::Disable => {
            push.disable().await?;
            println!("Notifications disabled");
        }
    }
    Ok(())
}
