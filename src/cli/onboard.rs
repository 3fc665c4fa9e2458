use crate::config::{Config, expand_home};
use crate::db::Database;
use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, theme::ColorfulTheme};

pub struct Onboarding {
    pub config: Config,
    pub enable_notifications: bool,
}

pub fn run_onboarding(enable_notifications_flag: bool) -> Result<Onboarding> {
    println!("──────────────────────────────────────────");
    println!("  Welcome to taskpulse setup.");
    println!("──────────────────────────────────────────");

    let theme = ColorfulTheme::default();
    let defaults = Config::default();

    println!("\n[1/3] Database location");
    let db_input: String = Input::with_theme(&theme)
        .with_prompt("  SQLite file for tasks and reminders")
        .default(defaults.db_path.display().to_string())
        .interact_text()
        .context("Failed to read database path")?;
    let db_path = expand_home(&db_input);
    println!("  ✓ {}", db_path.display());

    println!("\n[2/3] Local API port");
    let api_port: u16 = Input::with_theme(&theme)
        .with_prompt("  Port for the notification center API")
        .default(defaults.api_port)
        .interact_text()
        .context("Failed to read API port")?;
    println!("  ✓ http://127.0.0.1:{api_port}");

    println!("\n[3/3] Desktop notifications");
    println!("  Without permission, reminders appear as in-app banners only.");

    let enable_notifications = if enable_notifications_flag {
        true
    } else {
        Confirm::with_theme(&theme)
            .with_prompt("  Enable desktop notifications now?")
            .default(true)
            .interact()
            .context("Failed to read notification input")?
    };

    let config = Config {
        db_path,
        api_port,
        ..defaults
    };

    config.ensure_bootstrap_files()?;
    config.save()?;
    let _ = Database::open(&config.db_path)?;

    println!("\n──────────────────────────────────────────");
    println!("  Setup complete!");
    println!("  Run `taskpulse service` to start reminder polling.");
    println!("──────────────────────────────────────────");

    Ok(Onboarding {
        config,
        enable_notifications,
    })
}
