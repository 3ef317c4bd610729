//! Notification configuration command
//!
//! Works on `notify.toml` directly; the daemon reads it at startup.

use anyhow::{bail, Result};
use sitevisor_notify::{
    notify_config_path, NotificationManager, Notifier, NotifyConfig, VALID_EVENTS,
    WEBHOOK_URL_ENV,
};

use crate::cli::{NotifyArgs, NotifyCommand};
use crate::output::{is_json_mode, print_error, print_info, print_json, print_success};

pub async fn execute(args: NotifyArgs) -> Result<()> {
    match args.command {
        NotifyCommand::Webhook { url, timeout } => configure_webhook(url, timeout),
        NotifyCommand::Remove => remove_webhook(),
        NotifyCommand::Events { set } => set_events(&set),
        NotifyCommand::Status => show_status(),
        NotifyCommand::Test => test_notification().await,
    }
}

/// The file as stored, without the environment override
fn load_stored() -> Result<NotifyConfig> {
    Ok(NotifyConfig::load_from(&notify_config_path())?)
}

fn configure_webhook(url: String, timeout: Option<u64>) -> Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        print_error(&format!("Not an http(s) URL: {}", url));
        bail!("Invalid webhook URL: {}", url);
    }

    let mut config = load_stored()?;
    config.set_webhook(url, timeout);
    config.save()?;

    print_success("Webhook notifications configured");
    print_info(&format!("Config saved to: {}", notify_config_path().display()));
    print_info("Restart the daemon (sitevisor kill) to apply");
    Ok(())
}

fn remove_webhook() -> Result<()> {
    let mut config = load_stored()?;
    config.remove_webhook();
    config.save()?;

    print_success("Webhook notifications removed");
    Ok(())
}

fn parse_events(events_str: &str) -> Vec<String> {
    events_str
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn set_events(events_str: &str) -> Result<()> {
    let mut config = load_stored()?;
    let events = parse_events(events_str);
    config.set_events(events.clone());

    if let Err(e) = config.validate_events() {
        print_error(&e.to_string());
        bail!(e);
    }

    config.save()?;

    if events.is_empty() {
        print_success("Event filter cleared - will notify on all events");
    } else {
        print_success(&format!("Events set to: {}", events.join(", ")));
    }
    Ok(())
}

fn show_status() -> Result<()> {
    let config = NotifyConfig::load()?;

    if is_json_mode() {
        print_json(&config);
        return Ok(());
    }

    println!();
    println!("Notification Configuration");
    println!("{}", "=".repeat(40));

    match config.webhook.as_ref().filter(|w| !w.url.is_empty()) {
        Some(webhook) => {
            println!("Webhook: configured");
            println!("  URL: {}", webhook.url);
            println!("  Timeout: {}s", webhook.timeout_secs);
            if std::env::var(WEBHOOK_URL_ENV).is_ok() {
                println!("  (URL taken from {})", WEBHOOK_URL_ENV);
            }
        }
        None => println!("Webhook: not configured"),
    }

    println!();
    if config.events.is_empty() {
        println!("Events: all (no filter)");
    } else {
        println!("Events: {}", config.events.join(", "));
    }
    println!("Valid events: {}", VALID_EVENTS.join(", "));

    println!();
    println!("Config file: {}", notify_config_path().display());
    Ok(())
}

async fn test_notification() -> Result<()> {
    let config = NotifyConfig::load()?;

    if !config.is_configured() {
        print_error("No notification channels configured");
        print_info("Run 'sitevisor notify webhook --url <URL>' to configure");
        bail!("Not configured");
    }

    let manager = NotificationManager::new(config)?;
    print_info("Sending test notification...");

    match manager.send("sitevisor test notification").await {
        Ok(()) => {
            print_success("Test notification sent successfully!");
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to send test notification: {}", e));
            bail!("Test notification failed: {}", e);
        }
    }
}
