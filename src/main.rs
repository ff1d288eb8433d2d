//! Listing Market operational entry point
//!
//! ```text
//! listing-market [--env ENV] [migrate|health]
//! ```
//!
//! Loads `config/<env>.yaml` (default `dev`), initialises logging, connects
//! PostgreSQL and Redis, then either applies the schema (`migrate`, the
//! default) or checks both backends (`health`).

use anyhow::{Context, bail};

use listing_market::MarketContext;
use listing_market::config::AppConfig;
use listing_market::store::EntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Migrate,
    Health,
}

fn get_env(args: &[String]) -> String {
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn get_command(args: &[String]) -> anyhow::Result<Command> {
    let mut skip_next = false;
    let mut command = None;
    for arg in args.iter().skip(1) {
        if skip_next {
            skip_next = false;
            continue;
        }
        match arg.as_str() {
            "--env" | "-e" => skip_next = true,
            "migrate" => command = Some(Command::Migrate),
            "health" => command = Some(Command::Health),
            other => bail!("unknown argument: {}", other),
        }
    }
    Ok(command.unwrap_or(Command::Migrate))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let env = get_env(&args);
    let command = get_command(&args)?;

    let app_config = AppConfig::load(&env)?;
    let _log_guard = listing_market::logging::init_logging(&app_config);

    tracing::info!(env = %env, ?command, "Starting listing-market");

    let ctx = MarketContext::connect(&app_config).await?;

    match command {
        Command::Migrate => {
            ctx.store
                .ensure_schema()
                .await
                .context("Schema migration failed")?;
            tracing::info!("Schema is up to date");
        }
        Command::Health => {
            let health = ctx.health_check().await;
            println!("store: {}", describe(&health.store));
            println!("cache: {}", describe(&health.cache));
            if !health.is_serving() {
                bail!("store is unavailable");
            }
        }
    }

    Ok(())
}

fn describe(check: &Result<(), String>) -> String {
    match check {
        Ok(()) => "ok".to_string(),
        Err(e) => format!("unavailable ({})", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_arg_parsing() {
        let a = args(&["listing-market", "--env", "prod", "health"]);
        assert_eq!(get_env(&a), "prod");
        assert_eq!(get_command(&a).unwrap(), Command::Health);

        let a = args(&["listing-market"]);
        assert_eq!(get_env(&a), "dev");
        assert_eq!(get_command(&a).unwrap(), Command::Migrate);

        assert!(get_command(&args(&["listing-market", "serve"])).is_err());
    }
}
