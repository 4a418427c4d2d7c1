use std::{fmt::Display, str::FromStr};

use anyhow::{Context, Result, anyhow};

use super::config_model::{Database, DotEnvyConfig, Server};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let server = Server {
        port: env_or("SERVER_PORT", 8080)?,
        body_limit: env_or("SERVER_BODY_LIMIT", 1)?,
        timeout: env_or("SERVER_TIMEOUT", 30)?,
    };

    let database = Database {
        url: std::env::var("DATABASE_URL").context("DATABASE_URL is invalid")?,
        max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
        timeout: env_or("DATABASE_TIMEOUT", 5)?,
    };

    Ok(DotEnvyConfig { server, database })
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|err| anyhow!("{key} is invalid: {err}")),
        Err(_) => Ok(default),
    }
}
