use anyhow::{Context, Result};
use treasury_core::StaffDirectory;
use treasury_finance::DEFAULT_PAGE_SIZE;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub http_addr: String,
    /// Postgres when set, in-memory store otherwise.
    pub database_url: Option<String>,
    /// Invalidations are dropped when unset.
    pub redis_url: Option<String>,
    pub staff: StaffDirectory,
    pub page_size: usize,
    pub seed_funds: bool,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        let http_addr =
            std::env::var("HTTP_ADDR").unwrap_or_else(|_| default_http_addr.to_string());
        let database_url = optional_var("DATABASE_URL");
        let redis_url = optional_var("REDIS_URL");

        let staff = StaffDirectory::parse(&std::env::var("TREASURY_STAFF").unwrap_or_default())
            .context("TREASURY_STAFF is malformed")?;
        let page_size = match optional_var("TREASURY_PAGE_SIZE") {
            Some(value) => value
                .parse::<usize>()
                .context("TREASURY_PAGE_SIZE must be a positive integer")?
                .max(1),
            None => DEFAULT_PAGE_SIZE,
        };
        let seed_funds = match optional_var("TREASURY_SEED_FUNDS") {
            Some(value) => parse_flag(&value).context("TREASURY_SEED_FUNDS must be true or false")?,
            None => true,
        };

        Ok(Self {
            http_addr,
            database_url,
            redis_url,
            staff,
            page_size,
            seed_funds,
        })
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("unrecognised flag {other}"),
    }
}
