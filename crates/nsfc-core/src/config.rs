use std::{env, fs, net::SocketAddr, path::Path, path::PathBuf, time::Duration};

use crate::{
    domain::UserId, errors::Error, freshness::FreshnessPolicy, pipeline::PipelineSettings, Result,
};

/// Typed configuration, read from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub bot_admin_id: Option<UserId>,
    pub store_file: Option<PathBuf>,

    // Webhook (polling when `webhook_url` is unset)
    pub webhook_url: Option<String>,
    pub webhook_listen_addr: SocketAddr,
    pub webhook_max_connections: u8,

    // Workers
    pub worker_count: usize,
    pub update_queue_capacity: usize,
    pub outbound_timeout: Duration,

    // Telegram limits
    pub telegram_message_limit: usize,

    // Reply lifecycle
    pub edit_cache_capacity: u64,
    pub new_command_max_age: Duration,
    pub edited_command_max_age: Duration,
    pub edit_max_age: Duration,
    pub reply_retention: Duration,
    pub sweep_interval: Option<Duration>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let bot_admin_id = match env_str("BOT_ADMIN_ID").and_then(non_empty) {
            Some(raw) => Some(UserId(raw.trim().parse::<i64>().map_err(|_| {
                Error::Config(format!("BOT_ADMIN_ID is not a numeric user id: {raw}"))
            })?)),
            None => None,
        };
        let store_file = env_str("STORE_FILE").and_then(non_empty).map(PathBuf::from);

        let webhook_url = env_str("WEBHOOK_URL")
            .and_then(non_empty)
            .map(|u| u.trim_end_matches('/').to_string());
        let webhook_listen_addr = parse_listen_addr(
            env_str("WEBHOOK_LISTEN_ADDR").and_then(non_empty),
            env_str("PORT").and_then(non_empty),
        )?;
        let webhook_max_connections = env_u8("WEBHOOK_MAX_CONNECTIONS").unwrap_or(10);

        let worker_count = env_usize("WORKER_COUNT").unwrap_or(2).max(1);
        let update_queue_capacity = env_usize("UPDATE_QUEUE_CAPACITY").unwrap_or(256).max(1);
        let outbound_timeout =
            Duration::from_millis(env_u64("OUTBOUND_TIMEOUT_MS").unwrap_or(30_000));

        let telegram_message_limit = env_usize("TELEGRAM_MESSAGE_LIMIT").unwrap_or(4096);

        let edit_cache_capacity = env_u64("EDIT_CACHE_CAPACITY").unwrap_or(17).max(1);
        let new_command_max_age =
            Duration::from_secs(env_u64("NEW_COMMAND_MAX_AGE_SECS").unwrap_or(30));
        let edited_command_max_age =
            Duration::from_secs(env_u64("EDITED_COMMAND_MAX_AGE_SECS").unwrap_or(120));
        let edit_max_age = Duration::from_secs(env_u64("EDIT_MAX_AGE_SECS").unwrap_or(30));
        let reply_retention = Duration::from_secs(env_u64("REPLY_RETENTION_SECS").unwrap_or(120));
        let sweep_interval = env_u64("SWEEP_INTERVAL_SECS")
            .filter(|s| *s > 0)
            .map(Duration::from_secs);

        Ok(Self {
            telegram_bot_token,
            bot_admin_id,
            store_file,
            webhook_url,
            webhook_listen_addr,
            webhook_max_connections,
            worker_count,
            update_queue_capacity,
            outbound_timeout,
            telegram_message_limit,
            edit_cache_capacity,
            new_command_max_age,
            edited_command_max_age,
            edit_max_age,
            reply_retention,
            sweep_interval,
        })
    }

    pub fn freshness(&self) -> FreshnessPolicy {
        FreshnessPolicy {
            new_max_age: self.new_command_max_age,
            edited_origin_max_age: self.edited_command_max_age,
            edit_max_age: self.edit_max_age,
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            freshness: self.freshness(),
            message_limit: self.telegram_message_limit,
            admin_id: self.bot_admin_id,
        }
    }

    /// Full webhook URL: the configured base followed by the bot token path.
    pub fn webhook_endpoint(&self) -> Option<String> {
        self.webhook_url
            .as_ref()
            .map(|base| format!("{base}/{}", self.telegram_bot_token))
    }
}

fn parse_listen_addr(addr: Option<String>, port: Option<String>) -> Result<SocketAddr> {
    if let Some(addr) = addr {
        return addr
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("WEBHOOK_LISTEN_ADDR is not a socket address: {addr}")));
    }
    let port = match port {
        Some(p) => p
            .trim()
            .parse::<u16>()
            .map_err(|_| Error::Config(format!("PORT is not a port number: {p}")))?,
        None => 8080,
    };
    Ok(SocketAddr::from(([0, 0, 0, 0], port)))
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }
        out.push((key.to_string(), val));
    }
    out
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u8(key: &str) -> Option<u8> {
    env_str(key).and_then(|s| s.trim().parse::<u8>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
