use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::UserId, errors::Error, Result};

const DEFAULT_SPAM_KEYWORDS: &[&str] = &[
    "casino",
    "free money",
    "crypto giveaway",
    "click here",
    "bit.ly",
];

/// How inbound (non-owner) content is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutingMode {
    /// Everything goes to the owner.
    FixedOwner,
    /// A single target the owner sets and clears at runtime.
    Dynamic,
    /// A set of targets the owner adds to.
    TargetSet,
}

impl RoutingMode {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "fixed_owner" | "fixed-owner" | "owner" => Some(Self::FixedOwner),
            "dynamic" | "single" => Some(Self::Dynamic),
            "target_set" | "target-set" | "set" => Some(Self::TargetSet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FixedOwner => "fixed_owner",
            Self::Dynamic => "dynamic",
            Self::TargetSet => "target_set",
        }
    }
}

/// Whether photo/video/document messages go through keyword and rate admission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaRatePolicy {
    Exempt,
    Checked,
}

impl MediaRatePolicy {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "exempt" | "off" => Some(Self::Exempt),
            "checked" | "on" => Some(Self::Checked),
            _ => None,
        }
    }
}

/// Typed configuration for the relay.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub owner_id: UserId,

    // Admission
    pub rate_limit: u32,
    pub time_window: Duration,
    pub cooldown_table: Vec<Duration>,
    pub spam_keywords: Vec<String>,
    pub media_rate_policy: MediaRatePolicy,

    // Routing
    pub routing_mode: RoutingMode,
    pub allowed_document_extensions: Vec<String>,

    // Persistence
    pub address_book_path: PathBuf,

    // Runtime
    pub send_timeout: Duration,
    pub pending_input_timeout: Duration,
    pub history_capacity: usize,
    pub history_window: Duration,
    pub rate_state_idle: Duration,
}

impl Config {
    /// Load from the process environment (plus `.env` in the working directory).
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. Missing owner/token are fatal.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars(&lookup);

        let telegram_bot_token = vars
            .str("TELEGRAM_BOT_TOKEN")
            .or_else(|| vars.str("TELEGRAM_TOKEN"))
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;

        let owner_raw = vars
            .str("OWNER_ID")
            .or_else(|| vars.str("CHAT_ID"))
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("OWNER_ID environment variable is required".to_string())
            })?;
        let owner_id = owner_raw
            .trim()
            .parse::<i64>()
            .map(UserId)
            .map_err(|_| Error::Config(format!("OWNER_ID must be an integer, got {owner_raw}")))?;

        let rate_limit = vars.u32("RATE_LIMIT")?.unwrap_or(5);
        if rate_limit == 0 {
            return Err(Error::Config("RATE_LIMIT must be > 0".to_string()));
        }
        let window_secs = vars.u64("TIME_WINDOW_SECONDS")?.unwrap_or(60);
        if window_secs == 0 {
            return Err(Error::Config("TIME_WINDOW_SECONDS must be > 0".to_string()));
        }
        let time_window = Duration::from_secs(window_secs);

        let cooldown_table = match vars.str("COOLDOWN_SECONDS") {
            Some(raw) => parse_cooldowns(&raw)?,
            None => vec![
                Duration::from_secs(60),
                Duration::from_secs(300),
                Duration::from_secs(900),
            ],
        };

        let spam_keywords = match vars.str("SPAM_KEYWORDS") {
            Some(raw) => parse_csv_lower(&raw),
            None => DEFAULT_SPAM_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        };

        let media_rate_policy = match vars.str("MEDIA_RATE_POLICY") {
            Some(raw) => MediaRatePolicy::parse(&raw).ok_or_else(|| {
                Error::Config(format!(
                    "MEDIA_RATE_POLICY must be exempt or checked, got {raw}"
                ))
            })?,
            None => MediaRatePolicy::Exempt,
        };

        let routing_mode = match vars.str("ROUTING_MODE") {
            Some(raw) => RoutingMode::parse(&raw).ok_or_else(|| {
                Error::Config(format!(
                    "ROUTING_MODE must be fixed_owner, dynamic or target_set, got {raw}"
                ))
            })?,
            None => RoutingMode::FixedOwner,
        };

        let allowed_document_extensions = parse_extensions(
            &vars
                .str("ALLOWED_DOCUMENT_EXTENSIONS")
                .unwrap_or_else(|| ".zip".to_string()),
        );

        let address_book_path = PathBuf::from(
            vars.str("ADDRESS_BOOK_PATH")
                .and_then(non_empty)
                .unwrap_or_else(|| "user_data.json".to_string()),
        );

        let send_timeout = Duration::from_millis(vars.u64("SEND_TIMEOUT_MS")?.unwrap_or(10_000));
        let pending_input_timeout =
            Duration::from_secs(vars.u64("PENDING_INPUT_TIMEOUT_SECONDS")?.unwrap_or(300));
        let history_capacity = vars.usize("HISTORY_CAPACITY")?.unwrap_or(500).max(1);
        let history_hours = vars.u64("HISTORY_WINDOW_HOURS")?.unwrap_or(24);
        let history_window = history_hours
            .checked_mul(3600)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                Error::Config(format!("HISTORY_WINDOW_HOURS is too large: {history_hours}"))
            })?;
        let rate_state_idle =
            Duration::from_secs(vars.u64("RATE_STATE_IDLE_SECONDS")?.unwrap_or(3600));

        Ok(Self {
            telegram_bot_token,
            owner_id,
            rate_limit,
            time_window,
            cooldown_table,
            spam_keywords,
            media_rate_policy,
            routing_mode,
            allowed_document_extensions,
            address_book_path,
            send_timeout,
            pending_input_timeout,
            history_capacity,
            history_window,
            rate_state_idle,
        })
    }
}

struct Vars<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Vars<'_> {
    fn str(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.str(key) else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {raw}")))
    }

    fn u64(&self, key: &str) -> Result<Option<u64>> {
        self.parsed(key)
    }

    fn u32(&self, key: &str) -> Result<Option<u32>> {
        self.parsed(key)
    }

    fn usize(&self, key: &str) -> Result<Option<usize>> {
        self.parsed(key)
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

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
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_cooldowns(raw: &str) -> Result<Vec<Duration>> {
    let mut out = Vec::new();
    for part in raw.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let secs = part
            .parse::<u64>()
            .map_err(|_| Error::Config(format!("invalid cooldown seconds: {part}")))?;
        out.push(Duration::from_secs(secs));
    }
    if out.is_empty() {
        return Err(Error::Config(
            "COOLDOWN_SECONDS must list at least one duration".to_string(),
        ));
    }
    Ok(out)
}

fn parse_csv_lower(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_extensions(v: &str) -> Vec<String> {
    parse_csv_lower(v)
        .into_iter()
        .map(|ext| {
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{ext}")
            }
        })
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
