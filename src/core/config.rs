use crate::core::error::{SweepError, SweepResult};
use crate::features::antibot::PacingDelay;
use crate::scraping::site::SiteProfile;
use chrono::{Days, NaiveDate};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

// ---------------------------------------------------------------------------
// SweepFileConfig: file-based config loader (hotel-sweep.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "HOTEL_SWEEP_CONFIG";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_START_DATE: &str = "HOTEL_SWEEP_START_DATE";
pub const ENV_END_DATE: &str = "HOTEL_SWEEP_END_DATE";
pub const ENV_TOTAL_START_DATES: &str = "HOTEL_SWEEP_TOTAL_START_DATES";
pub const ENV_LENGTH_OF_STAY: &str = "HOTEL_SWEEP_LOS";
pub const ENV_MIN_CARDS: &str = "HOTEL_SWEEP_MIN_CARDS";
pub const ENV_POOL_SIZE: &str = "HOTEL_SWEEP_POOL_SIZE";
pub const ENV_MAX_LOAD_ROUNDS: &str = "HOTEL_SWEEP_MAX_LOAD_ROUNDS";
pub const ENV_MAX_TASK_ATTEMPTS: &str = "HOTEL_SWEEP_MAX_TASK_ATTEMPTS";
pub const ENV_STABLE_YIELD_LIMIT: &str = "HOTEL_SWEEP_STABLE_YIELD_LIMIT";
pub const ENV_OUTPUT_DIR: &str = "HOTEL_SWEEP_OUTPUT_DIR";
pub const ENV_HEADLESS: &str = "HOTEL_SWEEP_HEADLESS";

pub const DEFAULT_LENGTH_OF_STAY: u32 = 5;
pub const DEFAULT_MIN_CARDS_PER_TASK: usize = 100;
pub const DEFAULT_POOL_SIZE: usize = 24;
pub const DEFAULT_MAX_LOAD_ROUNDS: u32 = 5;
pub const DEFAULT_MAX_TASK_ATTEMPTS: u32 = 10;
pub const DEFAULT_STABLE_YIELD_LIMIT: u32 = 3;
pub const DEFAULT_SWEEP_DAYS: u64 = 30;
/// Upper bounds keep every derived check-in/check-out inside chrono's range.
pub const MAX_TOTAL_START_DATES: u32 = 3660;
pub const MAX_LENGTH_OF_STAY: u32 = 90;
pub const DEFAULT_OUTPUT_PREFIX: &str = "booking_com";

/// Top-level config loaded from `hotel-sweep.json`. Every field is optional.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct SweepFileConfig {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Number of check-in days to sweep. Ignored when `end_date` is set.
    pub total_start_dates: Option<u32>,
    pub length_of_stay: Option<u32>,
    pub min_cards_per_task: Option<usize>,
    pub pool_size: Option<usize>,
    pub max_load_rounds: Option<u32>,
    /// `0` retries forever.
    pub max_task_attempts: Option<u32>,
    pub stable_yield_limit: Option<u32>,
    pub output_dir: Option<String>,
    pub output_prefix: Option<String>,
    pub headless: Option<bool>,
    pub chrome_executable: Option<String>,
    #[serde(default)]
    pub site: SiteProfile,
}

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    let v = std::env::var(key).ok()?;
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl SweepFileConfig {
    /// Start date: JSON field → `HOTEL_SWEEP_START_DATE` → `None` (today at run time).
    pub fn resolve_start_date(&self) -> Option<NaiveDate> {
        self.start_date.or_else(|| env_value(ENV_START_DATE))
    }

    pub fn resolve_end_date(&self) -> Option<NaiveDate> {
        self.end_date.or_else(|| env_value(ENV_END_DATE))
    }

    pub fn resolve_total_start_dates(&self) -> Option<u32> {
        self.total_start_dates
            .or_else(|| env_value(ENV_TOTAL_START_DATES))
    }

    /// Max nights per pair: JSON field → `HOTEL_SWEEP_LOS` → 5.
    pub fn resolve_length_of_stay(&self) -> u32 {
        self.length_of_stay
            .or_else(|| env_value(ENV_LENGTH_OF_STAY))
            .unwrap_or(DEFAULT_LENGTH_OF_STAY)
    }

    /// Acceptance threshold: JSON field → `HOTEL_SWEEP_MIN_CARDS` → 100.
    pub fn resolve_min_cards_per_task(&self) -> usize {
        self.min_cards_per_task
            .or_else(|| env_value(ENV_MIN_CARDS))
            .unwrap_or(DEFAULT_MIN_CARDS_PER_TASK)
    }

    /// Worker slots: JSON field → `HOTEL_SWEEP_POOL_SIZE` → 24.
    pub fn resolve_pool_size(&self) -> usize {
        self.pool_size
            .or_else(|| env_value(ENV_POOL_SIZE))
            .unwrap_or(DEFAULT_POOL_SIZE)
    }

    pub fn resolve_max_load_rounds(&self) -> u32 {
        self.max_load_rounds
            .or_else(|| env_value(ENV_MAX_LOAD_ROUNDS))
            .unwrap_or(DEFAULT_MAX_LOAD_ROUNDS)
    }

    /// Attempt budget per task. `Some(0)` anywhere in the chain means unbounded.
    pub fn resolve_max_task_attempts(&self) -> Option<u32> {
        let n = self
            .max_task_attempts
            .or_else(|| env_value(ENV_MAX_TASK_ATTEMPTS))
            .unwrap_or(DEFAULT_MAX_TASK_ATTEMPTS);
        (n > 0).then_some(n)
    }

    pub fn resolve_stable_yield_limit(&self) -> u32 {
        self.stable_yield_limit
            .or_else(|| env_value(ENV_STABLE_YIELD_LIMIT))
            .unwrap_or(DEFAULT_STABLE_YIELD_LIMIT)
    }

    pub fn resolve_output_dir(&self) -> PathBuf {
        if let Some(d) = self.output_dir.as_ref().filter(|d| !d.trim().is_empty()) {
            return PathBuf::from(d);
        }
        env_value::<String>(ENV_OUTPUT_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn resolve_output_prefix(&self) -> String {
        self.output_prefix
            .as_ref()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_OUTPUT_PREFIX.to_string())
    }

    pub fn resolve_headless(&self) -> bool {
        self.headless
            .or_else(|| env_flag(ENV_HEADLESS))
            .unwrap_or(true)
    }

    /// Browser override: JSON field → `CHROME_EXECUTABLE` (only when the path exists).
    pub fn resolve_chrome_executable(&self) -> Option<String> {
        let candidate = self
            .chrome_executable
            .clone()
            .or_else(|| std::env::var(ENV_CHROME_EXECUTABLE).ok())?;
        let candidate = candidate.trim();
        if !candidate.is_empty() && Path::new(candidate).exists() {
            Some(candidate.to_string())
        } else {
            None
        }
    }

    pub fn resolve(&self) -> RunConfig {
        RunConfig {
            start_date: self.resolve_start_date(),
            end_date: self.resolve_end_date(),
            total_start_dates: self.resolve_total_start_dates(),
            length_of_stay: self.resolve_length_of_stay(),
            min_cards_per_task: self.resolve_min_cards_per_task(),
            pool_size: self.resolve_pool_size(),
            max_load_rounds: self.resolve_max_load_rounds(),
            max_task_attempts: self.resolve_max_task_attempts(),
            stable_yield_limit: self.resolve_stable_yield_limit(),
            output_dir: self.resolve_output_dir(),
            output_prefix: self.resolve_output_prefix(),
            headless: self.resolve_headless(),
            chrome_executable: self.resolve_chrome_executable(),
            site: self.site.clone(),
            pacing: Pacing::default(),
        }
    }
}

/// Load `hotel-sweep.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `HOTEL_SWEEP_CONFIG` env var path
/// 2. `./hotel-sweep.json`
/// 3. `~/.hotel-sweep/config.json`
///
/// Missing file → `SweepFileConfig::default()`.
/// Parse error → log a warning, return `SweepFileConfig::default()`.
pub fn load_sweep_config() -> SweepFileConfig {
    let mut candidates = vec![PathBuf::from("hotel-sweep.json")];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".hotel-sweep").join("config.json"));
    }
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in &candidates {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        return match serde_json::from_str::<SweepFileConfig>(&contents) {
            Ok(cfg) => {
                tracing::info!("hotel-sweep config loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    "hotel-sweep config parse error at {}: {} (using defaults)",
                    path.display(),
                    e
                );
                SweepFileConfig::default()
            }
        };
    }

    SweepFileConfig::default()
}

// ---------------------------------------------------------------------------

/// Every pause, wait and scroll budget used while driving a results page.
///
/// `Default` carries the production values; `Pacing::immediate()` zeroes all
/// durations so scripted drivers run instantly.
#[derive(Debug, Clone)]
pub struct Pacing {
    pub bottom_scroll_attempts: u32,
    pub bottom_scroll_pause: Duration,
    pub human_scroll_total_px: u32,
    pub human_scroll_step_px: u32,
    pub human_scroll_delay: PacingDelay,
    pub load_more_timeout: Duration,
    pub popup_timeout: Duration,
    pub popup_settle: Duration,
    pub new_cards_timeout: Duration,
    pub settle_scrolls: u32,
    pub settle_pause: Duration,
    pub field_timeout: Duration,
    /// How long a search-flow control may take to appear before clicking it.
    pub action_timeout: Duration,
    pub calendar_max_steps: u32,
    pub calendar_step_pause: Duration,
    pub post_search_pause: Duration,
    pub retry_pause: Duration,
    pub poll_interval: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            bottom_scroll_attempts: 3,
            bottom_scroll_pause: Duration::from_secs(2),
            human_scroll_total_px: 1000,
            human_scroll_step_px: 100,
            human_scroll_delay: PacingDelay::human_scroll(),
            load_more_timeout: Duration::from_secs(5),
            popup_timeout: Duration::from_secs(3),
            popup_settle: Duration::from_secs(2),
            new_cards_timeout: Duration::from_secs(10),
            settle_scrolls: 2,
            settle_pause: Duration::from_secs(2),
            field_timeout: Duration::from_secs(2),
            action_timeout: Duration::from_secs(30),
            calendar_max_steps: 12,
            calendar_step_pause: Duration::from_secs(1),
            post_search_pause: Duration::from_secs(3),
            retry_pause: Duration::from_secs(2),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl Pacing {
    pub fn immediate() -> Self {
        Self {
            bottom_scroll_pause: Duration::ZERO,
            human_scroll_delay: PacingDelay::none(),
            load_more_timeout: Duration::ZERO,
            popup_timeout: Duration::ZERO,
            popup_settle: Duration::ZERO,
            new_cards_timeout: Duration::ZERO,
            settle_pause: Duration::ZERO,
            field_timeout: Duration::ZERO,
            action_timeout: Duration::ZERO,
            calendar_step_pause: Duration::ZERO,
            post_search_pause: Duration::ZERO,
            retry_pause: Duration::ZERO,
            poll_interval: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Fully resolved run parameters.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_start_dates: Option<u32>,
    pub length_of_stay: u32,
    pub min_cards_per_task: usize,
    pub pool_size: usize,
    pub max_load_rounds: u32,
    pub max_task_attempts: Option<u32>,
    pub stable_yield_limit: u32,
    pub output_dir: PathBuf,
    pub output_prefix: String,
    pub headless: bool,
    pub chrome_executable: Option<String>,
    pub site: SiteProfile,
    pub pacing: Pacing,
}

impl Default for RunConfig {
    fn default() -> Self {
        SweepFileConfig::default().resolve()
    }
}

impl RunConfig {
    pub fn validate(&self) -> SweepResult<()> {
        if self.pool_size == 0 {
            return Err(SweepError::Config("pool_size must be at least 1".into()));
        }
        if self.min_cards_per_task == 0 {
            return Err(SweepError::Config(
                "min_cards_per_task must be at least 1".into(),
            ));
        }
        if self.length_of_stay > MAX_LENGTH_OF_STAY {
            return Err(SweepError::Config(format!(
                "length_of_stay {} exceeds {} nights",
                self.length_of_stay, MAX_LENGTH_OF_STAY
            )));
        }
        if let Some(days) = self.total_start_dates {
            if days > MAX_TOTAL_START_DATES {
                return Err(SweepError::Config(format!(
                    "total_start_dates {} exceeds {}",
                    days, MAX_TOTAL_START_DATES
                )));
            }
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(SweepError::Config(format!(
                    "end_date {} is before start_date {}",
                    end, start
                )));
            }
        }
        url::Url::parse(&self.site.base_url).map_err(|e| {
            SweepError::Config(format!("invalid site base_url '{}': {}", self.site.base_url, e))
        })?;
        Ok(())
    }

    /// Inclusive check-in range.
    ///
    /// `end_date` wins; otherwise `total_start_dates` days from the start;
    /// otherwise 30 days after the start. Fails instead of overflowing when
    /// the end would fall outside the representable calendar.
    pub fn date_range(&self, today: NaiveDate) -> SweepResult<(NaiveDate, NaiveDate)> {
        let start = self.start_date.unwrap_or(today);
        let end = match (self.end_date, self.total_start_dates) {
            (Some(end), _) => Some(end),
            (None, Some(days)) if days > 0 => start.checked_add_days(Days::new(u64::from(days) - 1)),
            // Zero days: an end before the start yields no tasks.
            (None, Some(_)) => start.checked_sub_days(Days::new(1)),
            (None, None) => start.checked_add_days(Days::new(DEFAULT_SWEEP_DAYS)),
        };
        let end = end.ok_or_else(|| {
            SweepError::Config(format!("check-in range starting {} is out of calendar range", start))
        })?;
        Ok((start, end))
    }

    /// `<output_dir>/<prefix>_<YYYYMMDD>.csv`
    pub fn output_path(&self, run_date: NaiveDate) -> PathBuf {
        self.output_dir.join(format!(
            "{}_{}.csv",
            self.output_prefix,
            run_date.format("%Y%m%d")
        ))
    }

    /// Apply command-line overrides on top of the resolved config.
    ///
    /// Accepts `--flag value` and `--flag=value`. Unknown flags are rejected.
    pub fn apply_cli_args<I, S>(&mut self, args: I) -> SweepResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            let (flag, inline) = match arg.split_once('=') {
                Some((f, v)) => (f.to_string(), Some(v.to_string())),
                None => (arg.clone(), None),
            };

            if flag == "--headed" {
                self.headless = false;
                i += 1;
                continue;
            }

            let value = match inline {
                Some(v) => v,
                None => {
                    i += 1;
                    args.get(i).cloned().ok_or_else(|| {
                        SweepError::Config(format!("missing value for {}", flag))
                    })?
                }
            };

            match flag.as_str() {
                "--start" => self.start_date = Some(parse_flag(&flag, &value)?),
                "--end" => self.end_date = Some(parse_flag(&flag, &value)?),
                "--days" => self.total_start_dates = Some(parse_flag(&flag, &value)?),
                "--los" => self.length_of_stay = parse_flag(&flag, &value)?,
                "--pool" => self.pool_size = parse_flag(&flag, &value)?,
                "--min-cards" => self.min_cards_per_task = parse_flag(&flag, &value)?,
                "--max-attempts" => {
                    let n: u32 = parse_flag(&flag, &value)?;
                    self.max_task_attempts = (n > 0).then_some(n);
                }
                "--out-dir" => self.output_dir = PathBuf::from(value),
                other => {
                    return Err(SweepError::Config(format!("unknown argument {}", other)));
                }
            }
            i += 1;
        }
        Ok(())
    }
}

fn parse_flag<T: FromStr>(flag: &str, value: &str) -> SweepResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| SweepError::Config(format!("invalid value '{}' for {}: {}", value, flag, e)))
}
