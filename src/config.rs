use crate::error::{Error, Result};
use rand::Rng;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_STATS_BASE_URL: &str = "https://stats.nba.com/stats";
const DEFAULT_PROJECTIONS_BASE_URL: &str = "https://partner-api.prizepicks.com";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const DEFAULT_REFERER: &str = "https://www.nba.com/";

/// Ceiling for a single computed backoff wait
pub const MAX_BACKOFF: Duration = Duration::from_secs(15 * 60);

/// Inclusive range a random delay is drawn from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Result<Self> {
        if min > max {
            return Err(Error::Config(format!(
                "delay range min {:?} is greater than max {:?}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub const fn fixed(d: Duration) -> Self {
        Self { min: d, max: d }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let secs = rng.gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// How long to wait before retry number `attempt` (1-based).
///
/// Only one policy is active per run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `initial * factor^(attempt-1)`, stretched by a random fraction up to
    /// `jitter` (at most 1) of itself, capped at `MAX_BACKOFF`.
    Exponential {
        initial: Duration,
        factor: f64,
        jitter: f64,
    },
    /// A fresh draw from the same range every time.
    RandomRange(DelayRange),
}

impl Backoff {
    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        match *self {
            Backoff::Exponential {
                initial,
                factor,
                jitter,
            } => {
                let exp = attempt.saturating_sub(1).min(16) as i32;
                let base = initial.as_secs_f64() * factor.powi(exp);
                let stretch = if jitter > 0.0 {
                    rng.gen_range(0.0..=jitter.min(1.0))
                } else {
                    0.0
                };
                Duration::try_from_secs_f64(base * (1.0 + stretch))
                    .unwrap_or(MAX_BACKOFF)
                    .min(MAX_BACKOFF)
            }
            Backoff::RandomRange(range) => range.sample(rng),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::Exponential {
                initial: Duration::from_secs(2),
                factor: 2.0,
                jitter: 0.5,
            },
        }
    }
}

/// Everything the clients need, built once and passed down explicitly
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub stats_base_url: String,
    pub projections_base_url: String,
    pub user_agent: String,
    pub referer: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    /// Pause between consecutive work units
    pub unit_delay: DelayRange,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stats_base_url: DEFAULT_STATS_BASE_URL.to_string(),
            projections_base_url: DEFAULT_PROJECTIONS_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            unit_delay: DelayRange {
                min: Duration::from_secs(1),
                max: Duration::from_secs(5),
            },
        }
    }
}

impl Config {
    /// Load from the process environment (after `.env` has been read)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let max_attempts: u32 = parse_or(&lookup, "FETCH_MAX_ATTEMPTS", 5)?;
        if max_attempts == 0 {
            return Err(Error::Config(
                "FETCH_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let backoff = match lookup("FETCH_BACKOFF").as_deref().unwrap_or("exponential") {
            "exponential" => {
                let factor: f64 = parse_or(&lookup, "FETCH_BACKOFF_FACTOR", 2.0)?;
                let jitter: f64 = parse_or(&lookup, "FETCH_BACKOFF_JITTER", 0.5)?;
                if !factor.is_finite() || factor < 1.0 || !(0.0..=1.0).contains(&jitter) {
                    return Err(Error::Config(
                        "FETCH_BACKOFF_FACTOR must be >= 1 and FETCH_BACKOFF_JITTER within 0..=1"
                            .to_string(),
                    ));
                }
                Backoff::Exponential {
                    initial: secs_or(&lookup, "FETCH_BACKOFF_INITIAL_SECS", 2.0)?,
                    factor,
                    jitter,
                }
            }
            "random" => Backoff::RandomRange(DelayRange::new(
                secs_or(&lookup, "FETCH_RETRY_MIN_SECS", 10.0)?,
                secs_or(&lookup, "FETCH_RETRY_MAX_SECS", 15.0)?,
            )?),
            other => {
                return Err(Error::Config(format!(
                    "FETCH_BACKOFF must be 'exponential' or 'random', got '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            stats_base_url: lookup("STATS_BASE_URL").unwrap_or(defaults.stats_base_url),
            projections_base_url: lookup("PROJECTIONS_BASE_URL")
                .unwrap_or(defaults.projections_base_url),
            user_agent: lookup("FETCH_USER_AGENT").unwrap_or(defaults.user_agent),
            referer: lookup("FETCH_REFERER").unwrap_or(defaults.referer),
            request_timeout: secs_or(&lookup, "REQUEST_TIMEOUT_SECS", 30.0)?,
            retry: RetryPolicy {
                max_attempts,
                backoff,
            },
            unit_delay: DelayRange::new(
                secs_or(&lookup, "UNIT_DELAY_MIN_SECS", 1.0)?,
                secs_or(&lookup, "UNIT_DELAY_MAX_SECS", 5.0)?,
            )?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has unparsable value '{}'", key, raw))),
    }
}

fn secs_or<F>(lookup: &F, key: &str, default: f64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: f64 = parse_or(lookup, key, default)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|_| Error::Config(format!("{} must be a non-negative number of seconds", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_empty() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.stats_base_url, DEFAULT_STATS_BASE_URL);
        assert!(matches!(config.retry.backoff, Backoff::Exponential { .. }));
        assert_eq!(config.unit_delay.min, Duration::from_secs(1));
        assert_eq!(config.unit_delay.max, Duration::from_secs(5));
    }

    #[test]
    fn test_random_backoff_selected() {
        let config = Config::from_lookup(lookup_from(&[
            ("FETCH_BACKOFF", "random"),
            ("FETCH_RETRY_MIN_SECS", "10"),
            ("FETCH_RETRY_MAX_SECS", "15"),
        ]))
        .unwrap();
        match config.retry.backoff {
            Backoff::RandomRange(range) => {
                assert_eq!(range.min, Duration::from_secs(10));
                assert_eq!(range.max, Duration::from_secs(15));
            }
            other => panic!("unexpected backoff {:?}", other),
        }
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("FETCH_MAX_ATTEMPTS", "lots")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("FETCH_MAX_ATTEMPTS", "0")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("FETCH_BACKOFF", "linear")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[
                ("UNIT_DELAY_MIN_SECS", "6"),
                ("UNIT_DELAY_MAX_SECS", "3"),
            ])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_exponential_backoff_grows() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_secs(2),
            factor: 2.0,
            jitter: 0.0,
        };
        let mut rng = rand::thread_rng();
        assert_eq!(backoff.delay(1, &mut rng), Duration::from_secs(2));
        assert_eq!(backoff.delay(2, &mut rng), Duration::from_secs(4));
        assert_eq!(backoff.delay(3, &mut rng), Duration::from_secs(8));
    }

    #[test]
    fn test_huge_factor_is_capped() {
        let config =
            Config::from_lookup(lookup_from(&[("FETCH_BACKOFF_FACTOR", "1e300")])).unwrap();
        let mut rng = rand::thread_rng();
        for attempt in 1..=5 {
            assert!(config.retry.backoff.delay(attempt, &mut rng) <= MAX_BACKOFF);
        }
        assert_eq!(config.retry.backoff.delay(3, &mut rng), MAX_BACKOFF);

        assert!(matches!(
            Config::from_lookup(lookup_from(&[("FETCH_BACKOFF_FACTOR", "inf")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("FETCH_BACKOFF_JITTER", "1e300")])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_out_of_range_seconds_are_config_errors() {
        for (key, value) in [
            ("REQUEST_TIMEOUT_SECS", "1e20"),
            ("UNIT_DELAY_MAX_SECS", "-1"),
            ("FETCH_BACKOFF_INITIAL_SECS", "NaN"),
        ] {
            assert!(
                matches!(
                    Config::from_lookup(lookup_from(&[(key, value)])),
                    Err(Error::Config(_))
                ),
                "{}={}",
                key,
                value
            );
        }
    }

    #[test]
    fn test_jitter_and_random_range_stay_in_bounds() {
        let mut rng = rand::thread_rng();
        let backoff = Backoff::Exponential {
            initial: Duration::from_secs(1),
            factor: 3.0,
            jitter: 0.5,
        };
        for _ in 0..50 {
            let d = backoff.delay(2, &mut rng);
            assert!(d >= Duration::from_secs(3) && d <= Duration::from_secs_f64(4.5));
        }

        let range = DelayRange::new(Duration::from_secs(3), Duration::from_secs(6)).unwrap();
        for _ in 0..50 {
            let d = Backoff::RandomRange(range).delay(4, &mut rng);
            assert!(d >= range.min && d <= range.max);
        }
    }
}
