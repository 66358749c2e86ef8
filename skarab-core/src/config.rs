//! Engine configuration. No environment variables or config files are
//! consulted — every value is supplied by the embedder or CLI flags.

use crate::error::ConfigError;
use crate::image::validate_chunk_size;
use crate::time::WallClock;

pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 20;
pub const DEFAULT_PROBLEMS_LIMIT: u32 = 10;
pub const DEFAULT_BURST_LIMIT: u32 = 50;

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub chunk_size: usize,
    pub retry_interval: WallClock,
    pub burst_limit: u32,
    pub problems_limit: u32,
}

impl Config {
    pub fn new(chunk_size: usize, burst_limit: u32, problems_limit: u32) -> Result<Self, ConfigError> {
        validate_chunk_size(chunk_size)?;
        Ok(Config {
            chunk_size,
            retry_interval: WallClock::from_ms(DEFAULT_RETRY_INTERVAL_MS),
            burst_limit,
            problems_limit,
        })
    }

    pub fn with_defaults(chunk_size: usize) -> Result<Self, ConfigError> {
        Self::new(chunk_size, DEFAULT_BURST_LIMIT, DEFAULT_PROBLEMS_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_chunk_size() {
        assert!(Config::new(10, 50, 10).is_err());
        assert!(Config::new(9001, 50, 10).is_err());
    }

    #[test]
    fn defaults_match_spec() {
        let c = Config::with_defaults(1988).unwrap();
        assert_eq!(c.burst_limit, DEFAULT_BURST_LIMIT);
        assert_eq!(c.problems_limit, DEFAULT_PROBLEMS_LIMIT);
        assert_eq!(c.retry_interval, WallClock::from_ms(20));
    }
}
