// 📡 Simulated server connection
//
// Stands in for the ETOUR / SMOS back-end. Every service call asks the link
// first; an interruption aborts the call before anything is mutated. There
// is no retry.

use crate::config::LinkConfig;
use crate::error::{ServiceError, ServiceResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkMode {
    /// Every call succeeds
    Online,

    /// Every call fails
    Offline,

    /// Each call fails with the given probability
    Flaky { failure_rate: f64 },
}

pub struct ServerLink {
    server: String,
    mode: LinkMode,
    rng: StdRng,
    latency: Duration,
    interruptions: usize,
}

impl ServerLink {
    pub fn new(server: &str, mode: LinkMode, seed: Option<u64>, latency: Duration) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        ServerLink {
            server: server.to_string(),
            mode,
            rng,
            latency,
            interruptions: 0,
        }
    }

    pub fn online(server: &str) -> Self {
        Self::new(server, LinkMode::Online, None, Duration::ZERO)
    }

    pub fn from_config(server: &str, config: &LinkConfig) -> Self {
        let mode = if config.failure_rate <= 0.0 {
            LinkMode::Online
        } else if config.failure_rate >= 1.0 {
            LinkMode::Offline
        } else {
            LinkMode::Flaky {
                failure_rate: config.failure_rate,
            }
        };

        Self::new(
            server,
            mode,
            config.seed,
            Duration::from_millis(config.latency_ms),
        )
    }

    /// Gate a call on the connection being up
    pub fn check(&mut self) -> ServiceResult<()> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        let interrupted = match self.mode {
            LinkMode::Online => false,
            LinkMode::Offline => true,
            LinkMode::Flaky { failure_rate } => self.rng.gen_bool(failure_rate.clamp(0.0, 1.0)),
        };

        if interrupted {
            self.interruptions += 1;
            tracing::error!(server = %self.server, "connection interrupted");
            return Err(ServiceError::ConnectionInterrupted {
                server: self.server.clone(),
            });
        }

        Ok(())
    }

    pub fn set_mode(&mut self, mode: LinkMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    pub fn is_online(&self) -> bool {
        self.mode != LinkMode::Offline
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn interruptions(&self) -> usize {
        self.interruptions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_never_fails() {
        let mut link = ServerLink::online("ETOUR");
        for _ in 0..100 {
            assert!(link.check().is_ok());
        }
        assert_eq!(link.interruptions(), 0);
    }

    #[test]
    fn test_offline_always_fails() {
        let mut link = ServerLink::online("SMOS");
        link.set_mode(LinkMode::Offline);

        let err = link.check().unwrap_err();
        assert_eq!(err.to_string(), "Connection to the SMOS server was interrupted");
        assert!(!link.is_online());
        assert_eq!(link.interruptions(), 1);
    }

    #[test]
    fn test_seeded_flaky_link_is_reproducible() {
        let config = LinkConfig {
            failure_rate: 0.5,
            latency_ms: 0,
            seed: Some(7),
        };

        let mut a = ServerLink::from_config("ETOUR", &config);
        let mut b = ServerLink::from_config("ETOUR", &config);

        let run_a: Vec<bool> = (0..50).map(|_| a.check().is_ok()).collect();
        let run_b: Vec<bool> = (0..50).map(|_| b.check().is_ok()).collect();

        assert_eq!(run_a, run_b);
        // With p = 0.5 over 50 draws both outcomes show up
        assert!(run_a.contains(&true));
        assert!(run_a.contains(&false));
    }

    #[test]
    fn test_from_config_extremes() {
        let mut config = LinkConfig::default();
        config.failure_rate = 0.0;
        assert_eq!(ServerLink::from_config("ETOUR", &config).mode(), LinkMode::Online);

        config.failure_rate = 1.0;
        assert_eq!(ServerLink::from_config("ETOUR", &config).mode(), LinkMode::Offline);
    }
}
