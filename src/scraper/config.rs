use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the automated browser session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Whether to run the browser in headless mode (default: true)
    pub headless: bool,

    /// Navigation timeout in seconds (default: 30)
    pub timeout_secs: u64,

    /// Wait time after a navigation or click for dynamic content in milliseconds (default: 1500)
    pub wait_after_load_ms: u64,

    /// User agent string to use
    pub user_agent: Option<String>,

    /// Browser window size in pixels (default: 1920x1080)
    pub window_width: u32,
    pub window_height: u32,

    /// Explicit Chrome/Chromium binary; autodetected when unset
    pub chrome_executable: Option<PathBuf>,

    /// Attempts to launch the browser before giving up (default: 3)
    pub reconnect_attempts: u32,

    /// Try to get past an anti-bot interstitial after the first navigation (default: true)
    pub bypass_challenge: bool,

    /// Page substrings that identify an anti-bot interstitial
    pub challenge_markers: Vec<String>,

    /// Controls to click on an interstitial, in priority order
    pub challenge_selectors: Vec<String>,

    /// Wait time while an interstitial resolves in milliseconds (default: 5000)
    pub challenge_wait_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            timeout_secs: 30,
            wait_after_load_ms: 1500,
            user_agent: Some(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
            ),
            window_width: 1920,
            window_height: 1080,
            chrome_executable: None,
            reconnect_attempts: 3,
            bypass_challenge: true,
            challenge_markers: vec![
                "challenge-platform".to_string(),
                "cf-challenge".to_string(),
                "px-captcha".to_string(),
                "captcha-delivery".to_string(),
            ],
            challenge_selectors: vec![
                "input[type=\"checkbox\"]".to_string(),
                "#px-captcha".to_string(),
                "button[type=\"submit\"]".to_string(),
            ],
            challenge_wait_ms: 5000,
        }
    }
}

impl SessionConfig {
    /// Get the navigation timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get the wait time after load as a Duration
    pub fn wait_after_load(&self) -> Duration {
        Duration::from_millis(self.wait_after_load_ms)
    }

    pub fn challenge_wait(&self) -> Duration {
        Duration::from_millis(self.challenge_wait_ms)
    }

    /// Create a config optimized for speed (less tolerant of slow pages)
    pub fn fast() -> Self {
        Self {
            timeout_secs: 15,
            wait_after_load_ms: 500,
            challenge_wait_ms: 2000,
            ..Default::default()
        }
    }

    /// Create a config optimized for flaky sites (slower)
    pub fn thorough() -> Self {
        Self {
            timeout_secs: 60,
            wait_after_load_ms: 3000,
            reconnect_attempts: 5,
            challenge_wait_ms: 10000,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = SessionConfig::default();
        assert!(config.headless);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.wait_after_load_ms, 1500);
        assert_eq!(config.reconnect_attempts, 3);
        assert!(config.bypass_challenge);
        assert!(!config.challenge_markers.is_empty());
        assert!(!config.challenge_selectors.is_empty());
        assert!(config.chrome_executable.is_none());
    }

    #[test]
    fn test_fast_config() {
        let config = SessionConfig::fast();
        assert_eq!(config.timeout_secs, 15);
        assert_eq!(config.wait_after_load_ms, 500);
        // Inherits defaults for the rest
        assert!(config.headless);
        assert_eq!(config.reconnect_attempts, 3);
    }

    #[test]
    fn test_thorough_config() {
        let config = SessionConfig::thorough();
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.reconnect_attempts, 5);
        assert_eq!(config.challenge_wait(), Duration::from_secs(10));
    }

    #[test]
    fn test_durations() {
        let config = SessionConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.wait_after_load(), Duration::from_millis(1500));
    }
}
