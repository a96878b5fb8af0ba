//! Domain primitives: TimeMs, Mint, Mode.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wrapped SOL mint, the base asset every trade is priced against.
pub const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Lamports per SOL (base-asset decimals = 9).
pub const BASE_DECIMALS: u32 = 9;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, saturating at zero.
    pub fn since(&self, earlier: TimeMs) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0).max(0) as u64)
    }

    pub fn plus(&self, d: Duration) -> TimeMs {
        TimeMs(self.0.saturating_add(d.as_millis() as i64))
    }

    pub fn minus(&self, d: Duration) -> TimeMs {
        TimeMs(self.0.saturating_sub(d.as_millis() as i64))
    }
}

/// Token mint address (base58 string).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mint(pub String);

impl Mint {
    pub fn new(mint: impl Into<String>) -> Self {
        Mint(mint.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Shortened form for log lines: `abcd..wxyz`.
    pub fn short(&self) -> String {
        short_mint(&self.0)
    }
}

impl std::fmt::Display for Mint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Mint {
    fn from(s: &str) -> Self {
        Mint(s.to_string())
    }
}

pub fn short_mint(mint: &str) -> String {
    if mint.len() > 8 && mint.is_ascii() {
        format!("{}..{}", &mint[..4], &mint[mint.len() - 4..])
    } else {
        mint.to_string()
    }
}

/// Returns true if `s` decodes as a 32-byte base58 public key.
pub fn is_valid_pubkey(s: &str) -> bool {
    matches!(bs58::decode(s).into_vec(), Ok(bytes) if bytes.len() == 32)
}

/// Execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Real quotes, simulated fills, nothing broadcast.
    DryRun,
    /// Quotes turned into signed transactions.
    Live,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::DryRun => "dry_run",
            Mode::Live => "live",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_mint() {
        let mint = Mint::new("7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr");
        assert_eq!(mint.short(), "7GCi..W2hr");
        assert_eq!(short_mint("abc"), "abc");
    }

    #[test]
    fn test_mode_serialization() {
        let json = serde_json::to_string(&Mode::DryRun).unwrap();
        assert_eq!(json, "\"dry_run\"");
        assert_eq!(Mode::Live.to_string(), "live");
    }

    #[test]
    fn test_timems_since_saturates() {
        let t1 = TimeMs::new(1_000);
        let t2 = TimeMs::new(4_000);
        assert_eq!(t2.since(t1), Duration::from_secs(3));
        assert_eq!(t1.since(t2), Duration::ZERO);
        assert_eq!(t1.plus(Duration::from_secs(3)), t2);
        assert_eq!(t2.minus(Duration::from_secs(3)), t1);
    }

    #[test]
    fn test_pubkey_validation() {
        assert!(is_valid_pubkey(WRAPPED_SOL_MINT));
        assert!(!is_valid_pubkey("not-a-key"));
        assert!(!is_valid_pubkey(""));
    }
}
