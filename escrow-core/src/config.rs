use bitcoin::Amount;
use escrow_script::Timelock;

/// How the fee deducted from an execution's output is computed. Kept deliberately small: a
/// full CEL-expression fee estimator is out of proportion for a single deduction here, but
/// the shape — a pluggable policy rather than a hardcoded constant — carries the idea over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePolicy {
    Fixed(Amount),
    SatsPerVByte(u64),
}

impl FeePolicy {
    pub fn fee_for_vsize(&self, vsize: u64) -> Amount {
        match self {
            FeePolicy::Fixed(amount) => *amount,
            FeePolicy::SatsPerVByte(rate) => Amount::from_sat(rate.saturating_mul(vsize)),
        }
    }
}

/// Recognized runtime configuration for the escrow core.
#[derive(Debug, Clone)]
pub struct Config {
    /// When set, every arbitration is resolved immediately with a canned verdict instead of
    /// waiting on an external arbiter. Surfaced to callers so a UI can label contracts
    /// accordingly.
    pub demo_mode: bool,
    pub unilateral_exit_delay: Timelock,
    pub fee_policy: FeePolicy,
    pub protocol_endpoint: String,
    pub items_per_page: u32,
    pub api_base_url: String,
    /// How long an execution waits for its signatures before the orchestrator cancels it with
    /// reason `timeout`. `None` disables expiry entirely.
    pub execution_ttl_seconds: Option<i64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            demo_mode: false,
            unilateral_exit_delay: Timelock::blocks(144),
            fee_policy: FeePolicy::SatsPerVByte(2),
            protocol_endpoint: "http://localhost:7070".to_string(),
            items_per_page: 25,
            api_base_url: "http://localhost:8080".to_string(),
            execution_ttl_seconds: Some(3600),
        }
    }
}
