//! DEX instruction parsers: find the new token mint in a pool-creation transaction.
//!
//! Transactions are the `jsonParsed` shape returned by `getTransaction`,
//! where unparsed program instructions carry `programId` and `accounts`
//! as base58 strings.

use crate::config::{ORCA_WHIRLPOOL, RAYDIUM_AMM_V4};
use crate::domain::{EventType, WRAPPED_SOL_MINT};
use serde_json::Value;

/// Log fragments that mark pool creation.
const POOL_MARKERS: &[&str] = &["InitializePool", "initialize", "CreatePool"];
/// Log fragments that mark a fresh SPL mint.
const MINT_MARKERS: &[&str] = &["InitializeMint", "CreateMint"];

/// A mint found in a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub mint: String,
    pub pool: Option<String>,
    pub dex: &'static str,
}

pub trait InstructionParser: Send + Sync {
    fn name(&self) -> &'static str;

    fn program_id(&self) -> &'static str;

    /// Extract the candidate mint from an instruction's account list.
    fn parse(&self, accounts: &[&str]) -> Option<Detection>;
}

/// Raydium AMM v4 `initialize2`: coin mint at 7, pc mint at 8, amm id at 4.
#[derive(Debug, Default)]
pub struct RaydiumParser;

impl InstructionParser for RaydiumParser {
    fn name(&self) -> &'static str {
        "Raydium AMM V4"
    }

    fn program_id(&self) -> &'static str {
        RAYDIUM_AMM_V4
    }

    fn parse(&self, accounts: &[&str]) -> Option<Detection> {
        if accounts.len() < 15 {
            return None;
        }
        Some(Detection {
            mint: pick_non_base(accounts[7], accounts[8]).to_string(),
            pool: Some(accounts[4].to_string()),
            dex: self.name(),
        })
    }
}

/// Orca Whirlpool `initializePool`: mint A at 1, mint B at 2, whirlpool at 4.
#[derive(Debug, Default)]
pub struct OrcaParser;

impl InstructionParser for OrcaParser {
    fn name(&self) -> &'static str {
        "Orca Whirlpool"
    }

    fn program_id(&self) -> &'static str {
        ORCA_WHIRLPOOL
    }

    fn parse(&self, accounts: &[&str]) -> Option<Detection> {
        if accounts.len() < 8 {
            return None;
        }
        Some(Detection {
            mint: pick_non_base(accounts[1], accounts[2]).to_string(),
            pool: Some(accounts[4].to_string()),
            dex: self.name(),
        })
    }
}

/// Prefer the side that is not wrapped SOL; token/token pairs yield the first.
fn pick_non_base<'a>(a: &'a str, b: &'a str) -> &'a str {
    if a != WRAPPED_SOL_MINT {
        a
    } else {
        b
    }
}

pub struct ParserRegistry {
    parsers: Vec<Box<dyn InstructionParser>>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self {
            parsers: vec![Box::new(RaydiumParser), Box::new(OrcaParser)],
        }
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.parsers.iter().map(|p| p.name()).collect();
        f.debug_struct("ParserRegistry").field("parsers", &names).finish()
    }
}

impl ParserRegistry {
    pub fn parse_instruction(&self, program_id: &str, accounts: &[&str]) -> Option<Detection> {
        self.parsers
            .iter()
            .filter(|p| p.program_id() == program_id)
            .find_map(|p| p.parse(accounts))
    }

    /// Scan outer then inner instructions of `tx` that target `program`.
    pub fn detect(&self, tx: &Value, program: &str) -> Option<Detection> {
        let outer = tx
            .pointer("/transaction/message/instructions")
            .and_then(Value::as_array)
            .into_iter()
            .flatten();
        let inner = tx
            .pointer("/meta/innerInstructions")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|group| group.get("instructions").and_then(Value::as_array))
            .flatten();

        outer
            .chain(inner)
            .filter(|ix| ix.get("programId").and_then(Value::as_str) == Some(program))
            .find_map(|ix| {
                let accounts: Vec<&str> = ix
                    .get("accounts")?
                    .as_array()?
                    .iter()
                    .filter_map(Value::as_str)
                    .collect();
                self.parse_instruction(program, &accounts)
            })
    }
}

/// Classify a transaction by its log lines. Pool markers win over mint markers.
pub fn classify_logs<S: AsRef<str>>(logs: &[S]) -> Option<EventType> {
    let has = |markers: &[&str]| {
        logs.iter()
            .any(|line| markers.iter().any(|m| line.as_ref().contains(m)))
    };
    if has(POOL_MARKERS) {
        Some(EventType::NewPool)
    } else if has(MINT_MARKERS) {
        Some(EventType::NewMint)
    } else {
        None
    }
}

/// Log lines from a `getTransaction` result.
pub fn transaction_logs(tx: &Value) -> Vec<&str> {
    tx.pointer("/meta/logMessages")
        .and_then(Value::as_array)
        .map(|logs| logs.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raydium_accounts(coin: &str, pc: &str) -> Vec<String> {
        (0..18)
            .map(|i| match i {
                4 => "AmmId".to_string(),
                7 => coin.to_string(),
                8 => pc.to_string(),
                _ => format!("acc{}", i),
            })
            .collect()
    }

    #[test]
    fn test_raydium_picks_non_sol_mint() {
        let accounts = raydium_accounts(WRAPPED_SOL_MINT, "NewMint111");
        let refs: Vec<&str> = accounts.iter().map(String::as_str).collect();
        let detection = RaydiumParser.parse(&refs).unwrap();
        assert_eq!(detection.mint, "NewMint111");
        assert_eq!(detection.pool.as_deref(), Some("AmmId"));

        let accounts = raydium_accounts("TokA", "TokB");
        let refs: Vec<&str> = accounts.iter().map(String::as_str).collect();
        assert_eq!(RaydiumParser.parse(&refs).unwrap().mint, "TokA");
    }

    #[test]
    fn test_raydium_requires_full_account_list() {
        let refs = vec!["a"; 14];
        assert!(RaydiumParser.parse(&refs).is_none());
    }

    #[test]
    fn test_orca_layout() {
        let refs = vec!["cfg", WRAPPED_SOL_MINT, "OrcaMint", "funder", "pool", "va", "vb", "fee"];
        let detection = OrcaParser.parse(&refs).unwrap();
        assert_eq!(detection.mint, "OrcaMint");
        assert_eq!(detection.pool.as_deref(), Some("pool"));
        assert!(OrcaParser.parse(&refs[..7]).is_none());
    }

    #[test]
    fn test_registry_detects_inner_instruction() {
        let accounts = raydium_accounts("InnerMint", WRAPPED_SOL_MINT);
        let tx = json!({
            "transaction": {"message": {"instructions": [
                {"programId": "ComputeBudget111111111111111111111111111111", "accounts": [], "data": ""}
            ]}},
            "meta": {"innerInstructions": [
                {"index": 0, "instructions": [
                    {"programId": RAYDIUM_AMM_V4, "accounts": accounts, "data": "x"}
                ]}
            ]}
        });
        let registry = ParserRegistry::default();
        let detection = registry.detect(&tx, RAYDIUM_AMM_V4).unwrap();
        assert_eq!(detection.mint, "InnerMint");
        assert_eq!(detection.dex, "Raydium AMM V4");
        assert!(registry.detect(&tx, ORCA_WHIRLPOOL).is_none());
    }

    #[test]
    fn test_classify_logs() {
        let pool = ["Program log: initialize2: InitializeInstruction2"];
        assert_eq!(classify_logs(&pool), Some(EventType::NewPool));
        let mint = ["Program log: Instruction: InitializeMint2"];
        assert_eq!(classify_logs(&mint), Some(EventType::NewMint));
        let swap = ["Program log: Instruction: Swap"];
        assert_eq!(classify_logs(&swap), None);
    }

    #[test]
    fn test_transaction_logs() {
        let tx = json!({"meta": {"logMessages": ["a", "b"]}});
        assert_eq!(transaction_logs(&tx), vec!["a", "b"]);
        assert!(transaction_logs(&json!({})).is_empty());
    }
}
