//! Supported-asset registry.
//!
//! Maps user-friendly aliases ("btc", "Bitcoin") to canonical upstream ids
//! ("bitcoin") and back to short display tickers.

/// (alias, upstream id) pairs. Aliases are lowercase.
const ALIASES: &[(&str, &str)] = &[
    ("btc", "bitcoin"),
    ("bitcoin", "bitcoin"),
    ("eth", "ethereum"),
    ("ethereum", "ethereum"),
    ("ada", "cardano"),
    ("cardano", "cardano"),
    ("sol", "solana"),
    ("solana", "solana"),
    ("dot", "polkadot"),
    ("polkadot", "polkadot"),
    ("matic", "matic-network"),
    ("polygon", "matic-network"),
    ("link", "chainlink"),
    ("chainlink", "chainlink"),
    ("avax", "avalanche-2"),
    ("avalanche", "avalanche-2"),
    ("atom", "cosmos"),
    ("cosmos", "cosmos"),
    ("xtz", "tezos"),
    ("tezos", "tezos"),
    ("algo", "algorand"),
    ("algorand", "algorand"),
    ("near", "near"),
    ("ftm", "fantom"),
    ("fantom", "fantom"),
    ("one", "harmony"),
    ("harmony", "harmony"),
    ("usdt", "tether"),
    ("usdc", "usd-coin"),
    ("busd", "binance-usd"),
    ("bnb", "binancecoin"),
    ("binance", "binancecoin"),
    ("xrp", "ripple"),
    ("ripple", "ripple"),
    ("doge", "dogecoin"),
    ("dogecoin", "dogecoin"),
];

/// Normalize user input: lowercase, keep only `[a-z0-9-]`.
fn normalize(input: &str) -> String {
    input
        .trim()
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

/// Resolve user input to a canonical upstream asset id.
/// Returns `None` for unsupported assets.
pub fn resolve_asset(input: &str) -> Option<&'static str> {
    let normalized = normalize(input);
    if normalized.is_empty() {
        return None;
    }
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, id)| *id)
}

/// Short display ticker for a canonical id (e.g., "bitcoin" -> "BTC").
/// Falls back to the id itself, uppercased, with dashes stripped to spaces.
pub fn display_name(asset_id: &str) -> String {
    // Prefer the shortest alphabetic alias for the id.
    let mut best: Option<&str> = None;
    for (alias, id) in ALIASES {
        if *id == asset_id && alias.chars().all(|c| c.is_ascii_alphabetic()) {
            match best {
                Some(b) if b.len() <= alias.len() => {}
                _ => best = Some(alias),
            }
        }
    }
    match best {
        Some(alias) => alias.to_uppercase(),
        None => asset_id.replace('-', " ").to_uppercase(),
    }
}

/// Comma-separated list of supported tickers for help text.
pub fn supported_assets_list() -> String {
    let mut tickers: Vec<String> = Vec::new();
    for (_, id) in ALIASES {
        let name = display_name(id);
        if !tickers.contains(&name) {
            tickers.push(name);
        }
    }
    tickers.sort();
    tickers.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_exact() {
        assert_eq!(resolve_asset("btc"), Some("bitcoin"));
        assert_eq!(resolve_asset("bitcoin"), Some("bitcoin"));
        assert_eq!(resolve_asset("matic"), Some("matic-network"));
        assert_eq!(resolve_asset("polygon"), Some("matic-network"));
    }

    #[test]
    fn test_resolve_normalizes_input() {
        assert_eq!(resolve_asset("BTC"), Some("bitcoin"));
        assert_eq!(resolve_asset(" Bitcoin "), Some("bitcoin"));
        assert_eq!(resolve_asset("e t h"), Some("ethereum"));
    }

    #[test]
    fn test_resolve_unsupported() {
        assert_eq!(resolve_asset("notacoin"), None);
        assert_eq!(resolve_asset(""), None);
        assert_eq!(resolve_asset("$$$"), None);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("bitcoin"), "BTC");
        assert_eq!(display_name("ethereum"), "ETH");
        assert_eq!(display_name("matic-network"), "MATIC");
        // Unknown ids fall back to the id itself.
        assert_eq!(display_name("some-coin"), "SOME COIN");
    }

    #[test]
    fn test_supported_list_contains_majors() {
        let list = supported_assets_list();
        assert!(list.contains("BTC"));
        assert!(list.contains("ETH"));
        assert!(list.contains("SOL"));
    }
}
