//! Price formatting and user-input parsing.

/// Format a USD price with precision scaled to its magnitude.
pub fn format_price(price: f64) -> String {
    if price == 0.0 {
        return "$0".to_string();
    }
    let abs = price.abs();
    if abs >= 1_000_000.0 {
        format!("${:.2}M", price / 1_000_000.0)
    } else if abs >= 1.0 {
        format!("${:.2}", price)
    } else if abs >= 0.01 {
        format!("${:.3}", price)
    } else if abs >= 0.001 {
        format!("${:.4}", price)
    } else {
        format!("${:.6}", price)
    }
}

/// Parse a user-entered threshold with flexible formats:
/// "$1,234.56", "50k", "1.5m", "2b". Returns `None` for anything that is
/// not a positive number.
pub fn parse_threshold(input: &str) -> Option<f64> {
    let cleaned: String = input
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let (number, multiplier) = match cleaned.strip_suffix('k') {
        Some(rest) => (rest, 1_000.0),
        None => match cleaned.strip_suffix('m') {
            Some(rest) => (rest, 1_000_000.0),
            None => match cleaned.strip_suffix('b') {
                Some(rest) => (rest, 1_000_000_000.0),
                None => (cleaned.as_str(), 1.0),
            },
        },
    };

    let value = number.parse::<f64>().ok()? * multiplier;
    if value.is_finite() && value > 0.0 {
        Some(value)
    } else {
        None
    }
}
