use serde::{Deserialize, Serialize};

/// A benchmark profile with preset sizes, batch and warmup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchProfile {
    pub name: String,
    pub sizes: Vec<usize>,
    pub batch: u32,
    pub warmup: u32,
}

/// Returns the "quick" profile: 1M / 5 sorts / 1 warmup.
pub fn quick_profile() -> BenchProfile {
    BenchProfile {
        name: "quick".to_string(),
        sizes: vec![1 << 20],
        batch: 5,
        warmup: 1,
    }
}

/// Returns the "standard" profile: 1M+4M / 20 sorts / 2 warmup.
pub fn standard_profile() -> BenchProfile {
    BenchProfile {
        name: "standard".to_string(),
        sizes: vec![1 << 20, 1 << 22],
        batch: 20,
        warmup: 2,
    }
}

/// Returns the "thorough" profile: 1M+4M+16M / 50 sorts / 3 warmup.
pub fn thorough_profile() -> BenchProfile {
    BenchProfile {
        name: "thorough".to_string(),
        sizes: vec![1 << 20, 1 << 22, 1 << 24],
        batch: 50,
        warmup: 3,
    }
}

/// Lookup a profile by name.
pub fn get_profile(name: &str) -> Option<BenchProfile> {
    match name {
        "quick" => Some(quick_profile()),
        "standard" => Some(standard_profile()),
        "thorough" => Some(thorough_profile()),
        _ => None,
    }
}

/// Parse a human-readable size string to a usize.
///
/// Supports:
/// - "1M" or "1m" -> 1_000_000
/// - "100K" or "100k" -> 100_000
/// - "2^20" -> 1_048_576
/// - "1_000_000" or "1000000" -> 1_000_000
pub fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();

    if let Some(exp) = s.strip_prefix("2^") {
        let exp: u32 = exp
            .parse()
            .map_err(|e| format!("Invalid size '{}': {}", s, e))?;
        return 1usize
            .checked_shl(exp)
            .filter(|_| exp < usize::BITS)
            .ok_or_else(|| format!("Invalid size '{}': exponent too large", s));
    }

    let (digits, scale) = if let Some(prefix) = s.strip_suffix('M').or_else(|| s.strip_suffix('m')) {
        (prefix, 1_000_000.0)
    } else if let Some(prefix) = s.strip_suffix('K').or_else(|| s.strip_suffix('k')) {
        (prefix, 1_000.0)
    } else {
        return s
            .replace('_', "")
            .parse::<usize>()
            .map_err(|e| format!("Invalid size '{}': {}", s, e));
    };

    let num: f64 = digits
        .replace('_', "")
        .parse()
        .map_err(|e| format!("Invalid size '{}': {}", s, e))?;
    if !num.is_finite() || num < 0.0 {
        return Err(format!("Invalid size '{}'", s));
    }
    Ok((num * scale) as usize)
}
