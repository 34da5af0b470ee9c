use serde::Serialize;

/// Get the serde-serialized name of a unit enum variant.
/// Uses serde's own rules (rename_all, rename, etc.) as the single source of truth.
/// Returns `None` for non-string variants (data-carrying variants).
pub fn serde_variant_name<T: Serialize>(val: &T) -> Option<String> {
    match serde_json::to_value(val) {
        Ok(serde_json::Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Deserialize a string into an enum variant using serde's own rules.
/// Sheet kinds are matched case-insensitively, so the input is uppercased first.
pub fn from_serde_str<T: for<'de> serde::Deserialize<'de>>(s: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(s.trim().to_ascii_uppercase())).ok()
}

/// Turn an arbitrary name into a C identifier fragment: `"Hi there!"` → `HI_THERE_`.
pub fn symbol_ident(name: &str) -> String {
    let ident: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    if ident.is_empty() {
        "_".to_string()
    } else {
        ident
    }
}

/// Parse an address given as decimal or `0x`-prefixed hex.
pub fn parse_address(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid address '{s}': {e}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn idents_are_c_safe() {
        assert_eq!(symbol_ident("home"), "HOME");
        assert_eq!(symbol_ident("Hi there!"), "HI_THERE_");
        assert_eq!(symbol_ident(""), "_");
    }

    #[test]
    fn addresses_accept_hex_and_decimal() {
        assert_eq!(parse_address("0x10000").unwrap(), 0x10000);
        assert_eq!(parse_address("4096").unwrap(), 4096);
        assert!(parse_address("0xZZ").is_err());
    }

    #[test]
    fn lowercase_kinds_still_parse() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        enum Probe {
            TimerR,
        }
        assert_eq!(from_serde_str::<Probe>(" timer_r "), Some(Probe::TimerR));
    }
}
