use {
    alloy::primitives::U256,
    anyhow::{Context, Result},
};

/// Parses a decimal string into a [`U256`].
pub fn u256_from_decimal(value: &str) -> Result<U256> {
    U256::from_str_radix(value.trim(), 10)
        .with_context(|| format!("invalid decimal integer {value:?}"))
}

/// Renders a [`U256`] as a canonical decimal string without leading zeros.
pub fn u256_to_decimal(value: &U256) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_strings() {
        assert_eq!(u256_from_decimal("0").unwrap(), U256::ZERO);
        assert_eq!(u256_from_decimal(" 42 ").unwrap(), U256::from(42));
        assert_eq!(
            u256_from_decimal("340282366920938463463374607431768211456").unwrap(),
            U256::from(1u128) << 128,
        );
    }

    #[test]
    fn rejects_non_decimal_input() {
        assert!(u256_from_decimal("").is_err());
        assert!(u256_from_decimal("0x10").is_err());
        assert!(u256_from_decimal("ten").is_err());
    }

    #[test]
    fn renders_canonical_decimal() {
        assert_eq!(u256_to_decimal(&U256::from(1000)), "1000");
        assert_eq!(u256_to_decimal(&U256::ZERO), "0");
    }
}
