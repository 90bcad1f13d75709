//! Kubernetes quantity parsing
//!
//! Accepts the resource quantity grammar used in pod specs and kubelet
//! annotations: a decimal number followed by a binary SI suffix (`Ki`..`Ei`),
//! a decimal SI suffix (`n`, `u`, `m`, `k`, `M`..`E`) or a decimal exponent
//! (`e3`, `E-2`). Values are rounded up to the requested scale, matching how
//! the API server reports `Value()` and `MilliValue()`.

use crate::error::QuantityError;
use crate::models::ResourceAmount;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Longest digit run accepted before the mantissa would overflow `u128`
const MAX_MANTISSA_DIGITS: usize = 38;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Suffix {
    /// Multiplier is 1024^n
    Binary(u32),
    /// Multiplier is 10^n
    Decimal(i32),
}

/// A parsed, non-negative quantity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuantity {
    raw: String,
    mantissa: u128,
    frac_digits: u32,
    suffix: Suffix,
}

impl ParsedQuantity {
    /// Integer value, rounded up
    pub fn value(&self) -> Result<u64, QuantityError> {
        self.scaled(0)
    }

    /// Value in thousandths, rounded up
    pub fn milli_value(&self) -> Result<u64, QuantityError> {
        self.scaled(3)
    }

    fn overflow(&self) -> QuantityError {
        QuantityError::Overflow(self.raw.clone())
    }

    /// Value expressed in units of 10^-scale
    fn scaled(&self, scale: u32) -> Result<u64, QuantityError> {
        let value = match self.suffix {
            Suffix::Binary(power) => {
                let numerator = 1024u128
                    .checked_pow(power)
                    .and_then(|m| self.mantissa.checked_mul(m))
                    .and_then(|n| 10u128.checked_pow(scale).and_then(|s| n.checked_mul(s)))
                    .ok_or_else(|| self.overflow())?;
                // A denominator past u128 exceeds any numerator, leaving one unit
                match 10u128.checked_pow(self.frac_digits) {
                    Some(denominator) => div_ceil(numerator, denominator),
                    None => u128::from(numerator > 0),
                }
            }
            Suffix::Decimal(exponent) => {
                let shift = i64::from(exponent) + i64::from(scale) - i64::from(self.frac_digits);
                if shift >= 0 {
                    u32::try_from(shift)
                        .ok()
                        .and_then(|s| 10u128.checked_pow(s))
                        .and_then(|m| self.mantissa.checked_mul(m))
                        .ok_or_else(|| self.overflow())?
                } else {
                    // Anything past 10^38 rounds a u128 mantissa up to one unit
                    match u32::try_from(-shift).ok().and_then(|s| 10u128.checked_pow(s)) {
                        Some(divisor) => div_ceil(self.mantissa, divisor),
                        None => u128::from(self.mantissa > 0),
                    }
                }
            }
        };

        u64::try_from(value).map_err(|_| self.overflow())
    }
}

fn div_ceil(numerator: u128, denominator: u128) -> u128 {
    numerator / denominator + u128::from(numerator % denominator != 0)
}

fn parse_suffix(quantity: &str, suffix: &str) -> Result<Suffix, QuantityError> {
    let parsed = match suffix {
        "" => Suffix::Decimal(0),
        "Ki" => Suffix::Binary(1),
        "Mi" => Suffix::Binary(2),
        "Gi" => Suffix::Binary(3),
        "Ti" => Suffix::Binary(4),
        "Pi" => Suffix::Binary(5),
        "Ei" => Suffix::Binary(6),
        "n" => Suffix::Decimal(-9),
        "u" => Suffix::Decimal(-6),
        "m" => Suffix::Decimal(-3),
        "k" => Suffix::Decimal(3),
        "M" => Suffix::Decimal(6),
        "G" => Suffix::Decimal(9),
        "T" => Suffix::Decimal(12),
        "P" => Suffix::Decimal(15),
        "E" => Suffix::Decimal(18),
        other => {
            // Decimal exponent form: e3, E-2, e+6
            let exponent = other
                .strip_prefix('e')
                .or_else(|| other.strip_prefix('E'))
                .filter(|rest| !rest.is_empty())
                .and_then(|rest| rest.parse::<i32>().ok());
            match exponent {
                Some(exponent) => Suffix::Decimal(exponent),
                None => {
                    return Err(QuantityError::UnknownSuffix {
                        quantity: quantity.to_string(),
                        suffix: other.to_string(),
                    })
                }
            }
        }
    };
    Ok(parsed)
}

/// Parse a quantity string such as `1024Ki`, `500Mi`, `250m` or `1e3`
pub fn parse_quantity(quantity: &str) -> Result<ParsedQuantity, QuantityError> {
    if quantity.is_empty() {
        return Err(QuantityError::Empty);
    }

    let (negative, unsigned) = match quantity.as_bytes()[0] {
        b'-' => (true, &quantity[1..]),
        b'+' => (false, &quantity[1..]),
        _ => (false, quantity),
    };

    let number_len = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_len);

    let (whole, frac) = match number.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (number, ""),
    };
    if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
        return Err(QuantityError::InvalidNumber(quantity.to_string()));
    }

    let digits = format!("{whole}{frac}");
    let significant = digits.trim_start_matches('0');
    if significant.len() > MAX_MANTISSA_DIGITS {
        return Err(QuantityError::Overflow(quantity.to_string()));
    }
    let mantissa = if significant.is_empty() {
        0
    } else {
        significant
            .parse::<u128>()
            .map_err(|_| QuantityError::InvalidNumber(quantity.to_string()))?
    };

    if negative && mantissa != 0 {
        return Err(QuantityError::Negative(quantity.to_string()));
    }

    let suffix = parse_suffix(quantity, suffix)?;

    Ok(ParsedQuantity {
        raw: quantity.to_string(),
        mantissa,
        frac_digits: frac.len() as u32,
        suffix,
    })
}

/// Parse a memory-style quantity into whole bytes
pub fn parse_bytes(quantity: &str) -> Result<ResourceAmount, QuantityError> {
    parse_quantity(quantity)?.value().map(ResourceAmount)
}

/// Parse a CPU-style quantity into millicores
pub fn parse_millis(quantity: &str) -> Result<ResourceAmount, QuantityError> {
    parse_quantity(quantity)?.milli_value().map(ResourceAmount)
}

/// Bytes held by an API quantity
pub fn quantity_bytes(quantity: &Quantity) -> Result<ResourceAmount, QuantityError> {
    parse_bytes(&quantity.0)
}

/// Millicores held by an API quantity
pub fn quantity_millis(quantity: &Quantity) -> Result<ResourceAmount, QuantityError> {
    parse_millis(&quantity.0)
}
