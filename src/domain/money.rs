use crate::error::PaymentError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

const ZERO_DECIMAL: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "ISK", "JPY", "KMF", "KRW", "PYG", "RWF", "UGX", "VND", "VUV", "XAF",
    "XOF", "XPF",
];

const THREE_DECIMAL: &[&str] = &["BHD", "IQD", "JOD", "KWD", "LYD", "OMR", "TND"];

/// Trims and upper-cases an ISO 4217 code.
pub fn normalize_currency(code: &str) -> Result<String, PaymentError> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(PaymentError::Validation(format!(
            "currency must be a 3-letter ISO 4217 code, got {code:?}"
        )));
    }
    Ok(code)
}

pub fn minor_unit_exponent(currency: &str) -> u32 {
    if ZERO_DECIMAL.contains(&currency) {
        0
    } else if THREE_DECIMAL.contains(&currency) {
        3
    } else {
        2
    }
}

pub fn to_minor_units(amount: Decimal, currency: &str) -> Result<i64, PaymentError> {
    if amount <= Decimal::ZERO {
        return Err(PaymentError::Validation(format!(
            "amount must be > 0, got {amount}"
        )));
    }

    let exponent = minor_unit_exponent(currency);
    let scaled = amount
        .checked_mul(Decimal::from(10_i64.pow(exponent)))
        .ok_or_else(|| PaymentError::Validation(format!("amount {amount} is out of range")))?;
    if !scaled.fract().is_zero() {
        return Err(PaymentError::Validation(format!(
            "{amount} has more than {exponent} decimal places for {currency}"
        )));
    }

    scaled
        .trunc()
        .to_i64()
        .ok_or_else(|| PaymentError::Validation(format!("amount {amount} is out of range")))
}
