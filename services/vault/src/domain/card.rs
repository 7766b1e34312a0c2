//! Card brand/type classification and input sanitization.

use crate::error::VaultError;
use chrono::Datelike;
use serde::{Deserialize, Serialize};

/// Closed set of card brands the vault recognizes.
///
/// Unknown prefixes are rejected at the transport layer rather than
/// propagated into the domain as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brand {
    /// Visa (prefix `4`).
    Visa,
    /// Mastercard (prefix `51`-`55` or `2221`-`2720`).
    Mastercard,
    /// Prefix did not match a supported brand.
    Unknown,
}

impl Brand {
    /// Classify a sanitized PAN by its leading digits.
    #[must_use]
    pub fn detect(pan: &str) -> Self {
        if pan.starts_with('4') {
            return Self::Visa;
        }
        if let Ok(prefix2) = pan.get(0..2).unwrap_or_default().parse::<u32>() {
            if (51..=55).contains(&prefix2) {
                return Self::Mastercard;
            }
        }
        if let Ok(prefix4) = pan.get(0..4).unwrap_or_default().parse::<u32>() {
            if (2221..=2720).contains(&prefix4) {
                return Self::Mastercard;
            }
        }
        Self::Unknown
    }

    /// `true` for brands the vault accepts by default.
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for Brand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Visa => "visa",
            Self::Mastercard => "mastercard",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Closed set of card types; the vault has no signal to distinguish these
/// beyond what a BIN lookup provides, so it defaults to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    /// Credit card.
    Credit,
    /// Debit card.
    Debit,
    /// Prepaid card.
    Prepaid,
    /// Not resolvable from the BIN table.
    Unknown,
}

impl std::fmt::Display for CardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
            Self::Prepaid => "prepaid",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// A card submission after sanitization and validation, still carrying a
/// plaintext PAN and CVV — callers must not persist or log this type.
#[derive(Debug, Clone)]
pub struct SanitizedCard {
    /// Digits-only PAN.
    pub pan: String,
    /// Cardholder name, as submitted.
    pub cardholder_name: Option<String>,
    /// Expiry month, 1-12.
    pub exp_month: u32,
    /// Expiry year, four digits.
    pub exp_year: u32,
    /// 3-digit CVV; validated but never stored downstream of this struct.
    pub cvv: String,
    /// Detected brand.
    pub brand: Brand,
}

impl SanitizedCard {
    /// Strip whitespace/dashes from a raw card number, keeping digits only.
    #[must_use]
    pub fn sanitize_pan(raw: &str) -> String {
        raw.chars().filter(char::is_ascii_digit).collect()
    }

    /// Validate and classify a raw submission.
    ///
    /// # Errors
    /// Returns `InvalidCard`, `UnsupportedBrand`, `InvalidExpiry`, or
    /// `InvalidCVV` per spec §7/§8 boundary rules.
    pub fn parse(
        card_number: &str,
        cardholder_name: &str,
        exp_month: u32,
        exp_year: u32,
        cvv: &str,
        skip_luhn: bool,
    ) -> Result<Self, VaultError> {
        let pan = Self::sanitize_pan(card_number);
        if pan.len() < 13 || pan.len() > 19 {
            return Err(VaultError::invalid_card("card number length out of range"));
        }
        if !skip_luhn && !luhn_valid(&pan) {
            return Err(VaultError::invalid_card("card number failed checksum"));
        }

        let brand = Brand::detect(&pan);
        if !brand.is_supported() {
            return Err(VaultError::unsupported_brand());
        }

        if !(1..=12).contains(&exp_month) {
            return Err(VaultError::invalid_expiry("month out of range"));
        }
        let now = chrono::Utc::now();
        let current_year = now.year() as u32;
        let current_month = now.month();
        if exp_year < current_year || (exp_year == current_year && exp_month < current_month) {
            return Err(VaultError::invalid_expiry("card has already expired"));
        }

        // Both supported brands (Visa, Mastercard) carry a 3-digit CVV; a
        // 4-digit value is rejected rather than accepted as an Amex-style CID.
        if cvv.len() != 3 || !cvv.chars().all(|c| c.is_ascii_digit()) {
            return Err(VaultError::invalid_cvv());
        }

        let name = cardholder_name.trim();
        let cardholder_name = if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        };

        Ok(Self {
            pan,
            cardholder_name,
            exp_month,
            exp_year,
            cvv: cvv.to_string(),
            brand,
        })
    }

    /// Last 4 digits of the PAN.
    #[must_use]
    pub fn last4(&self) -> String {
        self.pan[self.pan.len() - 4..].to_string()
    }

    /// First 6 digits of the PAN (BIN).
    #[must_use]
    pub fn bin(&self) -> String {
        self.pan[..6.min(self.pan.len())].to_string()
    }
}

fn luhn_valid(pan: &str) -> bool {
    let digits: Vec<u32> = pan.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != pan.len() || digits.is_empty() {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}
