//! Certificate number extraction from characteristic tables.
//!
//! Certificate numbers are published as 12-digit codes, usually in the
//! `NNNNN-NN-NNNNN` layout, sometimes with the leading zeros of the first
//! group dropped. Output is always exactly 12 ASCII digits or `None`.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

pub const CERTIFICATE_DIGITS: usize = 12;

static GROUPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\D)(\d{1,5})[-./ ]?(\d{2})[-./ ]?(\d{5})(?:\D|$)")
        .expect("certificate pattern is valid")
});

static BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)(\d{1,12})(?:\D|$)").expect("digit pattern is valid"));

static CERTIFICATE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)certifica|homologa|anatel|registro|registration")
        .expect("key pattern is valid")
});

/// Normalize a raw certificate value to 12 digits, or reject it.
pub fn normalize(raw: &str) -> Option<String> {
    if let Some(caps) = GROUPED.captures(raw) {
        let digits = format!("{}{}{}", &caps[1], &caps[2], &caps[3]);
        return pad(&digits);
    }
    BARE.captures(raw).and_then(|caps| pad(&caps[1]))
}

/// Search a characteristics table for a certificate number.
///
/// Entries whose key names a certificate are tried first with the lenient
/// pattern; every other value is only accepted in the grouped layout.
pub fn extract(characteristics: &BTreeMap<String, String>) -> Option<String> {
    let keyed = characteristics
        .iter()
        .filter(|(key, _)| CERTIFICATE_KEY.is_match(key))
        .find_map(|(_, value)| normalize(value));

    keyed.or_else(|| {
        characteristics.values().find_map(|value| {
            GROUPED
                .captures(value)
                .and_then(|caps| pad(&format!("{}{}{}", &caps[1], &caps[2], &caps[3])))
        })
    })
}

fn pad(digits: &str) -> Option<String> {
    if digits.is_empty()
        || digits.len() > CERTIFICATE_DIGITS
        || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    Some(format!("{digits:0>width$}", width = CERTIFICATE_DIGITS))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn assert_twelve_digits(value: &Option<String>) {
        if let Some(v) = value {
            assert_eq!(v.len(), CERTIFICATE_DIGITS);
            assert!(v.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_normalize_grouped_layout() {
        assert_eq!(normalize("01234-20-05678").as_deref(), Some("012342005678"));
        assert_eq!(normalize("1234-20-05678").as_deref(), Some("012342005678"));
        assert_eq!(normalize("Nº 01234.20.05678").as_deref(), Some("012342005678"));
    }

    #[test]
    fn test_normalize_pads_short_codes() {
        assert_eq!(normalize("98765").as_deref(), Some("000000098765"));
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert_eq!(normalize("não possui"), None);
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("1234567890123456"), None);
    }

    #[test]
    fn test_extract_prefers_certificate_keyed_entries() {
        let chars = table(&[
            ("Código de barras", "78912-34-56789"),
            ("Homologação Anatel", "04512-19-01234"),
        ]);
        assert_eq!(extract(&chars).as_deref(), Some("045121901234"));
    }

    #[test]
    fn test_extract_ignores_bare_numbers_on_unrelated_keys() {
        let chars = table(&[("Peso", "350"), ("Voltagem", "220")]);
        assert_eq!(extract(&chars), None);
    }

    #[test]
    fn test_extract_falls_back_to_grouped_values() {
        let chars = table(&[("Informações", "Cert. 00321-22-00987 válido")]);
        assert_eq!(extract(&chars).as_deref(), Some("003212200987"));
    }

    #[test]
    fn test_output_is_twelve_digits_or_none() {
        let samples = [
            "01234-20-05678",
            "1",
            "123456789012",
            "1234567890123",
            "abc",
            "12-34",
            "9999999-99-99999",
        ];
        for sample in samples {
            assert_twelve_digits(&normalize(sample));
        }
    }
}
