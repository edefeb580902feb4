use crate::error::{CatalogError, Result};

const ISBN13_PREFIX: &[u8; 3] = b"978";

/// Canonicalizes an ISBN to its 13-digit form.
///
/// Everything except ASCII digits and `X`/`x` is dropped first, so
/// `"978-4-06-312345-8"` and `"4 06 312345 X"` are both accepted. ISBN-10
/// inputs are converted by prefixing `978` and recomputing the check digit;
/// their own check character is not validated.
pub fn normalize(raw: &str) -> Result<String> {
    let stripped: Vec<u8> = raw
        .bytes()
        .filter(|b| b.is_ascii_digit() || matches!(b, b'X' | b'x'))
        .collect();

    match stripped.len() {
        13 => {
            if !stripped.iter().all(u8::is_ascii_digit) {
                return Err(CatalogError::InvalidIdentifier(raw.to_string()));
            }
            Ok(String::from_utf8_lossy(&stripped).into_owned())
        }
        10 => {
            let body = &stripped[..9];
            if !body.iter().all(u8::is_ascii_digit) {
                return Err(CatalogError::InvalidIdentifier(raw.to_string()));
            }

            let mut digits = [0u8; 12];
            for (slot, b) in digits
                .iter_mut()
                .zip(ISBN13_PREFIX.iter().chain(body.iter()))
            {
                *slot = b - b'0';
            }
            let check = check_digit_13(&digits);

            let mut out = String::with_capacity(13);
            out.extend(digits.iter().map(|d| char::from(b'0' + d)));
            out.push(char::from(b'0' + check));
            Ok(out)
        }
        _ => Err(CatalogError::InvalidIdentifier(raw.to_string())),
    }
}

/// EAN-13 check digit over the first twelve digits (weights 1,3,1,3,...).
pub fn check_digit_13(digits: &[u8; 12]) -> u8 {
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| u32::from(*d) * if i % 2 == 0 { 1 } else { 3 })
        .sum();
    ((10 - (sum % 10)) % 10) as u8
}

/// Whether `isbn` is 13 ASCII digits with a matching check digit.
pub fn is_valid_13(isbn: &str) -> bool {
    let bytes = isbn.as_bytes();
    if bytes.len() != 13 || !bytes.iter().all(u8::is_ascii_digit) {
        return false;
    }
    let mut digits = [0u8; 12];
    for (slot, b) in digits.iter_mut().zip(bytes) {
        *slot = b - b'0';
    }
    check_digit_13(&digits) == bytes[12] - b'0'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_isbn10_to_isbn13() {
        assert_eq!(normalize("4063123456").unwrap(), "9784063123456");
        assert_eq!(normalize("4-08-882641-X").unwrap(), "9784088826417");
    }

    #[test]
    fn converted_output_satisfies_check_digit() {
        for raw in ["4065123456", "0306406152", "409000000x", "123456789X"] {
            let isbn = normalize(raw).unwrap();
            assert!(is_valid_13(&isbn), "{raw} -> {isbn}");
            assert!(isbn.starts_with("978"));
        }
    }

    #[test]
    fn idempotent_on_canonical_input() {
        let once = normalize("978-4-06-312345-8").unwrap();
        assert_eq!(once, "9784063123458");
        assert_eq!(normalize(&once).unwrap(), once);

        // 13-digit input is passed through without check digit validation.
        assert_eq!(normalize("9784065123456").unwrap(), "9784065123456");
    }

    #[test]
    fn rejects_wrong_lengths_and_letters() {
        for raw in ["", "123", "97840631234589", "invalid-isbn", "978406312345X"] {
            let err = normalize(raw).unwrap_err();
            assert!(
                matches!(err, CatalogError::InvalidIdentifier(_)),
                "{raw}: {err}"
            );
        }
    }

    #[test]
    fn rejects_check_char_in_isbn10_body() {
        assert!(normalize("40X3123456").is_err());
    }

    #[test]
    fn check_digit_known_value() {
        // 978030640615-7
        let digits = [9, 7, 8, 0, 3, 0, 6, 4, 0, 6, 1, 5];
        assert_eq!(check_digit_13(&digits), 7);
        assert!(is_valid_13("9780306406157"));
        assert!(!is_valid_13("9780306406158"));
    }
}
