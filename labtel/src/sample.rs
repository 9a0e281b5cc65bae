//! Sample-identifier validation.
//!
//! The engine treats barcodes as opaque strings; what counts as a valid one
//! is host policy, supplied through [`SampleValidator`]. The stock host
//! stamps specimens as `P,YY.NNNNNNN.C` — optional two-character prefix,
//! two-digit year, seven-digit lab number, and a check letter computed from
//! a weighted checksum over the nine digits.

/// Host-specific barcode validity check.
pub trait SampleValidator {
    fn validate(&self, id: &str) -> bool;
}

/// Accepts anything — for dialects without check digits.
#[derive(Debug, Default)]
pub struct AcceptAll;

impl SampleValidator for AcceptAll {
    fn validate(&self, _id: &str) -> bool {
        true
    }
}

// ── Check-letter arithmetic ───────────────────────────────────────────────

/// Checksum modulus.
const CHECK_MODULUS: u32 = 23;

/// Check letters in checksum order. Not the alphabet, and not alphabetical.
const CHECK_LETTERS: [char; 23] = [
    'B', 'W', 'D', 'F', 'G', 'K', 'Q', 'V', 'Y', 'X', 'A', 'S', 'T', 'N', 'J', 'H', 'R', 'P',
    'L', 'C', 'Z', 'M', 'E',
];

/// Weighted checksum digit weights: the year-and-number digits are
/// multiplied by 22 down to 14, left to right.
const FIRST_WEIGHT: u32 = 22;

/// Compute the check letter for a `YYNNNNNNN` digit string.
fn check_letter(digits: &str) -> Option<char> {
    if digits.len() != 9 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let sum: u32 = digits
        .bytes()
        .enumerate()
        .map(|(i, b)| (FIRST_WEIGHT - i as u32) * u32::from(b - b'0'))
        .sum();
    let index = CHECK_MODULUS - (sum % CHECK_MODULUS);
    Some(CHECK_LETTERS[(index - 1) as usize])
}

// ── SampleId ──────────────────────────────────────────────────────────────

/// A parsed specimen barcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleId {
    /// Optional site prefix including its comma, e.g. `"A,"`.
    pub prefix: String,
    /// Two-digit year.
    pub year: u8,
    /// Seven-digit lab number.
    pub number: u32,
    /// Check letter.
    pub check: char,
}

impl SampleId {
    /// Parse the shapes the host prints and users type:
    /// `NNNNNNN`, `YY.NNNNNNN`, `NNNNNNN.C`, `YY.NNNNNNNC`, `YY.NNNNNNN.C`,
    /// each optionally led by a `P,` site prefix. A missing year is filled
    /// from `current_year`; a missing check letter is derived.
    pub fn parse(id: &str, current_year: u8) -> Result<Self, String> {
        let id = id.trim().to_ascii_uppercase();
        let (prefix, rest) = match id.as_bytes() {
            [_, b',', ..] => id.split_at(2),
            _ => ("", id.as_str()),
        };

        let mut year: Option<u8> = None;
        let mut number: Option<u32> = None;
        let mut check: Option<char> = None;

        let pieces: Vec<&str> = rest.split('.').collect();
        match pieces.as_slice() {
            [one] => {
                if one.len() != 7 {
                    return Err(format!("'{one}' is not a seven-digit lab number"));
                }
                number = Some(parse_digits(one)?);
            }
            [a, b] => {
                match a.len() {
                    2 => year = Some(parse_digits(a)? as u8),
                    7 => number = Some(parse_digits(a)?),
                    _ => return Err(format!("cannot read '{a}' as a year or lab number")),
                }
                match b.len() {
                    1 => check = b.chars().next().filter(char::is_ascii_uppercase),
                    7 => number = Some(parse_digits(b)?),
                    8 if b.ends_with(|c: char| c.is_ascii_uppercase()) => {
                        check = b.chars().last();
                        number = Some(parse_digits(&b[..7])?);
                    }
                    _ => return Err(format!("cannot read '{b}' as a lab number or check letter")),
                }
            }
            [y, n, c] => {
                if y.len() != 2 || n.len() != 7 || c.len() != 1 {
                    return Err(format!("'{rest}' does not fit YY.NNNNNNN.C"));
                }
                year = Some(parse_digits(y)? as u8);
                number = Some(parse_digits(n)?);
                check = c.chars().next().filter(char::is_ascii_uppercase);
            }
            _ => return Err(format!("'{rest}' has too many parts")),
        }

        let number = number.ok_or_else(|| format!("no lab number found in '{rest}'"))?;
        let year = year.unwrap_or(current_year);
        let digits = format!("{year:02}{number:07}");
        let derived = check_letter(&digits).ok_or_else(|| "checksum input malformed".to_owned())?;

        Ok(SampleId {
            prefix: prefix.to_owned(),
            year,
            number,
            check: check.unwrap_or(derived),
        })
    }

    /// Whether the stored check letter matches the checksum.
    pub fn is_valid(&self) -> bool {
        check_letter(&format!("{:02}{:07}", self.year, self.number)) == Some(self.check)
    }
}

impl std::fmt::Display for SampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{:02}.{:07}.{}",
            self.prefix, self.year, self.number, self.check
        )
    }
}

fn parse_digits(s: &str) -> Result<u32, String> {
    s.parse().map_err(|_| format!("'{s}' is not numeric"))
}

/// Validates full `YY.NNNNNNN.C` barcodes by check letter.
#[derive(Debug, Default)]
pub struct CheckLetterValidator;

impl SampleValidator for CheckLetterValidator {
    fn validate(&self, id: &str) -> bool {
        let compact: String = id
            .trim()
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .trim_start_matches(',')
            .chars()
            .filter(|&c| c != '.')
            .collect();
        if compact.len() != 10 {
            return false;
        }
        let (digits, check) = compact.split_at(9);
        check_letter(digits) == check.chars().next().map(|c| c.to_ascii_uppercase())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
