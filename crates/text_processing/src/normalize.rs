//! Speech normalization (§4.9): expands currency, percentages, grouped
//! numbers and common abbreviations into the words a TTS voice should
//! actually speak.

use std::sync::OnceLock;

use regex::Regex;

const UNITS: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

const SCALES: [(u64, &str); 3] = [(1_000_000_000, "billion"), (1_000_000, "million"), (1_000, "thousand")];

/// Largest integer this normalizer expands to words; anything bigger is
/// left as digits (§4.9).
const MAX_EXPANDABLE: u64 = 999_999_999_999;

fn under_thousand_to_words(n: u64) -> String {
    debug_assert!(n < 1000);
    if n < 20 {
        return UNITS[n as usize].to_string();
    }
    if n < 100 {
        let tens = TENS[(n / 10) as usize];
        let rem = n % 10;
        return if rem == 0 {
            tens.to_string()
        } else {
            format!("{} {}", tens, UNITS[rem as usize])
        };
    }
    let hundreds = n / 100;
    let rem = n % 100;
    if rem == 0 {
        format!("{} hundred", UNITS[hundreds as usize])
    } else {
        format!("{} hundred {}", UNITS[hundreds as usize], under_thousand_to_words(rem))
    }
}

/// Expands an integer to English number words via short-scale recursion
/// (units, tens, hundred, thousand, million, billion). Returns `None` when
/// `n` exceeds `MAX_EXPANDABLE`.
pub fn number_to_words(n: u64) -> Option<String> {
    if n > MAX_EXPANDABLE {
        return None;
    }
    if n == 0 {
        return Some("zero".to_string());
    }

    let mut remaining = n;
    let mut parts = Vec::new();

    for &(scale, name) in &SCALES {
        if remaining >= scale {
            let count = remaining / scale;
            remaining %= scale;
            parts.push(format!("{} {}", under_thousand_to_words(count), name));
        }
    }
    if remaining > 0 || parts.is_empty() {
        parts.push(under_thousand_to_words(remaining));
    }
    Some(parts.join(" "))
}

fn digit_words(digits: &str) -> String {
    digits
        .chars()
        .filter(|c| c.is_ascii_digit())
        .map(|c| UNITS[(c as u8 - b'0') as usize])
        .collect::<Vec<_>>()
        .join(" ")
}

struct Patterns {
    currency: Regex,
    percent: Regex,
    grouped_integer: Regex,
    bare_integer: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        currency: Regex::new(r"\$(\d{1,3}(?:,\d{3})*)(?:\.(\d{2}))?").unwrap(),
        percent: Regex::new(r"(\d+)(?:\.(\d+))?%").unwrap(),
        grouped_integer: Regex::new(r"\d{1,3}(?:,\d{3})+").unwrap(),
        bare_integer: Regex::new(r"\d+").unwrap(),
    })
}

const ABBREVIATIONS: &[(&str, &str)] = &[
    ("Dr.", "Doctor"),
    ("Mr.", "Mister"),
    ("Mrs.", "Missus"),
    ("Ms.", "Miz"),
    ("St.", "Street"),
    ("Ave.", "Avenue"),
    ("vs.", "versus"),
    ("etc.", "etcetera"),
    ("e.g.", "for example"),
    ("i.e.", "that is"),
];

fn expand_abbreviations(text: &str) -> String {
    let mut out = text.to_string();
    for (abbr, expansion) in ABBREVIATIONS {
        out = out.replace(abbr, expansion);
    }
    out
}

fn expand_currency(text: &str) -> String {
    patterns()
        .currency
        .replace_all(text, |caps: &regex::Captures| {
            let dollars_raw: String = caps[1].chars().filter(|c| c.is_ascii_digit()).collect();
            let dollars: u64 = dollars_raw.parse().unwrap_or(0);
            let dollars_words = number_to_words(dollars).unwrap_or(dollars_raw);
            match caps.get(2) {
                Some(cents) => {
                    let cents_val: u64 = cents.as_str().parse().unwrap_or(0);
                    let cents_words = number_to_words(cents_val).unwrap_or_else(|| cents.as_str().to_string());
                    format!("{} dollars and {} cents", dollars_words, cents_words)
                }
                None => format!("{} dollars", dollars_words),
            }
        })
        .to_string()
}

fn expand_percent(text: &str) -> String {
    patterns()
        .percent
        .replace_all(text, |caps: &regex::Captures| {
            let whole: u64 = caps[1].parse().unwrap_or(0);
            let whole_words = number_to_words(whole).unwrap_or_else(|| caps[1].to_string());
            match caps.get(2) {
                Some(frac) => format!("{} point {} percent", whole_words, digit_words(frac.as_str())),
                None => format!("{} percent", whole_words),
            }
        })
        .to_string()
}

fn strip_digit_group_commas(text: &str) -> String {
    patterns()
        .grouped_integer
        .replace_all(text, |caps: &regex::Captures| {
            caps[0].chars().filter(|c| c.is_ascii_digit()).collect::<String>()
        })
        .to_string()
}

fn expand_bare_integers(text: &str) -> String {
    patterns()
        .bare_integer
        .replace_all(text, |caps: &regex::Captures| {
            let n: u64 = match caps[0].parse() {
                Ok(n) => n,
                Err(_) => return caps[0].to_string(),
            };
            number_to_words(n).unwrap_or_else(|| caps[0].to_string())
        })
        .to_string()
}

/// Applies the full speech normalization pipeline to one sentence: currency
/// and percentages first (they consume their own digits), then digit-group
/// commas are stripped, abbreviations expanded, and any remaining bare
/// integers spelled out (§4.9).
pub fn normalize_speech(text: &str) -> String {
    let text = expand_currency(text);
    let text = expand_percent(&text);
    let text = strip_digit_group_commas(&text);
    let text = expand_abbreviations(&text);
    expand_bare_integers(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_currency_with_cents() {
        assert_eq!(normalize_speech("$12.50"), "twelve dollars and fifty cents");
    }

    #[test]
    fn expands_percent_with_decimal() {
        assert_eq!(normalize_speech("45.5%"), "forty five point five percent");
    }

    #[test]
    fn expands_grouped_integer() {
        assert_eq!(normalize_speech("1,000,000"), "one million");
    }

    #[test]
    fn leaves_numbers_above_max_expandable_as_digits() {
        let huge = "1000000000000";
        assert_eq!(normalize_speech(huge), huge);
    }

    #[test]
    fn expands_known_abbreviation() {
        assert_eq!(normalize_speech("Dr. Smith"), "Doctor Smith");
    }

    #[test]
    fn zero_expands_to_word() {
        assert_eq!(number_to_words(0).unwrap(), "zero");
    }

    #[test]
    fn hundred_with_remainder() {
        assert_eq!(number_to_words(101).unwrap(), "one hundred one");
    }
}
