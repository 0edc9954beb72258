//! # Text Normalizer
//!
//! Turns a raw ingredient line ("2 cups chopped fresh basil") into a
//! [`ParsedLine`]: quantity, unit, identity text, and preparation notes.
//!
//! ## Features
//!
//! - Leading quantity tokens: integers, decimals, ranges, plain and mixed
//!   fractions, and unicode vulgar fractions ("1½")
//! - Unit tokens drawn from the closed vocabulary in [`crate::units`]
//! - Preparation/quality descriptors stripped into separate notes
//! - Formatting-defect cleanup (missing spaces around `&`/`,`, repeated
//!   whitespace) and configurable spelling-locale variants
//!
//! The normalizer is a pure function of its input: no catalog access, no
//! side effects. Lines with no recognizable quantity are not guessed at;
//! the quantity is simply left unset.

use crate::catalog::IngredientState;
use crate::units::{Quantity, Unit};
use lazy_static::lazy_static;
use log::{debug, trace};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A raw ingredient line after quantity/unit/descriptor extraction
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// Parsed quantity; `None` when the line had no numeric token
    pub quantity: Option<Quantity>,
    /// Parsed unit; `None` when no vocabulary token followed the quantity
    pub unit: Option<Unit>,
    /// The line stripped of quantity, unit, and descriptors
    pub identity_text: String,
    /// Descriptors removed from the line, in original order
    pub preparation_notes: Vec<String>,
    /// True when the unit is an informal one (pinch, handful, ...)
    pub was_vague_quantity: bool,
    /// Physical state implied by descriptors ("dried", "frozen", ...)
    pub state_hint: Option<IngredientState>,
    /// The original line, for diagnostics
    pub raw: String,
}

/// Errors raised while parsing a line
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// "serving" is context-dependent; it is surfaced, never guessed
    ServingAmbiguous { raw: String },
    /// Raised downstream when an operation needs a quantity the line lacks
    NoQuantity { raw: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::ServingAmbiguous { raw } => {
                write!(f, "'serving' quantity cannot be converted: '{}'", raw)
            }
            ParseError::NoQuantity { raw } => {
                write!(f, "no numeric quantity found in '{}'", raw)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Configuration options for line normalization
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Spelling variant → preferred spelling, applied word-wise before
    /// parsing; defaults cover common US/UK ingredient names
    pub locale_variants: Vec<(String, String)>,
    /// Maximum length for identity text (to prevent overly long extractions)
    pub max_identity_length: usize,
    /// Whether to strip preparation descriptors out of the identity text
    pub strip_descriptors: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            locale_variants: vec![
                ("cilantro".to_string(), "coriander".to_string()),
                ("zucchini".to_string(), "courgette".to_string()),
                ("eggplant".to_string(), "aubergine".to_string()),
                ("scallions".to_string(), "spring onions".to_string()),
                ("scallion".to_string(), "spring onion".to_string()),
            ],
            max_identity_length: 100,
            strip_descriptors: true,
        }
    }
}

lazy_static! {
    /// Plain fraction: "1/2"
    static ref PLAIN_FRACTION: Regex = Regex::new(r"^(\d+)\s*/\s*(\d+)$").unwrap();
    /// Range: "2-3", "2 - 3"
    static ref RANGE: Regex =
        Regex::new(r"^(\d+(?:\.\d+)?)\s*[-–—]\s*(\d+(?:\.\d+)?)$").unwrap();
    /// Decimal or integer: "2", "2.5"
    static ref NUMBER: Regex = Regex::new(r"^\d+(?:\.\d+)?$").unwrap();
    /// Integer with attached vulgar fraction: "1½"
    static ref INT_VULGAR: Regex =
        Regex::new(r"^(\d+)([½⅓⅔¼¾⅕⅖⅗⅘⅙⅚⅛⅜⅝⅞])$").unwrap();
    /// Number glued to a unit token: "500g", "1.5kg"
    static ref ATTACHED_UNIT: Regex = Regex::new(r"^(\d+(?:\.\d+)?)([a-zA-Z]+)$").unwrap();

    /// Unicode vulgar fraction → (numerator, denominator)
    static ref VULGAR_FRACTIONS: HashMap<char, (u32, u32)> = {
        let mut map = HashMap::new();
        map.insert('½', (1, 2));
        map.insert('⅓', (1, 3));
        map.insert('⅔', (2, 3));
        map.insert('¼', (1, 4));
        map.insert('¾', (3, 4));
        map.insert('⅕', (1, 5));
        map.insert('⅖', (2, 5));
        map.insert('⅗', (3, 5));
        map.insert('⅘', (4, 5));
        map.insert('⅙', (1, 6));
        map.insert('⅚', (5, 6));
        map.insert('⅛', (1, 8));
        map.insert('⅜', (3, 8));
        map.insert('⅝', (5, 8));
        map.insert('⅞', (7, 8));
        map
    };

    /// Preparation and quality descriptors removed from identity text
    static ref DESCRIPTORS: HashSet<&'static str> = {
        [
            "fresh", "dried", "frozen", "canned", "raw", "cooked",
            "chopped", "diced", "minced", "sliced", "grated", "shredded",
            "peeled", "crushed", "ground", "melted", "softened", "toasted",
            "large", "medium", "small", "jumbo", "baby",
            "organic", "ripe", "extra", "virgin", "unsalted", "salted",
            "boneless", "skinless", "lean", "whole-grain", "wholegrain",
            "finely", "coarsely", "roughly", "thinly", "lightly",
            "packed", "heaping", "level", "divided", "optional",
        ]
        .iter()
        .copied()
        .collect()
    };
}

/// Regex-driven ingredient line normalizer
pub struct LineNormalizer {
    config: NormalizerConfig,
}

impl LineNormalizer {
    /// Create a normalizer with default configuration
    pub fn new() -> Self {
        Self {
            config: NormalizerConfig::default(),
        }
    }

    /// Create a normalizer with custom configuration
    pub fn with_config(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Parse one raw ingredient line
    ///
    /// Returns `Err` only for inputs that must be surfaced instead of
    /// interpreted (a bare "serving" amount). A missing quantity is not an
    /// error; the line is flagged downstream instead.
    pub fn parse_line(&self, raw: &str) -> Result<ParsedLine, ParseError> {
        let cleaned = self.pre_clean(raw);
        trace!("Pre-cleaned '{}' -> '{}'", raw, cleaned);

        let tokens: Vec<&str> = cleaned.split_whitespace().collect();
        let (quantity, consumed) = parse_quantity_tokens(&tokens);

        let mut rest = &tokens[consumed..];
        let mut unit = None;
        if quantity.is_some() {
            if let Some((parsed_unit, unit_tokens)) = parse_unit_tokens(rest) {
                unit = Some(parsed_unit);
                rest = &rest[unit_tokens..];
            }
        }

        if let Some(Unit::Servings) = unit {
            return Err(ParseError::ServingAmbiguous {
                raw: raw.to_string(),
            });
        }

        let was_vague = unit.as_ref().map(Unit::is_vague).unwrap_or(false);

        // Drop a leading preposition left over from "2 cups of flour"
        if rest.first().map(|w| w.eq_ignore_ascii_case("of")) == Some(true) {
            rest = &rest[1..];
        }

        let mut identity_words = Vec::new();
        let mut notes = Vec::new();
        for word in rest {
            // Connector tokens must survive for compound-split resolution
            if *word == "&" {
                identity_words.push("&".to_string());
                continue;
            }
            let bare = word
                .trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '\'')
                .to_lowercase();
            if self.config.strip_descriptors && DESCRIPTORS.contains(bare.as_str()) {
                notes.push(bare);
            } else if !bare.is_empty() {
                identity_words.push(bare);
            }
        }

        let mut identity_text = identity_words.join(" ");

        // "salt to taste" carries no quantity information in the suffix
        if let Some(stripped) = identity_text.strip_suffix(" to taste") {
            identity_text = stripped.to_string();
            notes.push("to taste".to_string());
        }

        if identity_text.len() > self.config.max_identity_length {
            let truncated: String = identity_text
                .chars()
                .take(self.config.max_identity_length)
                .collect();
            identity_text = match truncated.rfind(' ') {
                Some(pos) => truncated[..pos].to_string(),
                None => truncated,
            };
            debug!("Identity text truncated for line '{}'", raw);
        }

        let state_hint = state_from_notes(&notes);

        debug!(
            "Parsed '{}': qty={:?} unit={:?} identity='{}'",
            raw, quantity, unit, identity_text
        );

        Ok(ParsedLine {
            quantity,
            unit,
            identity_text,
            preparation_notes: notes,
            was_vague_quantity: was_vague,
            state_hint,
            raw: raw.to_string(),
        })
    }

    /// Repair formatting defects and apply locale spelling variants
    fn pre_clean(&self, raw: &str) -> String {
        let mut text = raw.trim().to_string();

        // Missing space around '&' and ','
        text = text.replace('&', " & ");
        text = text.replace(',', " , ");

        // '/' between non-digits is a word separator, between digits a fraction
        let chars: Vec<char> = text.chars().collect();
        let mut rebuilt = String::with_capacity(text.len() + 4);
        for (i, c) in chars.iter().enumerate() {
            if *c == '/' {
                let prev_digit = i > 0 && chars[i - 1].is_ascii_digit();
                let next_digit = i + 1 < chars.len() && chars[i + 1].is_ascii_digit();
                if !(prev_digit && next_digit) {
                    rebuilt.push_str(" / ");
                    continue;
                }
            }
            rebuilt.push(*c);
        }
        text = rebuilt;

        // Detach a vulgar fraction glued to the following word ("½cup")
        let mut spaced = String::with_capacity(text.len() + 4);
        let chars: Vec<char> = text.chars().collect();
        for (i, c) in chars.iter().enumerate() {
            spaced.push(*c);
            if VULGAR_FRACTIONS.contains_key(c) {
                if let Some(next) = chars.get(i + 1) {
                    if next.is_alphabetic() {
                        spaced.push(' ');
                    }
                }
            }
        }
        text = spaced;

        let mut words: Vec<String> = Vec::new();
        for token in text.split_whitespace() {
            // "500g" → "500 g", but only when the suffix is a real unit
            if let Some(caps) = ATTACHED_UNIT.captures(token) {
                if Unit::parse(&caps[2]).is_some() {
                    words.push(caps[1].to_string());
                    words.push(caps[2].to_string());
                    continue;
                }
            }
            words.push(token.to_string());
        }

        for word in &mut words {
            let lower = word.to_lowercase();
            for (variant, preferred) in &self.config.locale_variants {
                if lower == *variant {
                    trace!("Locale variant '{}' -> '{}'", word, preferred);
                    *word = preferred.clone();
                    break;
                }
            }
        }

        words.join(" ")
    }
}

impl Default for LineNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Try to read a quantity from the front of the token list
///
/// Returns the quantity (if any) and how many tokens it consumed.
fn parse_quantity_tokens(tokens: &[&str]) -> (Option<Quantity>, usize) {
    if tokens.is_empty() {
        return (None, 0);
    }

    let first = tokens[0];

    // "1 1/2" — integer then fraction across two tokens
    if tokens.len() >= 2 && NUMBER.is_match(first) && !first.contains('.') {
        if let Some(caps) = PLAIN_FRACTION.captures(tokens[1]) {
            let whole: u32 = first.parse().unwrap_or(0);
            let num: u32 = caps[1].parse().unwrap_or(0);
            let den: u32 = caps[2].parse().unwrap_or(1);
            return (Some(Quantity::fraction(Some(whole), num, den)), 2);
        }
        if tokens[1].chars().count() == 1 {
            if let Some(&(num, den)) = tokens[1]
                .chars()
                .next()
                .and_then(|c| VULGAR_FRACTIONS.get(&c))
            {
                let whole: u32 = first.parse().unwrap_or(0);
                return (Some(Quantity::fraction(Some(whole), num, den)), 2);
            }
        }
    }

    // "1½" — integer with attached vulgar fraction
    if let Some(caps) = INT_VULGAR.captures(first) {
        let whole: u32 = caps[1].parse().unwrap_or(0);
        let c = caps[2].chars().next().unwrap();
        let (num, den) = VULGAR_FRACTIONS[&c];
        return (Some(Quantity::fraction(Some(whole), num, den)), 1);
    }

    // "½" alone
    if first.chars().count() == 1 {
        if let Some(&(num, den)) = first.chars().next().and_then(|c| VULGAR_FRACTIONS.get(&c)) {
            return (Some(Quantity::fraction(None, num, den)), 1);
        }
    }

    // "1/2"
    if let Some(caps) = PLAIN_FRACTION.captures(first) {
        let num: u32 = caps[1].parse().unwrap_or(0);
        let den: u32 = caps[2].parse().unwrap_or(1);
        return (Some(Quantity::fraction(None, num, den)), 1);
    }

    // "2-3"
    if let Some(caps) = RANGE.captures(first) {
        let min: f64 = caps[1].parse().unwrap_or(0.0);
        let max: f64 = caps[2].parse().unwrap_or(min);
        return (Some(Quantity::range(min, max)), 1);
    }

    // "2 - 3" across three tokens
    if tokens.len() >= 3
        && NUMBER.is_match(first)
        && matches!(tokens[1], "-" | "–" | "to" | "or")
        && NUMBER.is_match(tokens[2])
    {
        let min: f64 = first.parse().unwrap_or(0.0);
        let max: f64 = tokens[2].parse().unwrap_or(min);
        return (Some(Quantity::range(min, max)), 3);
    }

    // "2" or "2.5"
    if NUMBER.is_match(first) {
        if let Ok(amount) = first.parse::<f64>() {
            return (Some(Quantity::exact(amount)), 1);
        }
    }

    (None, 0)
}

/// Try to read a unit from the front of the remaining tokens
///
/// Handles the two-token "fl oz" / "fluid ounce" forms before falling back
/// to single-token vocabulary lookup.
fn parse_unit_tokens(tokens: &[&str]) -> Option<(Unit, usize)> {
    if tokens.is_empty() {
        return None;
    }

    if tokens.len() >= 2 {
        let pair = format!("{} {}", tokens[0], tokens[1]).to_lowercase();
        if let Some(unit) = Unit::parse(&pair) {
            return Some((unit, 2));
        }
    }

    Unit::parse(tokens[0]).map(|unit| (unit, 1))
}

/// Derive a physical-state hint from stripped descriptors
fn state_from_notes(notes: &[String]) -> Option<IngredientState> {
    for note in notes {
        match note.as_str() {
            "fresh" => return Some(IngredientState::Fresh),
            "frozen" => return Some(IngredientState::Frozen),
            "canned" => return Some(IngredientState::Canned),
            "dried" => return Some(IngredientState::Dried),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ParsedLine {
        LineNormalizer::new().parse_line(line).unwrap()
    }

    #[test]
    fn test_basic_line() {
        let parsed = parse("2 cups chopped fresh basil");
        assert_eq!(parsed.quantity.as_ref().unwrap().estimated_value(), Some(2.0));
        assert_eq!(parsed.unit, Some(Unit::Cups));
        assert_eq!(parsed.identity_text, "basil");
        assert_eq!(parsed.preparation_notes, vec!["chopped", "fresh"]);
        assert_eq!(parsed.state_hint, Some(IngredientState::Fresh));
        assert!(!parsed.was_vague_quantity);
    }

    #[test]
    fn test_fraction_quantities() {
        let parsed = parse("1/2 cup sugar");
        assert_eq!(parsed.quantity.as_ref().unwrap().estimated_value(), Some(0.5));

        let parsed = parse("2 1/4 cups flour");
        assert_eq!(parsed.quantity.as_ref().unwrap().estimated_value(), Some(2.25));
        assert_eq!(parsed.identity_text, "flour");
    }

    #[test]
    fn test_vulgar_fractions() {
        let parsed = parse("½ cup milk");
        assert_eq!(parsed.quantity.as_ref().unwrap().estimated_value(), Some(0.5));

        let parsed = parse("1½ cups stock");
        assert_eq!(parsed.quantity.as_ref().unwrap().estimated_value(), Some(1.5));

        let parsed = parse("1 ½ cups stock");
        assert_eq!(parsed.quantity.as_ref().unwrap().estimated_value(), Some(1.5));
    }

    #[test]
    fn test_range_quantity() {
        let parsed = parse("2-3 tbsp olive oil");
        let qty = parsed.quantity.unwrap();
        assert!(qty.is_range());
        assert_eq!(qty.estimated_value(), Some(2.5));
        assert_eq!(parsed.unit, Some(Unit::Tablespoons));
        assert_eq!(parsed.identity_text, "olive oil");
    }

    #[test]
    fn test_no_quantity_left_unset() {
        let parsed = parse("salt");
        assert!(parsed.quantity.is_none());
        assert!(parsed.unit.is_none());
        assert_eq!(parsed.identity_text, "salt");
    }

    #[test]
    fn test_quantity_without_unit() {
        let parsed = parse("3 eggs");
        assert_eq!(parsed.quantity.as_ref().unwrap().estimated_value(), Some(3.0));
        assert!(parsed.unit.is_none());
        assert_eq!(parsed.identity_text, "eggs");
    }

    #[test]
    fn test_vague_unit_flagged() {
        let parsed = parse("1 handful spinach");
        assert_eq!(parsed.unit, Some(Unit::Handfuls));
        assert!(parsed.was_vague_quantity);
        assert_eq!(parsed.identity_text, "spinach");
    }

    #[test]
    fn test_serving_is_an_error() {
        let err = LineNormalizer::new()
            .parse_line("2 servings rice")
            .unwrap_err();
        assert!(matches!(err, ParseError::ServingAmbiguous { .. }));
    }

    #[test]
    fn test_descriptors_kept_as_notes() {
        let parsed = parse("500g boneless skinless chicken breast");
        assert_eq!(parsed.identity_text, "chicken breast");
        assert_eq!(parsed.preparation_notes, vec!["boneless", "skinless"]);
    }

    #[test]
    fn test_attached_unit() {
        let parsed = parse("500g butter");
        assert_eq!(parsed.quantity.as_ref().unwrap().estimated_value(), Some(500.0));
        assert_eq!(parsed.unit, Some(Unit::Grams));
        assert_eq!(parsed.identity_text, "butter");

        let parsed = parse("1.5kg tomatoes");
        assert_eq!(parsed.quantity.as_ref().unwrap().estimated_value(), Some(1.5));
        assert_eq!(parsed.unit, Some(Unit::Kilograms));
    }

    #[test]
    fn test_of_preposition_dropped() {
        let parsed = parse("2 cups of flour");
        assert_eq!(parsed.identity_text, "flour");
    }

    #[test]
    fn test_missing_space_around_ampersand() {
        let parsed = parse("salt&pepper");
        assert_eq!(parsed.identity_text, "salt & pepper");
    }

    #[test]
    fn test_locale_variant_applied() {
        let parsed = parse("1 bunch cilantro");
        assert_eq!(parsed.identity_text, "coriander");
    }

    #[test]
    fn test_locale_variants_configurable() {
        let config = NormalizerConfig {
            locale_variants: vec![("capsicum".to_string(), "bell pepper".to_string())],
            ..Default::default()
        };
        let normalizer = LineNormalizer::with_config(config);
        let parsed = normalizer.parse_line("2 capsicum").unwrap();
        assert_eq!(parsed.identity_text, "bell pepper");
        // The default table is replaced, not extended
        let parsed = normalizer.parse_line("1 bunch cilantro").unwrap();
        assert_eq!(parsed.identity_text, "cilantro");
    }

    #[test]
    fn test_repeated_whitespace_collapsed() {
        let parsed = parse("2   cups   chopped    basil");
        assert_eq!(parsed.identity_text, "basil");
        assert_eq!(parsed.preparation_notes, vec!["chopped"]);
    }

    #[test]
    fn test_state_hints() {
        assert_eq!(parse("1 cup dried apricots").state_hint, Some(IngredientState::Dried));
        assert_eq!(parse("1 can canned tomatoes").state_hint, Some(IngredientState::Canned));
        assert_eq!(parse("2 cups flour").state_hint, None);
    }

    #[test]
    fn test_fl_oz_two_token_unit() {
        let parsed = parse("8 fl oz water");
        assert_eq!(parsed.unit, Some(Unit::FluidOunces));
        assert_eq!(parsed.identity_text, "water");
    }

    #[test]
    fn test_to_taste_suffix_stripped() {
        let parsed = parse("salt to taste");
        assert_eq!(parsed.identity_text, "salt");
        assert!(parsed.preparation_notes.contains(&"to taste".to_string()));
        assert!(parsed.quantity.is_none());
    }

    #[test]
    fn test_word_range() {
        let parsed = parse("2 to 3 cloves garlic");
        let qty = parsed.quantity.unwrap();
        assert!(qty.is_range());
        assert_eq!(qty.estimated_value(), Some(2.5));
        assert_eq!(parsed.unit, Some(Unit::Cloves));
        assert_eq!(parsed.identity_text, "garlic");
    }
}
