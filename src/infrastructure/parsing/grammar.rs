//! Tolerant grammars for free-text card fields
//!
//! Storefronts print cannabinoid content, prices and pack sizes in many
//! shapes. Everything here takes the text as displayed and returns `None`
//! rather than failing when a value cannot be read.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::product::CannabinoidRange;

const NUMBER: &str = r"(\d+(?:[.,]\d+)?)";

/// `23-30%`, `23 – 30 %`, `23% to 30%`
static RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i){NUMBER}\s*%?\s*(?:-|–|—|to)\s*{NUMBER}\s*%")).expect("static regex is valid")
});

/// `over 20%`, `above 20 %`, `> 20%`
static LOWER_BOUND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)(?:over|above|more than|>)\s*{NUMBER}\s*%")).expect("static regex is valid")
});

/// `under 1%`, `below 1 %`, `less than 1%`, `< 1%`
static UPPER_BOUND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)(?:under|below|less than|<)\s*{NUMBER}\s*%")).expect("static regex is valid")
});

static SINGLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"{NUMBER}\s*%")).expect("static regex is valid"));

/// First money amount: `$1,234.50`, `€45,00`, `45.00 USD`, `1200`.
/// The grouped form needs at least one separator, or a bare `1000` would
/// match as `100`.
static PRICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3}(?:[,.\s]\d{3})+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?)").expect("static regex is valid"));

/// `5 seeds`, `Pack of 10`, `3x`, `x5`, `10-pack`
static PACK_SIZE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:(\d+)\s*(?:x\b|seeds?|pcs|pack|-pack|fem|reg|auto)|pack\s*of\s*(\d+)|x\s*(\d+)\b)")
        .expect("static regex is valid")
});

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d[\d,]*)").expect("static regex is valid"));

static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(NUMBER).expect("static regex is valid"));

fn number(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse THC / CBD text into a range.
///
/// Forms are tried in order: explicit range, lower bound, upper bound,
/// single value.
pub fn parse_cannabinoid_range(text: &str) -> Option<CannabinoidRange> {
    let raw_text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if raw_text.is_empty() {
        return None;
    }

    let (min, max) = if let Some(caps) = RANGE.captures(&raw_text) {
        let a = number(&caps[1])?;
        let b = number(&caps[2])?;
        (Some(a.min(b)), Some(a.max(b)))
    } else if let Some(caps) = LOWER_BOUND.captures(&raw_text) {
        (Some(number(&caps[1])?), None)
    } else if let Some(caps) = UPPER_BOUND.captures(&raw_text) {
        (None, Some(number(&caps[1])?))
    } else if let Some(caps) = SINGLE.captures(&raw_text) {
        let value = number(&caps[1])?;
        (Some(value), Some(value))
    } else {
        return None;
    };

    Some(CannabinoidRange { min, max, raw_text })
}

/// First money amount in `text`, thousands separators removed
pub fn parse_price(text: &str) -> Option<f64> {
    let caps = PRICE.captures(text)?;
    let raw = caps[1].replace(char::is_whitespace, "");

    // "1,234.50" / "1.234,50" / "45,00" / "45.00"
    let normalized = match (raw.rfind('.'), raw.rfind(',')) {
        (Some(dot), Some(comma)) if dot > comma => raw.replace(',', ""),
        (Some(_), Some(_)) => raw.replace('.', "").replace(',', "."),
        (None, Some(comma)) if raw.len() - comma == 3 => raw.replace(',', "."),
        (None, Some(_)) => raw.replace(',', ""),
        (Some(dot), None) if raw.len() - dot == 4 => raw.replace('.', ""),
        _ => raw,
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

/// Seeds per pack from a label like "5 Seeds" or "Pack of 10"
pub fn parse_pack_size(text: &str) -> Option<u32> {
    if let Ok(bare) = text.trim().parse::<u32>() {
        return Some(bare).filter(|n| *n > 0);
    }
    let caps = PACK_SIZE.captures(text)?;
    caps.iter()
        .skip(1)
        .flatten()
        .find_map(|m| m.as_str().parse::<u32>().ok())
        .filter(|n| *n > 0)
}

/// Star rating: "4.5", "Rated 4.50 out of 5", or a percentage width "90%"
pub fn parse_rating(text: &str) -> Option<f32> {
    let trimmed = text.trim();
    if let Some(percent) = trimmed.strip_suffix('%') {
        return number(percent.trim().trim_start_matches("width:").trim())
            .map(|p| (p / 20.0) as f32)
            .filter(|r| (0.0..=5.0).contains(r));
    }
    let caps = DECIMAL.captures(trimmed)?;
    number(&caps[1])
        .map(|r| r as f32)
        .filter(|r| (0.0..=5.0).contains(r))
}

/// First integer, e.g. "(1,204 reviews)" -> 1204
pub fn parse_count(text: &str) -> Option<u32> {
    let caps = INTEGER.captures(text)?;
    caps[1].replace(',', "").parse().ok()
}
