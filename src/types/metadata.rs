//! The closed-schema `EnrichedMetadata` record attached to every chunk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Business category of an offer. Classification is priority-based when
/// evidence overlaps: `Tour` ≻ `Restaurant` ≻ `Hotel` ≻ `Attraction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Tour,
    Hotel,
    Restaurant,
    Attraction,
}

impl Category {
    /// Priority rank used to resolve overlapping evidence; lower wins.
    pub fn priority(self) -> u8 {
        match self {
            Category::Tour => 0,
            Category::Restaurant => 1,
            Category::Hotel => 2,
            Category::Attraction => 3,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "tour" => Some(Category::Tour),
            "hotel" => Some(Category::Hotel),
            "restaurant" => Some(Category::Restaurant),
            "attraction" => Some(Category::Attraction),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceRange {
    Budget,
    Moderate,
    Expensive,
    Luxury,
}

impl PriceRange {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "budget" => Some(PriceRange::Budget),
            "moderate" => Some(PriceRange::Moderate),
            "expensive" => Some(PriceRange::Expensive),
            "luxury" => Some(PriceRange::Luxury),
            _ => None,
        }
    }

    /// Collapses an explicit `price_max` into a `price_range` bucket.
    pub fn from_price_max(price_max: f64) -> Self {
        if price_max <= 200.0 {
            PriceRange::Budget
        } else if price_max <= 500.0 {
            PriceRange::Moderate
        } else if price_max <= 1500.0 {
            PriceRange::Expensive
        } else {
            PriceRange::Luxury
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    Air,
    Bus,
    Car,
    Train,
    Mixed,
    None,
}

impl TransportType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "air" => Some(TransportType::Air),
            "bus" => Some(TransportType::Bus),
            "car" => Some(TransportType::Car),
            "train" => Some(TransportType::Train),
            "mixed" => Some(TransportType::Mixed),
            "none" => Some(TransportType::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Month {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

const MONTHS_IN_ORDER: [Month; 12] = [
    Month::January,
    Month::February,
    Month::March,
    Month::April,
    Month::May,
    Month::June,
    Month::July,
    Month::August,
    Month::September,
    Month::October,
    Month::November,
    Month::December,
];

impl Month {
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// `true` when `other` is exactly one month away, wrapping December/January.
    pub fn is_adjacent(self, other: Month) -> bool {
        let a = self.ordinal() as i16;
        let b = other.ordinal() as i16;
        let diff = (a - b).rem_euclid(12);
        diff == 1 || diff == 11
    }

    /// Serbian and English month names, used by the rule-based entity extractor.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.to_ascii_lowercase();
        let table: &[(&str, Month)] = &[
            ("january", Month::January),
            ("jan", Month::January),
            ("januar", Month::January),
            ("february", Month::February),
            ("feb", Month::February),
            ("februar", Month::February),
            ("march", Month::March),
            ("mar", Month::March),
            ("mart", Month::March),
            ("april", Month::April),
            ("apr", Month::April),
            ("maj", Month::May),
            ("may", Month::May),
            ("june", Month::June),
            ("jun", Month::June),
            ("july", Month::July),
            ("jul", Month::July),
            ("august", Month::August),
            ("avgust", Month::August),
            ("aug", Month::August),
            ("september", Month::September),
            ("septembar", Month::September),
            ("sep", Month::September),
            ("october", Month::October),
            ("oktobar", Month::October),
            ("oct", Month::October),
            ("november", Month::November),
            ("novembar", Month::November),
            ("nov", Month::November),
            ("december", Month::December),
            ("decembar", Month::December),
            ("dec", Month::December),
        ];
        table
            .iter()
            .find(|(name, _)| normalized.starts_with(name))
            .map(|(_, month)| *month)
    }

    pub fn all() -> &'static [Month; 12] {
        &MONTHS_IN_ORDER
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    YearRound,
    Summer,
    Winter,
    Spring,
    Autumn,
}

impl Season {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "year_round" | "year-round" => Some(Season::YearRound),
            "summer" => Some(Season::Summer),
            "winter" => Some(Season::Winter),
            "spring" => Some(Season::Spring),
            "autumn" | "fall" => Some(Season::Autumn),
            _ => None,
        }
    }

    pub fn from_month(month: Month) -> Self {
        match month {
            Month::December | Month::January | Month::February => Season::Winter,
            Month::March | Month::April | Month::May => Season::Spring,
            Month::June | Month::July | Month::August => Season::Summer,
            Month::September | Month::October | Month::November => Season::Autumn,
        }
    }
}

/// Closed-schema structured annotation of a [`crate::types::chunk::Chunk`],
/// produced by an LLM pass with deterministic overrides. Every field is
/// independently `absent` (`None`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedMetadata {
    pub destination: Option<String>,
    pub category: Option<Category>,
    pub price_range: Option<PriceRange>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub currency: Option<String>,
    pub duration_days: Option<u32>,
    pub transport_type: Option<TransportType>,
    pub travel_month: Option<Month>,
    pub season: Option<Season>,
    pub family_friendly: Option<bool>,
    #[serde(default)]
    pub amenities: BTreeSet<String>,
    pub subcategory: Option<String>,
    #[serde(default)]
    pub confidence_score: f32,
}

impl EnrichedMetadata {
    /// `EnrichedMetadata` with every field absent and zero confidence —
    /// produced when enrichment fails.
    pub fn absent() -> Self {
        Self::default()
    }

    /// Enforces `price_min <= price_max` by discarding the offending bound
    /// rather than guessing which one is wrong.
    pub fn enforce_price_invariant(&mut self) {
        if let (Some(min), Some(max)) = (self.price_min, self.price_max) {
            if min > max {
                self.price_min = None;
                self.price_max = None;
            }
        }
    }
}
