//! Structured filters extracted from a query, and the rewritten-query shape
//! that carries them between pipeline stages.

use serde::{Deserialize, Serialize};

use super::metadata::{Category, Month, PriceRange, TransportType};

/// Where a filter value came from — used so later stages can tell an
/// explicit utterance filter from one inherited from session context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterProvenance {
    /// Extracted directly from the current utterance.
    Explicit,
    /// Carried forward from the session's `ActiveEntityView`.
    ContextDerived,
}

/// One filter field paired with the provenance of its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenancedFilter<T> {
    pub value: T,
    pub provenance: FilterProvenance,
}

impl<T> ProvenancedFilter<T> {
    pub fn explicit(value: T) -> Self {
        Self {
            value,
            provenance: FilterProvenance::Explicit,
        }
    }

    pub fn context_derived(value: T) -> Self {
        Self {
            value,
            provenance: FilterProvenance::ContextDerived,
        }
    }
}

/// The full set of independently-optional structured filters parsed from a
/// query. Explicit values always override context-derived ones of the same
/// field — see [`StructuredFilters::merge_explicit_over_implicit`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredFilters {
    pub destination: Option<String>,
    pub category: Option<Category>,
    pub price_range: Option<PriceRange>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub duration_days: Option<u32>,
    pub transport_type: Option<TransportType>,
    pub travel_month: Option<Month>,
    pub family_friendly: Option<bool>,
}

impl StructuredFilters {
    /// Overlays `explicit` on top of `self` (treated as implicit/context
    /// filters): any field explicit sets wins; fields explicit leaves empty
    /// keep their implicit value.
    pub fn merge_explicit_over_implicit(implicit: Self, explicit: Self) -> Self {
        Self {
            destination: explicit.destination.or(implicit.destination),
            category: explicit.category.or(implicit.category),
            price_range: explicit.price_range.or(implicit.price_range),
            price_min: explicit.price_min.or(implicit.price_min),
            price_max: explicit.price_max.or(implicit.price_max),
            duration_days: explicit.duration_days.or(implicit.duration_days),
            transport_type: explicit.transport_type.or(implicit.transport_type),
            travel_month: explicit.travel_month.or(implicit.travel_month),
            family_friendly: explicit.family_friendly.or(implicit.family_friendly),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Output of the context-aware rewriter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewrittenQuery {
    /// Self-contained query text with pronouns/ellipses resolved.
    pub text: String,
    /// Filters seeded from the session's `ActiveEntityView`, each tagged
    /// `ContextDerived`.
    pub implicit_filters: StructuredFilters,
    /// `true` when the new utterance introduced a different singleton-kind
    /// entity (typically `destination`) than the one currently active.
    pub context_switch_detected: bool,
}
