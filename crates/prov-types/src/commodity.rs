use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::id::CommodityId;

/// Static reference data for a harvested good (e.g. "black pepper, whole").
///
/// Immutable once any lot references it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommodityType {
    pub id: CommodityId,
    pub name: String,
    /// Free-form grouping such as `whole`, `ground`, `extract`.
    pub category: String,
    /// Shelf life once sealed; `None` if the commodity does not expire.
    pub shelf_life_months: Option<u32>,
}

impl CommodityType {
    pub fn new(
        id: CommodityId,
        name: impl Into<String>,
        category: impl Into<String>,
        shelf_life_months: Option<u32>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            category: category.into(),
            shelf_life_months,
        }
    }

    /// Expiry of a unit sealed at `sealed_at`, if the commodity expires.
    pub fn expiry_from(&self, sealed_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.shelf_life_months
            .and_then(|months| sealed_at.checked_add_months(Months::new(months)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pepper(shelf_life: Option<u32>) -> CommodityType {
        CommodityType::new(
            CommodityId::new("black-pepper").unwrap(),
            "Black pepper",
            "whole",
            shelf_life,
        )
    }

    #[test]
    fn expiry_adds_calendar_months() {
        let sealed = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
        let expiry = pepper(Some(1)).expiry_from(sealed).unwrap();
        // Clamped to the end of February in a leap year.
        assert_eq!(expiry, Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap());
    }

    #[test]
    fn no_shelf_life_means_no_expiry() {
        assert_eq!(pepper(None).expiry_from(Utc::now()), None);
    }
}
