use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Unit a food serving or a food entry quantity is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "serving_unit", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ServingUnit {
    G,
    Kg,
    Ml,
    L,
    Cup,
    Tbsp,
    Tsp,
    Piece,
    Slice,
}

/// Largest quantity accepted for a single food entry, in its own unit.
pub const MAX_QUANTITY: i64 = 100_000;
/// Largest per-serving amount of any nutrient (sodium is in mg).
pub const MAX_NUTRIENT_AMOUNT: i64 = 1_000_000;
pub const MAX_SERVING_SIZE: i64 = 100_000;

/// Smallest serving size a food may declare (0.01 of its unit).
pub fn min_serving_size() -> Decimal {
    Decimal::new(1, 2)
}

impl ServingUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::G => "g",
            Self::Kg => "kg",
            Self::Ml => "ml",
            Self::L => "l",
            Self::Cup => "cup",
            Self::Tbsp => "tbsp",
            Self::Tsp => "tsp",
            Self::Piece => "piece",
            Self::Slice => "slice",
        }
    }

    /// Grams-equivalent of one unit. Volumes assume water density.
    /// Count units have no fixed weight and return `None`.
    pub fn grams_equivalent(&self) -> Option<Decimal> {
        match self {
            Self::G | Self::Ml => Some(Decimal::ONE),
            Self::Kg | Self::L => Some(Decimal::ONE_THOUSAND),
            Self::Cup => Some(Decimal::from(240)),
            Self::Tbsp => Some(Decimal::from(15)),
            Self::Tsp => Some(Decimal::from(5)),
            Self::Piece | Self::Slice => None,
        }
    }
}

impl std::fmt::Display for ServingUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn validate_quantity(quantity: Decimal) -> Result<(), AppError> {
    if quantity <= Decimal::ZERO || quantity > Decimal::from(MAX_QUANTITY) {
        return Err(AppError::validation(format!(
            "quantity must be greater than 0 and at most {MAX_QUANTITY}"
        )));
    }
    Ok(())
}

pub fn validate_serving_size(size: Decimal) -> Result<(), AppError> {
    if size < min_serving_size() || size > Decimal::from(MAX_SERVING_SIZE) {
        return Err(AppError::validation(format!(
            "serving_size must be between 0.01 and {MAX_SERVING_SIZE}"
        )));
    }
    Ok(())
}

pub fn validate_nutrient_amount(name: &str, amount: Decimal) -> Result<(), AppError> {
    if amount < Decimal::ZERO || amount > Decimal::from(MAX_NUTRIENT_AMOUNT) {
        return Err(AppError::validation(format!(
            "{name} must be between 0 and {MAX_NUTRIENT_AMOUNT}"
        )));
    }
    Ok(())
}

/// Number of servings represented by `quantity` of `unit`, for a food whose
/// reference serving is `serving_size` of `serving_unit`.
pub fn conversion_factor(
    quantity: Decimal,
    unit: ServingUnit,
    serving_size: Decimal,
    serving_unit: ServingUnit,
) -> Result<Decimal, AppError> {
    validate_quantity(quantity)?;
    if serving_size <= Decimal::ZERO {
        return Err(AppError::validation("food serving size must be positive"));
    }

    let factor = match (unit.grams_equivalent(), serving_unit.grams_equivalent()) {
        (Some(per_unit), Some(per_serving_unit)) => quantity
            .checked_mul(per_unit)
            .zip(serving_size.checked_mul(per_serving_unit))
            .and_then(|(amount, serving)| amount.checked_div(serving)),
        _ if unit == serving_unit => quantity.checked_div(serving_size),
        _ => {
            return Err(AppError::validation(format!(
                "cannot convert {unit} to {serving_unit}"
            )))
        }
    };
    factor.ok_or_else(|| {
        AppError::validation(format!(
            "{quantity} {unit} against a {serving_size} {serving_unit} serving is out of range"
        ))
    })
}

/// Whether entries logged in `unit` can be scaled against a `serving_unit` serving.
pub fn is_convertible(unit: ServingUnit, serving_unit: ServingUnit) -> bool {
    unit == serving_unit
        || (unit.grams_equivalent().is_some() && serving_unit.grams_equivalent().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn same_unit_is_plain_ratio() {
        let f = conversion_factor(d(200), ServingUnit::G, d(100), ServingUnit::G).unwrap();
        assert_eq!(f, d(2));
    }

    #[test]
    fn mass_and_volume_use_the_table() {
        // 1 kg of a food with a 100 g serving is ten servings
        let f = conversion_factor(d(1), ServingUnit::Kg, d(100), ServingUnit::G).unwrap();
        assert_eq!(f, d(10));
        // 2 tbsp against a 1 cup serving
        let f = conversion_factor(d(2), ServingUnit::Tbsp, d(1), ServingUnit::Cup).unwrap();
        assert_eq!(f, Decimal::new(125, 3));
        let f = conversion_factor(d(3), ServingUnit::Tsp, d(15), ServingUnit::Ml).unwrap();
        assert_eq!(f, d(1));
    }

    #[test]
    fn count_units_only_match_themselves() {
        let f = conversion_factor(d(3), ServingUnit::Slice, d(2), ServingUnit::Slice).unwrap();
        assert_eq!(f, Decimal::new(15, 1));

        let err = conversion_factor(d(1), ServingUnit::Piece, d(100), ServingUnit::G).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("piece"));

        let err =
            conversion_factor(d(1), ServingUnit::Slice, d(1), ServingUnit::Piece).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn rejects_out_of_range_quantities() {
        for q in [d(0), d(-5), d(MAX_QUANTITY + 1)] {
            let err = conversion_factor(q, ServingUnit::G, d(100), ServingUnit::G).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        assert!(validate_quantity(d(MAX_QUANTITY)).is_ok());
    }

    #[test]
    fn tiny_serving_sizes_do_not_panic() {
        // below the accepted minimum, as a legacy row could hold
        let tiny = Decimal::new(1, 28);
        let err =
            conversion_factor(d(MAX_QUANTITY), ServingUnit::Kg, tiny, ServingUnit::G).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err =
            conversion_factor(d(MAX_QUANTITY), ServingUnit::Piece, tiny, ServingUnit::Piece)
                .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn bounds_at_the_extremes_still_convert() {
        let f = conversion_factor(
            d(MAX_QUANTITY),
            ServingUnit::Kg,
            min_serving_size(),
            ServingUnit::G,
        )
        .unwrap();
        assert_eq!(f, Decimal::from(10_000_000_000i64));
        assert!(validate_serving_size(min_serving_size()).is_ok());
        assert!(validate_serving_size(Decimal::new(1, 3)).is_err());
        assert!(validate_serving_size(d(MAX_SERVING_SIZE + 1)).is_err());
        assert!(validate_nutrient_amount("calories", d(MAX_NUTRIENT_AMOUNT)).is_ok());
        assert!(validate_nutrient_amount("calories", d(MAX_NUTRIENT_AMOUNT + 1)).is_err());
    }

    #[test]
    fn convertibility_by_unit_class() {
        assert!(is_convertible(ServingUnit::G, ServingUnit::Cup));
        assert!(is_convertible(ServingUnit::Slice, ServingUnit::Slice));
        assert!(!is_convertible(ServingUnit::G, ServingUnit::Piece));
        assert!(!is_convertible(ServingUnit::Piece, ServingUnit::Slice));
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&ServingUnit::Tbsp).unwrap();
        assert_eq!(json, "\"tbsp\"");
        let unit: ServingUnit = serde_json::from_str("\"slice\"").unwrap();
        assert_eq!(unit, ServingUnit::Slice);
    }
}
