use std::fmt;

use rust_decimal::Decimal;

use crate::error::{Error, Result};

/// A unit from one of the fixed measurement tables.
///
/// Conversion only exists between two units of the same table, so the type
/// system rules out converting a cup into grams.
pub trait Unit: Copy + fmt::Display {
    /// Amount of the table's base unit (milliliters or grams) in one of this unit.
    fn base_factor(self) -> Decimal;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeUnit {
    Tsp,
    Tbsp,
    FlOz,
    Cup,
    Pt,
    Qt,
    Gal,
    Ml,
    L,
}

impl VolumeUnit {
    pub const ALL: [Self; 9] = [
        Self::Tsp,
        Self::Tbsp,
        Self::FlOz,
        Self::Cup,
        Self::Pt,
        Self::Qt,
        Self::Gal,
        Self::Ml,
        Self::L,
    ];

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Tsp => "tsp",
            Self::Tbsp => "tbsp",
            Self::FlOz => "fl_oz",
            Self::Cup => "cup",
            Self::Pt => "pt",
            Self::Qt => "qt",
            Self::Gal => "gal",
            Self::Ml => "ml",
            Self::L => "l",
        }
    }

    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|u| u.symbol() == symbol)
    }

    #[must_use]
    pub fn milliliters(self) -> Decimal {
        match self {
            Self::Tsp => Decimal::new(492_892, 5),
            Self::Tbsp => Decimal::new(147_868, 4),
            Self::FlOz => Decimal::new(295_735, 4),
            Self::Cup => Decimal::new(236_588, 3),
            Self::Pt => Decimal::new(473_176, 3),
            Self::Qt => Decimal::new(946_353, 3),
            Self::Gal => Decimal::new(378_541, 2),
            Self::Ml => Decimal::ONE,
            Self::L => Decimal::ONE_THOUSAND,
        }
    }
}

impl Unit for VolumeUnit {
    fn base_factor(self) -> Decimal {
        self.milliliters()
    }
}

impl fmt::Display for VolumeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeightUnit {
    G,
    Kg,
    Oz,
    Lb,
}

impl WeightUnit {
    pub const ALL: [Self; 4] = [Self::G, Self::Kg, Self::Oz, Self::Lb];

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::G => "g",
            Self::Kg => "kg",
            Self::Oz => "oz",
            Self::Lb => "lb",
        }
    }

    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|u| u.symbol() == symbol)
    }

    #[must_use]
    pub fn grams(self) -> Decimal {
        match self {
            Self::G => Decimal::ONE,
            Self::Kg => Decimal::ONE_THOUSAND,
            Self::Oz => Decimal::new(283_495, 4),
            Self::Lb => Decimal::new(453_592, 3),
        }
    }
}

impl Unit for WeightUnit {
    fn base_factor(self) -> Decimal {
        self.grams()
    }
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `value × factor[from] / factor[to]`, computed in decimal.
pub fn convert<U: Unit>(value: Decimal, from: U, to: U) -> Result<Decimal> {
    value
        .checked_mul(from.base_factor())
        .and_then(|base| base.checked_div(to.base_factor()))
        .ok_or_else(|| Error::validation("quantity", "Quantity is out of range."))
}

/// Treat blank unit columns the same as absent ones.
#[must_use]
pub fn present(unit: Option<&str>) -> Option<&str> {
    unit.filter(|u| !u.trim().is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Volume,
    Weight,
    Count,
}

impl Category {
    /// Volume wins if set, then weight, otherwise the item is counted.
    #[must_use]
    pub fn classify(volume_unit: Option<&str>, weight_unit: Option<&str>) -> Self {
        if present(volume_unit).is_some() {
            Self::Volume
        } else if present(weight_unit).is_some() {
            Self::Weight
        } else {
            Self::Count
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Volume => "volume",
            Self::Weight => "weight",
            Self::Count => "count",
        })
    }
}

/// The resolved unit of a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measure {
    Volume(VolumeUnit),
    Weight(WeightUnit),
    Count,
}

impl Measure {
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        VolumeUnit::from_symbol(symbol)
            .map(Self::Volume)
            .or_else(|| WeightUnit::from_symbol(symbol).map(Self::Weight))
    }

    /// Resolve a `(volume_unit, weight_unit)` column pair.
    ///
    /// The category is decided first, exactly as [`Category::classify`] does,
    /// then the populated symbol must exist in that category's table.
    pub fn from_columns(volume_unit: Option<&str>, weight_unit: Option<&str>) -> Result<Self> {
        match Category::classify(volume_unit, weight_unit) {
            Category::Volume => {
                let symbol = present(volume_unit).unwrap_or_default();
                VolumeUnit::from_symbol(symbol)
                    .map(Self::Volume)
                    .ok_or_else(|| Error::UnsupportedUnit(symbol.to_string()))
            }
            Category::Weight => {
                let symbol = present(weight_unit).unwrap_or_default();
                WeightUnit::from_symbol(symbol)
                    .map(Self::Weight)
                    .ok_or_else(|| Error::UnsupportedUnit(symbol.to_string()))
            }
            Category::Count => Ok(Self::Count),
        }
    }

    #[must_use]
    pub fn category(self) -> Category {
        match self {
            Self::Volume(_) => Category::Volume,
            Self::Weight(_) => Category::Weight,
            Self::Count => Category::Count,
        }
    }

    #[must_use]
    pub fn volume_unit(self) -> Option<&'static str> {
        match self {
            Self::Volume(u) => Some(u.symbol()),
            _ => None,
        }
    }

    #[must_use]
    pub fn weight_unit(self) -> Option<&'static str> {
        match self {
            Self::Weight(u) => Some(u.symbol()),
            _ => None,
        }
    }

    /// Express `value` (in `self`) in the `target` measure.
    pub fn convert(self, value: Decimal, target: Self) -> Result<Decimal> {
        match (self, target) {
            (Self::Volume(from), Self::Volume(to)) => convert(value, from, to),
            (Self::Weight(from), Self::Weight(to)) => convert(value, from, to),
            (Self::Count, Self::Count) => Ok(value),
            _ => Err(Error::IncompatibleUnits {
                from: self.to_string(),
                to: target.to_string(),
            }),
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Volume(u) => u.fmt(f),
            Self::Weight(u) => u.fmt(f),
            Self::Count => f.write_str("count"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn close(a: Decimal, b: Decimal, tolerance: &str) -> bool {
        (a - b).abs() <= dec(tolerance)
    }

    #[test]
    fn test_volume_table_values() {
        assert_eq!(VolumeUnit::Tsp.milliliters(), dec("4.92892"));
        assert_eq!(VolumeUnit::Tbsp.milliliters(), dec("14.7868"));
        assert_eq!(VolumeUnit::FlOz.milliliters(), dec("29.5735"));
        assert_eq!(VolumeUnit::Cup.milliliters(), dec("236.588"));
        assert_eq!(VolumeUnit::Pt.milliliters(), dec("473.176"));
        assert_eq!(VolumeUnit::Qt.milliliters(), dec("946.353"));
        assert_eq!(VolumeUnit::Gal.milliliters(), dec("3785.41"));
        assert_eq!(VolumeUnit::Ml.milliliters(), dec("1"));
        assert_eq!(VolumeUnit::L.milliliters(), dec("1000"));
    }

    #[test]
    fn test_weight_table_values() {
        assert_eq!(WeightUnit::G.grams(), dec("1"));
        assert_eq!(WeightUnit::Kg.grams(), dec("1000"));
        assert_eq!(WeightUnit::Oz.grams(), dec("28.3495"));
        assert_eq!(WeightUnit::Lb.grams(), dec("453.592"));
    }

    #[test]
    fn test_symbols_roundtrip_through_lookup() {
        for unit in VolumeUnit::ALL {
            assert_eq!(VolumeUnit::from_symbol(unit.symbol()), Some(unit));
        }
        for unit in WeightUnit::ALL {
            assert_eq!(WeightUnit::from_symbol(unit.symbol()), Some(unit));
        }
        assert!(VolumeUnit::from_symbol("Cup").is_none());
        assert!(WeightUnit::from_symbol("pinch").is_none());
    }

    #[test]
    fn test_convert_known_values() {
        assert_eq!(
            convert(dec("1"), WeightUnit::Lb, WeightUnit::Oz).unwrap(),
            dec("16")
        );
        assert_eq!(
            convert(dec("2.5"), WeightUnit::Kg, WeightUnit::G).unwrap(),
            dec("2500")
        );
        assert_eq!(
            convert(dec("1"), VolumeUnit::L, VolumeUnit::Ml).unwrap(),
            dec("1000")
        );
        // 2 cups = 473.176 ml = ~32 tbsp
        let tbsp = convert(dec("2"), VolumeUnit::Cup, VolumeUnit::Tbsp).unwrap();
        assert!(close(tbsp, dec("32"), "0.01"));
    }

    #[test]
    fn test_convert_roundtrip_all_volume_pairs() {
        let x = dec("3.75");
        for a in VolumeUnit::ALL {
            for b in VolumeUnit::ALL {
                let there = convert(x, a, b).unwrap();
                let back = convert(there, b, a).unwrap();
                assert!(close(back, x, "0.000000001"), "{a} -> {b} -> {a}: {back}");
            }
        }
    }

    #[test]
    fn test_convert_roundtrip_all_weight_pairs() {
        let x = dec("200");
        for a in WeightUnit::ALL {
            for b in WeightUnit::ALL {
                let there = convert(x, a, b).unwrap();
                let back = convert(there, b, a).unwrap();
                assert!(close(back, x, "0.000000001"), "{a} -> {b} -> {a}: {back}");
            }
        }
    }

    fn measure(symbol: &str) -> Measure {
        Measure::from_symbol(symbol).unwrap()
    }

    #[test]
    fn test_measure_convert_cross_category_fails() {
        let err = measure("cup").convert(dec("1"), measure("g")).unwrap_err();
        assert!(matches!(err, Error::IncompatibleUnits { .. }));
        let err = measure("lb").convert(dec("1"), measure("ml")).unwrap_err();
        assert!(matches!(err, Error::IncompatibleUnits { .. }));
        let err = Measure::Count.convert(dec("1"), measure("g")).unwrap_err();
        assert!(matches!(err, Error::IncompatibleUnits { .. }));
    }

    #[test]
    fn test_measure_from_unknown_symbol() {
        assert!(Measure::from_symbol("pinch").is_none());
        assert!(Measure::from_symbol("Cup").is_none());
    }

    #[test]
    fn test_measure_convert_same_category() {
        let ml = measure("tsp").convert(dec("3"), measure("ml")).unwrap();
        assert_eq!(ml, dec("14.78676"));
    }

    #[test]
    fn test_convert_overflow_is_reported() {
        let err = convert(Decimal::MAX, VolumeUnit::Gal, VolumeUnit::Ml).unwrap_err();
        assert!(matches!(err, Error::Validation { field: "quantity", .. }));
    }

    #[test]
    fn test_classify() {
        assert_eq!(Category::classify(Some("cup"), None), Category::Volume);
        assert_eq!(Category::classify(None, Some("g")), Category::Weight);
        assert_eq!(Category::classify(None, None), Category::Count);
        assert_eq!(Category::classify(Some(""), Some("g")), Category::Weight);
        assert_eq!(Category::classify(Some("  "), None), Category::Count);
        // Volume takes precedence when both are populated
        assert_eq!(Category::classify(Some("cup"), Some("g")), Category::Volume);
    }

    #[test]
    fn test_measure_from_columns() {
        assert_eq!(
            Measure::from_columns(Some("cup"), None).unwrap(),
            Measure::Volume(VolumeUnit::Cup)
        );
        assert_eq!(
            Measure::from_columns(None, Some("lb")).unwrap(),
            Measure::Weight(WeightUnit::Lb)
        );
        assert_eq!(Measure::from_columns(None, None).unwrap(), Measure::Count);
        // A weight symbol in the volume column is not a volume unit
        assert!(matches!(
            Measure::from_columns(Some("g"), None),
            Err(Error::UnsupportedUnit(_))
        ));
    }

    #[test]
    fn test_measure_convert_count_is_identity() {
        assert_eq!(
            Measure::Count.convert(dec("3"), Measure::Count).unwrap(),
            dec("3")
        );
        assert!(Measure::Count
            .convert(dec("3"), Measure::Weight(WeightUnit::G))
            .is_err());
    }
}
