use anyhow::{Result, bail};
use rust_decimal::Decimal;
use serde::Serialize;

use recipebox_core::units::{Measure, VolumeUnit, WeightUnit};

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Split a `--unit` symbol into `(volume_unit, weight_unit)` columns.
pub(crate) fn split_unit(unit: Option<&str>) -> Result<(Option<String>, Option<String>)> {
    let Some(symbol) = unit.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok((None, None));
    };
    let Some(measure) = Measure::from_symbol(symbol) else {
        let known: Vec<&str> = VolumeUnit::ALL
            .into_iter()
            .map(VolumeUnit::symbol)
            .chain(WeightUnit::ALL.into_iter().map(WeightUnit::symbol))
            .collect();
        bail!("Unknown unit '{symbol}'. Supported: {}", known.join(", "));
    };
    Ok((
        measure.volume_unit().map(str::to_string),
        measure.weight_unit().map(str::to_string),
    ))
}

/// "2.5 cup", "200 g", or a bare count.
pub(crate) fn format_quantity(
    quantity: Decimal,
    volume_unit: Option<&str>,
    weight_unit: Option<&str>,
) -> String {
    let qty = quantity.round_dp(2).normalize();
    match volume_unit.or(weight_unit).filter(|u| !u.is_empty()) {
        Some(unit) => format!("{qty} {unit}"),
        None => qty.to_string(),
    }
}

pub(crate) fn check_mark(checked: bool) -> &'static str {
    if checked { "x" } else { "" }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_split_unit() {
        assert_eq!(
            split_unit(Some("cup")).unwrap(),
            (Some("cup".to_string()), None)
        );
        assert_eq!(
            split_unit(Some(" g ")).unwrap(),
            (None, Some("g".to_string()))
        );
        assert_eq!(split_unit(None).unwrap(), (None, None));
        assert_eq!(split_unit(Some("")).unwrap(), (None, None));
    }

    #[test]
    fn test_split_unit_unknown() {
        let err = split_unit(Some("bucket")).unwrap_err().to_string();
        assert!(err.contains("bucket"));
        assert!(err.contains("tbsp"));
    }

    #[test]
    fn test_format_quantity() {
        let d = |s| Decimal::from_str(s).unwrap();
        assert_eq!(format_quantity(d("2.500"), Some("cup"), None), "2.5 cup");
        assert_eq!(format_quantity(d("228.3495"), None, Some("g")), "228.35 g");
        assert_eq!(format_quantity(d("6"), None, None), "6");
        assert_eq!(format_quantity(d("1"), Some(""), None), "1");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
    }
}
