//! Grocery list reconciliation.
//!
//! Incoming quantities are merged into a user's existing grocery rows. The
//! rows are loaded once into a [`GroceryIndex`] keyed by normalized name, the
//! merge runs entirely in memory, and the resulting [`MergePlan`] lists the
//! rows the caller has to insert or update.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::models::{
    GroceryItemPatch, GroceryListItem, Ingredient, ManualAddInput, NewGroceryItem,
    normalize_unit, parse_quantity,
};
use crate::units::{Category, Measure, VolumeUnit, WeightUnit, present};

/// Key used for case-insensitive name matching.
#[must_use]
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Created,
    Updated,
}

/// Rows to persist after a merge.
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    pub creates: Vec<NewGroceryItem>,
    pub updates: Vec<GroceryListItem>,
}

impl MergePlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty()
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Existing { item: GroceryListItem, dirty: bool },
    Pending(NewGroceryItem),
}

impl Slot {
    fn volume_unit(&self) -> Option<&str> {
        match self {
            Self::Existing { item, .. } => item.volume_unit.as_deref(),
            Self::Pending(row) => row.volume_unit.as_deref(),
        }
    }

    fn weight_unit(&self) -> Option<&str> {
        match self {
            Self::Existing { item, .. } => item.weight_unit.as_deref(),
            Self::Pending(row) => row.weight_unit.as_deref(),
        }
    }

    fn category(&self) -> Category {
        Category::classify(self.volume_unit(), self.weight_unit())
    }

    fn same_units(&self, volume_unit: Option<&str>, weight_unit: Option<&str>) -> bool {
        present(self.volume_unit()) == present(volume_unit)
            && present(self.weight_unit()) == present(weight_unit)
    }

    /// Add `amount` to the row and mark it unchecked.
    fn add(&mut self, amount: Decimal) -> Result<()> {
        let quantity = match self {
            Self::Existing { item, dirty } => {
                item.checked = false;
                *dirty = true;
                &mut item.quantity
            }
            Self::Pending(row) => &mut row.quantity,
        };
        *quantity = quantity
            .checked_add(amount)
            .ok_or_else(|| Error::validation("quantity", "Quantity is out of range."))?;
        Ok(())
    }
}

/// In-memory view of one user's grocery rows, indexed by normalized name.
#[derive(Debug, Clone, Default)]
pub struct GroceryIndex {
    slots: Vec<Slot>,
    by_name: HashMap<String, Vec<usize>>,
}

impl GroceryIndex {
    /// Build an index over existing rows. Candidates for a name are visited
    /// in ascending id order.
    #[must_use]
    pub fn new(mut items: Vec<GroceryListItem>) -> Self {
        items.sort_by_key(|item| item.id);
        let mut index = Self::default();
        for item in items {
            let name = item.name.clone();
            index.push(&name, Slot::Existing { item, dirty: false });
        }
        index
    }

    fn push(&mut self, name: &str, slot: Slot) {
        let position = self.slots.len();
        self.slots.push(slot);
        self.by_name.entry(name_key(name)).or_default().push(position);
    }

    fn candidates(&self, name: &str) -> &[usize] {
        self.by_name
            .get(&name_key(name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Recipe-import merge: same name and identical units, no conversion.
    pub fn merge_exact(&mut self, ingredient: &Ingredient) -> Result<MergeOutcome> {
        let volume_unit = present(ingredient.volume_unit.as_deref());
        let weight_unit = present(ingredient.weight_unit.as_deref());
        let found = self
            .candidates(&ingredient.name)
            .iter()
            .copied()
            .find(|&i| self.slots[i].same_units(volume_unit, weight_unit));

        if let Some(i) = found {
            self.slots[i].add(ingredient.quantity)?;
            tracing::debug!(name = %ingredient.name, "merged ingredient into existing row");
            return Ok(MergeOutcome::Updated);
        }

        let row = NewGroceryItem {
            name: ingredient.name.trim().to_string(),
            quantity: ingredient.quantity,
            volume_unit: volume_unit.map(str::to_string),
            weight_unit: weight_unit.map(str::to_string),
        };
        self.push(&ingredient.name, Slot::Pending(row));
        tracing::debug!(name = %ingredient.name, "queued new grocery row");
        Ok(MergeOutcome::Created)
    }

    /// Manual-add merge: same name and same category, converting the incoming
    /// quantity into the matched row's unit.
    ///
    /// Nothing is changed when the conversion fails.
    pub fn merge_by_category(&mut self, incoming: &NewGroceryItem) -> Result<MergeOutcome> {
        let from = Measure::from_columns(
            incoming.volume_unit.as_deref(),
            incoming.weight_unit.as_deref(),
        )?;
        let category = from.category();
        let found = self
            .candidates(&incoming.name)
            .iter()
            .copied()
            .find(|&i| self.slots[i].category() == category);

        let Some(i) = found else {
            self.push(&incoming.name, Slot::Pending(incoming.clone()));
            tracing::debug!(name = %incoming.name, %category, "no match, queued new grocery row");
            return Ok(MergeOutcome::Created);
        };

        let slot = &self.slots[i];
        let target = Measure::from_columns(slot.volume_unit(), slot.weight_unit()).map_err(|_| {
            Error::IncompatibleUnits {
                from: from.to_string(),
                to: slot
                    .volume_unit()
                    .or(slot.weight_unit())
                    .unwrap_or_default()
                    .to_string(),
            }
        })?;
        let amount = from
            .convert(incoming.quantity, target)
            .map_err(|err| match err {
                Error::UnsupportedUnit(_) => Error::IncompatibleUnits {
                    from: from.to_string(),
                    to: target.to_string(),
                },
                other => other,
            })?;
        self.slots[i].add(amount)?;
        tracing::debug!(
            name = %incoming.name,
            from = %from,
            to = %target,
            %amount,
            "merged manual add into existing row"
        );
        Ok(MergeOutcome::Updated)
    }

    #[must_use]
    pub fn into_plan(self) -> MergePlan {
        let mut plan = MergePlan::default();
        for slot in self.slots {
            match slot {
                Slot::Existing { item, dirty: true } => plan.updates.push(item),
                Slot::Existing { dirty: false, .. } => {}
                Slot::Pending(row) => plan.creates.push(row),
            }
        }
        plan
    }
}

/// Validate a manual add request into a row ready to merge.
///
/// Checks run in a fixed order so the first failing field is reported:
/// name, quantity presence, unit exclusivity, quantity format, then the
/// populated unit against its table.
pub fn validate_manual_add(input: &ManualAddInput) -> Result<NewGroceryItem> {
    let name = input.name.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(Error::validation("name", "Name is required."));
    }
    let raw_quantity = input.quantity.as_deref().map(str::trim).unwrap_or_default();
    if raw_quantity.is_empty() {
        return Err(Error::validation("quantity", "Quantity is required."));
    }
    let volume_unit = normalize_unit(input.volume_unit.as_deref());
    let weight_unit = normalize_unit(input.weight_unit.as_deref());
    if volume_unit.is_some() && weight_unit.is_some() {
        return Err(Error::validation(
            "units",
            "Provide either a volume unit or a weight unit, not both.",
        ));
    }
    let quantity = parse_quantity(raw_quantity)
        .ok_or_else(|| Error::validation("quantity", "Quantity must be a valid number."))?;
    if volume_unit
        .as_deref()
        .is_some_and(|unit| VolumeUnit::from_symbol(unit).is_none())
    {
        return Err(Error::validation("volume_unit", "Invalid volume unit."));
    }
    if weight_unit
        .as_deref()
        .is_some_and(|unit| WeightUnit::from_symbol(unit).is_none())
    {
        return Err(Error::validation("weight_unit", "Invalid weight unit."));
    }
    Ok(NewGroceryItem {
        name: name.to_string(),
        quantity,
        volume_unit,
        weight_unit,
    })
}

/// Overwrite the fields present in `patch`. Units are not cross-checked.
pub fn apply_patch(item: &mut GroceryListItem, patch: &GroceryItemPatch) {
    if let Some(checked) = patch.checked {
        item.checked = checked;
    }
    if let Some(quantity) = patch.quantity {
        item.quantity = quantity;
    }
    if let Some(volume_unit) = &patch.volume_unit {
        item.volume_unit = normalize_unit(volume_unit.as_deref());
    }
    if let Some(weight_unit) = &patch.weight_unit {
        item.weight_unit = normalize_unit(weight_unit.as_deref());
    }
}

#[must_use]
pub fn import_message(created: usize, updated: usize) -> String {
    match (created, updated) {
        (0, 0) => "No changes made to grocery list".to_string(),
        (c, 0) => format!("Added {c} new ingredient(s) to grocery list"),
        (0, u) => format!("Updated {u} existing ingredient(s) to grocery list"),
        (c, u) => format!(
            "Added {c} new ingredient(s) and updated {u} existing ingredient(s) to grocery list"
        ),
    }
}

#[must_use]
pub fn manual_add_message(name: &str, outcome: MergeOutcome) -> String {
    match outcome {
        MergeOutcome::Created => format!("Added {name} to grocery list."),
        MergeOutcome::Updated => format!("Updated grocery list item for {name}."),
    }
}

#[must_use]
pub fn cleanup_message(removed: usize) -> String {
    format!("Removed {removed} items from grocery list")
}
