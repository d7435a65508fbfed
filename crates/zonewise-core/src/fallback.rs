//! Fill missing fields from sibling fields.
//!
//! Every step only fills a null slot; a value present in the source is never
//! overwritten. Steps run in a fixed order so chains resolve transitively:
//!
//! 1. Side yard: a single side-yard figure ("10 ft each side") found under a
//!    non-canonical key becomes `principal_side_yard_ft`. Conflicting figures
//!    are left alone; no left/right split is modelled.
//! 2. `interior_min_lot_width_ft` ← `interior_min_lot_frontage_ft`
//! 3. `interior_min_lot_depth_ft` ← `interior_min_lot_width_ft` (after 2)
//! 4. each accessory setback ← its principal setback (after 1)

use serde::Serialize;
use tracing::debug;

use crate::fields::{Field, FieldValues, SETBACK_PAIRS};

/// Where a filled value came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FillSource {
    Field(Field),
    SingleSideYard,
}

/// One null slot filled by the resolver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fill {
    pub field: Field,
    pub source: FillSource,
    pub value: f64,
}

/// Apply the fallback chain in place and report what was filled.
///
/// `side_yard_candidates` are normalised side-yard figures found under
/// non-canonical keys.
pub fn resolve(values: &mut FieldValues, side_yard_candidates: &[f64]) -> Vec<Fill> {
    let mut fills = Vec::new();

    if values.principal_side_yard_ft.is_none()
        && let Some(side) = single_value(side_yard_candidates)
    {
        values.principal_side_yard_ft = Some(side);
        fills.push(Fill {
            field: Field::PrincipalSideYardFt,
            source: FillSource::SingleSideYard,
            value: side,
        });
    }

    fill_from(values, Field::InteriorMinLotWidthFt, Field::InteriorMinLotFrontageFt, &mut fills);
    fill_from(values, Field::InteriorMinLotDepthFt, Field::InteriorMinLotWidthFt, &mut fills);

    for (principal, accessory) in SETBACK_PAIRS {
        fill_from(values, accessory, principal, &mut fills);
    }

    for fill in &fills {
        debug!(field = %fill.field, source = ?fill.source, value = fill.value, "filled from fallback");
    }
    fills
}

fn fill_from(values: &mut FieldValues, target: Field, source: Field, fills: &mut Vec<Fill>) {
    if values.get(target).is_some() {
        return;
    }
    if let Some(v) = values.get(source) {
        values.set(target, Some(v));
        fills.push(Fill {
            field: target,
            source: FillSource::Field(source),
            value: v,
        });
    }
}

/// The value if all candidates agree, otherwise `None`.
fn single_value(candidates: &[f64]) -> Option<f64> {
    let first = *candidates.first()?;
    candidates.iter().all(|&c| c == first).then_some(first)
}
