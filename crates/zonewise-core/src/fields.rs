//! Canonical zoning field list and the partial-record value object.
//!
//! The field names are a wire contract: JSON keys, DuckDB columns and Arrow
//! schema fields all use them verbatim. Everything that addresses a field goes
//! through [`Field`], so a misspelled column name is a compile error rather
//! than a silently-null value.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Semantic role of a numeric field. Selects parsing and range rules in the
/// normaliser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Square feet.
    Area,
    /// Feet (setbacks, frontage, height).
    LinearFeet,
    /// 0–100, never a 0–1 fraction.
    Percent,
    /// Building stories, one decimal place (2.5 for "2½").
    Stories,
    /// Dimensionless ratios and densities (FAR, units per acre).
    Ratio,
    /// Whole counts.
    Count,
}

/// Schema section a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldGroup {
    InteriorLot,
    CornerLot,
    LotConstraints,
    PrincipalYards,
    AccessoryYards,
    Coverage,
    Height,
    FloorArea,
    Intensity,
}

impl FieldGroup {
    pub const ALL: [FieldGroup; 9] = [
        Self::InteriorLot,
        Self::CornerLot,
        Self::LotConstraints,
        Self::PrincipalYards,
        Self::AccessoryYards,
        Self::Coverage,
        Self::Height,
        Self::FloorArea,
        Self::Intensity,
    ];

    /// Heading used by the CLI card display.
    pub fn title(&self) -> &'static str {
        match self {
            Self::InteriorLot => "Interior Lots",
            Self::CornerLot => "Corner Lots",
            Self::LotConstraints => "Lot Constraints",
            Self::PrincipalYards => "Principal Building Yards",
            Self::AccessoryYards => "Accessory Building Yards",
            Self::Coverage => "Coverage",
            Self::Height => "Height",
            Self::FloorArea => "Floor Area",
            Self::Intensity => "Development Intensity",
        }
    }

    /// Key used for this group in nested LLM responses, if any.
    pub fn response_key(&self) -> &'static str {
        match self {
            Self::InteriorLot => "interior_lots",
            Self::CornerLot => "corner_lots",
            Self::LotConstraints => "lot_requirements",
            Self::PrincipalYards => "principal_building_yards",
            Self::AccessoryYards => "accessory_building_yards",
            Self::Coverage | Self::Height => "coverage_and_height",
            Self::FloorArea => "floor_area",
            Self::Intensity => "development_intensity",
        }
    }

    /// Prefix that turns a key inside the group's response section into a
    /// canonical name (`side_yard_ft` under principal yards is
    /// `principal_side_yard_ft`).
    pub fn response_prefix(&self) -> &'static str {
        match self {
            Self::InteriorLot => "interior_",
            Self::CornerLot => "corner_",
            Self::PrincipalYards => "principal_",
            Self::AccessoryYards => "accessory_",
            _ => "",
        }
    }

    pub fn fields(self) -> impl Iterator<Item = Field> {
        Field::ALL.iter().copied().filter(move |f| f.group() == self)
    }
}

macro_rules! zoning_fields {
    ($( $variant:ident => $name:ident : $kind:ident, $group:ident; )+) => {
        /// One of the canonical numeric requirement fields.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Field {
            $( $variant, )+
        }

        impl Field {
            /// Every canonical field, in wire order.
            pub const ALL: &'static [Field] = &[ $( Field::$variant, )+ ];

            /// Canonical wire name.
            pub fn name(self) -> &'static str {
                match self {
                    $( Field::$variant => stringify!($name), )+
                }
            }

            pub fn kind(self) -> FieldKind {
                match self {
                    $( Field::$variant => FieldKind::$kind, )+
                }
            }

            pub fn group(self) -> FieldGroup {
                match self {
                    $( Field::$variant => FieldGroup::$group, )+
                }
            }

            /// Look up a field by its exact canonical name.
            pub fn from_name(name: &str) -> Option<Field> {
                match name {
                    $( stringify!($name) => Some(Field::$variant), )+
                    _ => None,
                }
            }
        }

        /// Partial requirement record: one optional slot per canonical field.
        ///
        /// `None` means "not specified in source". Present values are finite and
        /// non-negative once they have passed through the normaliser.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct FieldValues {
            $( pub $name: Option<f64>, )+
        }

        impl FieldValues {
            pub fn get(&self, field: Field) -> Option<f64> {
                match field {
                    $( Field::$variant => self.$name, )+
                }
            }

            pub fn slot_mut(&mut self, field: Field) -> &mut Option<f64> {
                match field {
                    $( Field::$variant => &mut self.$name, )+
                }
            }
        }
    };
}

zoning_fields! {
    InteriorMinLotAreaSqft => interior_min_lot_area_sqft: Area, InteriorLot;
    InteriorMinLotFrontageFt => interior_min_lot_frontage_ft: LinearFeet, InteriorLot;
    InteriorMinLotWidthFt => interior_min_lot_width_ft: LinearFeet, InteriorLot;
    InteriorMinLotDepthFt => interior_min_lot_depth_ft: LinearFeet, InteriorLot;
    CornerMinLotAreaSqft => corner_min_lot_area_sqft: Area, CornerLot;
    CornerMinLotFrontageFt => corner_min_lot_frontage_ft: LinearFeet, CornerLot;
    CornerMinLotWidthFt => corner_min_lot_width_ft: LinearFeet, CornerLot;
    CornerMinLotDepthFt => corner_min_lot_depth_ft: LinearFeet, CornerLot;
    MinCircleDiameterFt => min_circle_diameter_ft: LinearFeet, LotConstraints;
    BuildableLotAreaSqft => buildable_lot_area_sqft: Area, LotConstraints;
    PrincipalFrontYardFt => principal_front_yard_ft: LinearFeet, PrincipalYards;
    PrincipalSideYardFt => principal_side_yard_ft: LinearFeet, PrincipalYards;
    PrincipalStreetSideYardFt => principal_street_side_yard_ft: LinearFeet, PrincipalYards;
    PrincipalRearYardFt => principal_rear_yard_ft: LinearFeet, PrincipalYards;
    PrincipalStreetRearYardFt => principal_street_rear_yard_ft: LinearFeet, PrincipalYards;
    AccessoryFrontYardFt => accessory_front_yard_ft: LinearFeet, AccessoryYards;
    AccessorySideYardFt => accessory_side_yard_ft: LinearFeet, AccessoryYards;
    AccessoryStreetSideYardFt => accessory_street_side_yard_ft: LinearFeet, AccessoryYards;
    AccessoryRearYardFt => accessory_rear_yard_ft: LinearFeet, AccessoryYards;
    AccessoryStreetRearYardFt => accessory_street_rear_yard_ft: LinearFeet, AccessoryYards;
    MaxBuildingCoveragePercent => max_building_coverage_percent: Percent, Coverage;
    MaxLotCoveragePercent => max_lot_coverage_percent: Percent, Coverage;
    MaxHeightStories => max_height_stories: Stories, Height;
    MaxHeightFeetTotal => max_height_feet_total: LinearFeet, Height;
    MinGrossFloorAreaFirstFloorSqft => min_gross_floor_area_first_floor_sqft: Area, FloorArea;
    MinGrossFloorAreaMultistorySqft => min_gross_floor_area_multistory_sqft: Area, FloorArea;
    MaxGrossFloorAreaAllStructuresSqft => max_gross_floor_area_all_structures_sqft: Area, FloorArea;
    MaximumFar => maximum_far: Ratio, Intensity;
    MaximumDensityUnitsPerAcre => maximum_density_units_per_acre: Ratio, Intensity;
}

/// Principal setbacks paired with the accessory setback they default into.
pub const SETBACK_PAIRS: [(Field, Field); 5] = [
    (Field::PrincipalFrontYardFt, Field::AccessoryFrontYardFt),
    (Field::PrincipalSideYardFt, Field::AccessorySideYardFt),
    (Field::PrincipalStreetSideYardFt, Field::AccessoryStreetSideYardFt),
    (Field::PrincipalRearYardFt, Field::AccessoryRearYardFt),
    (Field::PrincipalStreetRearYardFt, Field::AccessoryStreetRearYardFt),
];

impl Field {
    /// Lot-area fields are the only ones exposed to footnote contamination.
    pub fn is_lot_area(self) -> bool {
        matches!(
            self,
            Field::InteriorMinLotAreaSqft | Field::CornerMinLotAreaSqft | Field::BuildableLotAreaSqft
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Field::from_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown zoning field `{name}`")))
    }
}

impl FieldValues {
    pub fn set(&mut self, field: Field, value: Option<f64>) {
        *self.slot_mut(field) = value;
    }

    /// Present `(field, value)` pairs in wire order.
    pub fn iter_present(&self) -> impl Iterator<Item = (Field, f64)> + '_ {
        Field::ALL
            .iter()
            .filter_map(|&f| self.get(f).map(|v| (f, v)))
    }

    pub fn present_count(&self) -> usize {
        self.iter_present().count()
    }

    pub fn is_empty(&self) -> bool {
        self.present_count() == 0
    }

    /// Field-level merge: each incoming non-null value wins, nulls keep the
    /// existing value.
    pub fn merged_with(&self, incoming: &FieldValues) -> FieldValues {
        let mut out = self.clone();
        for (field, value) in incoming.iter_present() {
            out.set(field, Some(value));
        }
        out
    }
}
