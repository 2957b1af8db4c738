//! Ballpark rental quote from fixed rate tables.
//!
//! The estimate is a heuristic for the public calculator, not a price: a monthly
//! point estimate per unit is `sqft × type rate × region multiplier`, plus monthly
//! feature add-ons, scaled by a term discount. One-time delivery/installation and
//! teardown are charged per unit. The published range is ±12% around the point.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub const MIN_MONTHS: u32 = 1;
pub const MAX_MONTHS: u32 = 120;
pub const MAX_QUANTITY: u32 = 50;
pub const MIN_SQUARE_FEET: u32 = 100;
pub const MAX_SQUARE_FEET: u32 = 100_000;
const MAX_OCCUPANTS: u32 = 5_000;
/// Half-width of the published range around the point estimate.
const RANGE_SPREAD: f64 = 0.12;
const DELIVERY_BASE: f64 = 2_500.0;
const DELIVERY_PER_SQFT: f64 = 0.75;
const TEARDOWN_SHARE: f64 = 0.60;
/// Occupant-based sizes round up to this module width.
const SIZE_STEP: u32 = 100;

macro_rules! str_enum {
    ($name:ident, $what:literal { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name { $($variant),+ }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self { $($name::$variant => $s),+ }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($s => Ok($name::$variant),)+
                    other => Err(AppError::BadRequest(format!(
                        "unknown {} '{}' (expected one of: {})",
                        $what,
                        other,
                        [$($s),+].join(", ")
                    ))),
                }
            }
        }
    };
}

str_enum!(BuildingType, "building_type" {
    Office => "office",
    Classroom => "classroom",
    Storage => "storage",
    Restroom => "restroom",
    Medical => "medical",
    Complex => "complex",
});

str_enum!(Region, "region" {
    Northeast => "northeast",
    Southeast => "southeast",
    Midwest => "midwest",
    Southwest => "southwest",
    West => "west",
});

str_enum!(Feature, "feature" {
    Hvac => "hvac",
    Restrooms => "restrooms",
    AdaRamp => "ada_ramp",
    Furniture => "furniture",
    SecuritySystem => "security_system",
    StepsDecks => "steps_decks",
});

impl BuildingType {
    /// Monthly rent per square foot.
    pub fn rate_per_sqft(&self) -> f64 {
        match self {
            BuildingType::Office => 1.10,
            BuildingType::Classroom => 1.25,
            BuildingType::Storage => 0.45,
            BuildingType::Restroom => 2.40,
            BuildingType::Medical => 1.80,
            BuildingType::Complex => 1.35,
        }
    }

    /// Floor area per occupant used to size from a headcount. None when headcount does not apply.
    pub fn sqft_per_occupant(&self) -> Option<u32> {
        match self {
            BuildingType::Office => Some(150),
            BuildingType::Classroom => Some(35),
            BuildingType::Storage => None,
            BuildingType::Restroom => Some(15),
            BuildingType::Medical => Some(120),
            BuildingType::Complex => Some(200),
        }
    }
}

impl Region {
    pub fn multiplier(&self) -> f64 {
        match self {
            Region::Northeast => 1.15,
            Region::Southeast => 0.95,
            Region::Midwest => 1.00,
            Region::Southwest => 0.97,
            Region::West => 1.20,
        }
    }
}

impl Feature {
    /// Monthly add-on per unit.
    pub fn monthly_cost(&self) -> f64 {
        match self {
            Feature::Hvac => 150.0,
            Feature::Restrooms => 450.0,
            Feature::AdaRamp => 200.0,
            Feature::Furniture => 300.0,
            Feature::SecuritySystem => 120.0,
            Feature::StepsDecks => 180.0,
        }
    }
}

/// Term discount: never increases with a longer term.
pub fn duration_factor(months: u32) -> f64 {
    match months {
        m if m >= 36 => 0.80,
        m if m >= 24 => 0.85,
        m if m >= 12 => 0.90,
        m if m >= 6 => 0.95,
        _ => 1.00,
    }
}

/// Body of `POST /quote`. Enumerations arrive as strings and are checked in [`QuoteRequest::validate`].
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequest {
    pub building_type: String,
    #[serde(default)]
    pub square_feet: Option<u32>,
    #[serde(default)]
    pub occupants: Option<u32>,
    pub rental_months: u32,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
}

/// A request whose values have all been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteInput {
    pub building_type: BuildingType,
    pub square_feet: Option<u32>,
    pub occupants: Option<u32>,
    pub rental_months: u32,
    pub region: Option<Region>,
    pub features: BTreeSet<Feature>,
    pub quantity: u32,
}

impl QuoteRequest {
    pub fn validate(&self) -> Result<QuoteInput, AppError> {
        let building_type: BuildingType = self.building_type.parse()?;
        if !(MIN_MONTHS..=MAX_MONTHS).contains(&self.rental_months) {
            return Err(AppError::BadRequest(format!(
                "rental_months must be between {} and {}",
                MIN_MONTHS, MAX_MONTHS
            )));
        }
        if let Some(sqft) = self.square_feet {
            if !(MIN_SQUARE_FEET..=MAX_SQUARE_FEET).contains(&sqft) {
                return Err(AppError::BadRequest(format!(
                    "square_feet must be between {} and {}",
                    MIN_SQUARE_FEET, MAX_SQUARE_FEET
                )));
            }
        }
        if let Some(n) = self.occupants {
            if n == 0 || n > MAX_OCCUPANTS {
                return Err(AppError::BadRequest(format!("occupants must be between 1 and {}", MAX_OCCUPANTS)));
            }
        }
        if self.square_feet.is_none() {
            match self.occupants {
                None => return Err(AppError::BadRequest("either square_feet or occupants is required".into())),
                Some(_) if building_type.sqft_per_occupant().is_none() => {
                    return Err(AppError::BadRequest(format!(
                        "square_feet is required for {} buildings",
                        building_type
                    )))
                }
                Some(_) => {}
            }
        }
        let quantity = self.quantity.unwrap_or(1);
        if quantity == 0 || quantity > MAX_QUANTITY {
            return Err(AppError::BadRequest(format!("quantity must be between 1 and {}", MAX_QUANTITY)));
        }
        let region = self.region.as_deref().map(str::parse).transpose()?;
        let features = self.features.iter().map(|f| f.parse()).collect::<Result<BTreeSet<Feature>, _>>()?;
        Ok(QuoteInput {
            building_type,
            square_feet: self.square_feet,
            occupants: self.occupants,
            rental_months: self.rental_months,
            region,
            features,
            quantity,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Monthly,
    OneTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteLine {
    pub label: String,
    pub kind: LineKind,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteEstimate {
    pub building_type: BuildingType,
    pub region: Region,
    pub recommended_square_feet: u32,
    pub quantity: u32,
    pub rental_months: u32,
    pub monthly_estimate: f64,
    pub monthly_low: f64,
    pub monthly_high: f64,
    pub delivery_installation: f64,
    pub teardown: f64,
    pub total_for_term: f64,
    pub breakdown: Vec<QuoteLine>,
    /// 0..1; higher when more of the inputs were stated rather than assumed.
    pub confidence: f64,
}

fn money(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn round_up(n: u32, step: u32) -> u32 {
    n.div_ceil(step) * step
}

/// Floor area per unit: the stated size, or occupants × per-person area rounded up to the module width.
pub fn recommended_square_feet(input: &QuoteInput) -> u32 {
    if let Some(sqft) = input.square_feet {
        return sqft;
    }
    let per_person = input.building_type.sqft_per_occupant().unwrap_or(0);
    let occupants = input.occupants.unwrap_or(0);
    let per_unit = occupants.saturating_mul(per_person).div_ceil(input.quantity.max(1));
    round_up(per_unit, SIZE_STEP).clamp(MIN_SQUARE_FEET, MAX_SQUARE_FEET)
}

fn confidence(input: &QuoteInput) -> f64 {
    let mut c: f64 = 0.40;
    if input.square_feet.is_some() {
        c += 0.30;
    } else if input.occupants.is_some() {
        c += 0.15;
    }
    if input.region.is_some() {
        c += 0.15;
    }
    if !input.features.is_empty() {
        c += 0.05;
    }
    (c.min(0.90) * 100.0).round() / 100.0
}

pub fn calculate(input: &QuoteInput) -> QuoteEstimate {
    let region = input.region.unwrap_or(Region::Midwest);
    let sqft = recommended_square_feet(input);
    let qty = f64::from(input.quantity);
    let discount = duration_factor(input.rental_months);

    let base_rent = f64::from(sqft) * input.building_type.rate_per_sqft() * region.multiplier() * discount * qty;
    let mut breakdown = vec![QuoteLine {
        label: format!("{} rent ({} sq ft × {})", input.building_type, sqft, input.quantity),
        kind: LineKind::Monthly,
        amount: money(base_rent),
    }];
    let mut monthly = base_rent;
    for f in &input.features {
        let cost = f.monthly_cost() * discount * qty;
        monthly += cost;
        breakdown.push(QuoteLine {
            label: f.as_str().to_string(),
            kind: LineKind::Monthly,
            amount: money(cost),
        });
    }

    let delivery = (DELIVERY_BASE + DELIVERY_PER_SQFT * f64::from(sqft)) * region.multiplier() * qty;
    let teardown = delivery * TEARDOWN_SHARE;
    breakdown.push(QuoteLine {
        label: "delivery_installation".into(),
        kind: LineKind::OneTime,
        amount: money(delivery),
    });
    breakdown.push(QuoteLine {
        label: "teardown".into(),
        kind: LineKind::OneTime,
        amount: money(teardown),
    });

    QuoteEstimate {
        building_type: input.building_type,
        region,
        recommended_square_feet: sqft,
        quantity: input.quantity,
        rental_months: input.rental_months,
        monthly_estimate: money(monthly),
        monthly_low: money(monthly * (1.0 - RANGE_SPREAD)),
        monthly_high: money(monthly * (1.0 + RANGE_SPREAD)),
        delivery_installation: money(delivery),
        teardown: money(teardown),
        total_for_term: money(monthly * f64::from(input.rental_months) + delivery + teardown),
        breakdown,
        confidence: confidence(input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(building: BuildingType, sqft: u32, months: u32) -> QuoteInput {
        QuoteInput {
            building_type: building,
            square_feet: Some(sqft),
            occupants: None,
            rental_months: months,
            region: Some(Region::Midwest),
            features: BTreeSet::new(),
            quantity: 1,
        }
    }

    #[test]
    fn office_baseline() {
        let q = calculate(&input(BuildingType::Office, 1000, 3));
        // 1000 × 1.10 × 1.0 × 1.0
        assert_eq!(q.monthly_estimate, 1100.0);
        assert_eq!(q.monthly_low, 968.0);
        assert_eq!(q.monthly_high, 1232.0);
        // 2500 + 750
        assert_eq!(q.delivery_installation, 3250.0);
        assert_eq!(q.teardown, 1950.0);
        assert_eq!(q.total_for_term, 1100.0 * 3.0 + 3250.0 + 1950.0);
    }

    #[test]
    fn longer_terms_never_raise_the_monthly_rate() {
        for building in BuildingType::ALL {
            let mut prev = f64::MAX;
            for months in MIN_MONTHS..=MAX_MONTHS {
                let q = calculate(&input(*building, 720, months));
                assert!(q.monthly_estimate <= prev, "{building} at {months} months");
                prev = q.monthly_estimate;
            }
        }
    }

    #[test]
    fn more_features_never_lower_the_monthly_rate() {
        let mut i = input(BuildingType::Classroom, 960, 12);
        let mut prev = calculate(&i).monthly_estimate;
        for f in Feature::ALL {
            i.features.insert(*f);
            let next = calculate(&i).monthly_estimate;
            assert!(next > prev, "adding {f}");
            prev = next;
        }
    }

    #[test]
    fn region_and_quantity_scale() {
        let mut i = input(BuildingType::Storage, 320, 1);
        let midwest = calculate(&i).monthly_estimate;
        i.region = Some(Region::West);
        assert!(calculate(&i).monthly_estimate > midwest);
        i.region = Some(Region::Midwest);
        i.quantity = 3;
        assert_eq!(calculate(&i).monthly_estimate, money(midwest * 3.0));
    }

    #[test]
    fn occupants_size_the_building() {
        let req = QuoteRequest {
            building_type: "classroom".into(),
            square_feet: None,
            occupants: Some(30),
            rental_months: 9,
            region: None,
            features: vec!["hvac".into(), "HVAC".into()],
            quantity: None,
        };
        let i = req.validate().unwrap();
        assert_eq!(i.features.len(), 1);
        // 30 × 35 = 1050 -> 1100
        assert_eq!(recommended_square_feet(&i), 1100);
        let q = calculate(&i);
        assert_eq!(q.region, Region::Midwest);
        assert!(q.confidence < calculate(&input(BuildingType::Classroom, 1100, 9)).confidence);
    }

    #[test]
    fn invalid_requests_are_bad_requests() {
        let base = QuoteRequest {
            building_type: "office".into(),
            square_feet: Some(500),
            occupants: None,
            rental_months: 6,
            region: Some("northeast".into()),
            features: Vec::new(),
            quantity: None,
        };
        assert!(base.validate().is_ok());

        let cases = [
            QuoteRequest { building_type: "castle".into(), ..base.clone() },
            QuoteRequest { rental_months: 0, ..base.clone() },
            QuoteRequest { rental_months: 121, ..base.clone() },
            QuoteRequest { square_feet: Some(10), ..base.clone() },
            QuoteRequest { square_feet: None, ..base.clone() },
            QuoteRequest { region: Some("mars".into()), ..base.clone() },
            QuoteRequest { features: vec!["moat".into()], ..base.clone() },
            QuoteRequest { quantity: Some(51), ..base.clone() },
            QuoteRequest { building_type: "storage".into(), square_feet: None, occupants: Some(4), ..base.clone() },
        ];
        for req in cases {
            assert!(matches!(req.validate(), Err(AppError::BadRequest(_))), "{req:?}");
        }
    }

    #[test]
    fn confidence_stays_in_unit_interval() {
        let mut i = input(BuildingType::Medical, 2000, 24);
        i.features.insert(Feature::Hvac);
        let c = calculate(&i).confidence;
        assert!((0.0..=1.0).contains(&c));
        assert_eq!(c, 0.90);
    }
}
