//! Amplifier-chain conversion from integrated mV·ns to photo-electrons.

use crate::common::constants::{ELECTRON_CHARGE, MV_TO_V, NS_TO_S};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Named amplifier configurations deployed on the polychromator racks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GainFamily {
    /// Equatorial polychromators: signal split ("magic" factor) and divided before the output stage.
    Equator,
    #[serde(rename = "t15-34")]
    T15_34,
    #[serde(rename = "t15-35")]
    T15_35,
}

impl GainFamily {
    pub const ALL: [GainFamily; 3] = [Self::Equator, Self::T15_34, Self::T15_35];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equator => "equator",
            Self::T15_34 => "t15-34",
            Self::T15_35 => "t15-35",
        }
    }

    pub const fn constants(self) -> GainConstants {
        match self {
            Self::Equator => GainConstants {
                magic: 2.43,
                divider: 0.5,
                ..GainConstants::BASE
            },
            Self::T15_34 => GainConstants::BASE,
            Self::T15_35 => GainConstants {
                transimpedance: 5.0e3,
                ..GainConstants::BASE
            },
        }
    }

    pub fn model(self) -> GainModel {
        GainModel::new(self.constants())
    }
}

impl Display for GainFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct GainConstants {
    pub electron_charge: f64,
    /// APD multiplication factor.
    pub multiplication: f64,
    /// Transimpedance, ohm.
    pub transimpedance: f64,
    pub magic: f64,
    pub divider: f64,
    pub output_gain: f64,
    pub mv_to_v: f64,
    pub ns_to_s: f64,
}

impl GainConstants {
    /// Chain without splitter or divider; `magic` and `divider` are neutral.
    pub const BASE: GainConstants = GainConstants {
        electron_charge: ELECTRON_CHARGE,
        multiplication: 1.0e2,
        transimpedance: 1.0e4,
        magic: 1.0,
        divider: 1.0,
        output_gain: 10.0,
        mv_to_v: MV_TO_V,
        ns_to_s: NS_TO_S,
    };

    pub fn full_gain(&self) -> f64 {
        self.electron_charge
            * self.multiplication
            * self.transimpedance
            * self.magic
            * self.divider
            * self.output_gain
    }

    pub fn converter(&self) -> f64 {
        self.mv_to_v * self.ns_to_s
    }
}

/// Immutable gain model; the multiplier is fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainModel {
    constants: GainConstants,
    multiplier: f64,
}

impl GainModel {
    pub fn new(constants: GainConstants) -> Self {
        Self {
            multiplier: constants.converter() / constants.full_gain(),
            constants,
        }
    }

    pub fn constants(&self) -> &GainConstants {
        &self.constants
    }

    /// Photo-electrons per mV·ns of integrated signal.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::{GainConstants, GainFamily, GainModel};

    #[test]
    fn every_named_family_has_a_positive_multiplier() {
        for family in GainFamily::ALL {
            let multiplier = family.model().multiplier();
            assert!(multiplier.is_finite(), "{family} multiplier is not finite");
            assert!(multiplier > 0.0, "{family} multiplier is not positive");
        }
    }

    #[test]
    fn family_multipliers_match_the_chain_formula() {
        let t15_34 = GainFamily::T15_34.model().multiplier();
        assert!((t15_34 - 1.0e-12 / (1.6e-19 * 1.0e2 * 1.0e4 * 10.0)).abs() < 1.0e-9);

        let equator = GainFamily::Equator.model().multiplier();
        assert!((equator - t15_34 / (2.43 * 0.5)).abs() < 1.0e-9);

        let t15_35 = GainFamily::T15_35.model().multiplier();
        assert!((t15_35 - 2.0 * t15_34).abs() < 1.0e-9);
    }

    #[test]
    fn custom_constants_use_the_same_formula() {
        let model = GainModel::new(GainConstants {
            electron_charge: 0.5,
            multiplication: 1.0,
            transimpedance: 1.0,
            magic: 1.0,
            divider: 1.0,
            output_gain: 1.0,
            mv_to_v: 1.0,
            ns_to_s: 1.0,
        });
        assert_eq!(model.multiplier(), 2.0);
        assert_eq!(model.constants().full_gain(), 0.5);
    }

    #[test]
    fn families_deserialize_from_kebab_case_names() {
        let families: Vec<GainFamily> =
            serde_json::from_str(r#"["equator", "t15-34", "t15-35"]"#).expect("families");
        assert_eq!(families, GainFamily::ALL.to_vec());
    }
}
