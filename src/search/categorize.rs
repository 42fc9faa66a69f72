// src/search/categorize.rs
use super::Paper;
use serde::Serialize;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PropertyCategory {
    Mechanical,
    Thermal,
    Electrical,
    Optical,
    Magnetic,
    Chemical,
    Structural,
    General,
}

static RULES: &[(PropertyCategory, &[&str])] = &[
    (
        PropertyCategory::Mechanical,
        &[
            "tensile", "strength", "hardness", "young's modulus", "elastic modulus",
            "ductility", "fracture", "fatigue", "toughness", "creep",
        ],
    ),
    (
        PropertyCategory::Thermal,
        &[
            "thermal", "heat capacity", "melting point", "specific heat",
            "thermoelectric", "phonon",
        ],
    ),
    (
        PropertyCategory::Electrical,
        &[
            "electrical conductivity", "resistivity", "dielectric", "semiconductor",
            "band gap", "bandgap", "superconduct", "carrier mobility", "electrode",
        ],
    ),
    (
        PropertyCategory::Optical,
        &[
            "optical", "refractive", "photoluminescence", "absorbance", "transparent",
            "photonic", "emission spectrum",
        ],
    ),
    (
        PropertyCategory::Magnetic,
        &["magnetic", "ferromagnet", "antiferromagnet", "coercivity", "magnetization", "spin"],
    ),
    (
        PropertyCategory::Chemical,
        &[
            "corrosion", "catalys", "catalytic", "oxidation", "reactivity",
            "solubility", "electrochemical",
        ],
    ),
    (
        PropertyCategory::Structural,
        &[
            "crystal structure", "lattice", "microstructure", "phase transition",
            "grain boundar", "x-ray diffraction", "polymorph",
        ],
    ),
];

/// Property categories a paper talks about, judged by keyword rules over its
/// title and abstract. Papers matching no rule are `General`.
pub fn categorize(paper: &Paper) -> Vec<PropertyCategory> {
    let mut text = paper.title.to_lowercase();
    if let Some(abstract_text) = &paper.abstract_text {
        text.push(' ');
        text.push_str(&abstract_text.to_lowercase());
    }

    let categories: Vec<PropertyCategory> = RULES
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(category, _)| *category)
        .collect();

    if categories.is_empty() {
        vec![PropertyCategory::General]
    } else {
        categories
    }
}
