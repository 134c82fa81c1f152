//! Reference data shared by all users: species, box models and food types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Species {
    pub id: String,
    pub common_name: String,
    pub scientific_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxType {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodType {
    pub id: String,
    pub name: String,
}

/// Catalog used when the backend is unreachable or has no rows yet.
pub fn builtin_species() -> Vec<Species> {
    [
        ("apis_mellifera", "Western honey bee", Some("Apis mellifera")),
        ("jatai", "Jataí", Some("Tetragonisca angustula")),
        ("mandacaia", "Mandaçaia", Some("Melipona quadrifasciata")),
        ("urucu", "Uruçu", Some("Melipona scutellaris")),
        ("mirim", "Mirim", Some("Plebeia droryana")),
    ]
    .into_iter()
    .map(|(id, common_name, scientific_name)| Species {
        id: id.to_string(),
        common_name: common_name.to_string(),
        scientific_name: scientific_name.map(str::to_string),
    })
    .collect()
}

pub fn builtin_box_types() -> Vec<BoxType> {
    [
        ("langstroth", "Langstroth"),
        ("inpa", "INPA"),
        ("af", "AF (Fernando Oliveira)"),
        ("log", "Natural log"),
    ]
    .into_iter()
    .map(|(id, name)| BoxType {
        id: id.to_string(),
        name: name.to_string(),
    })
    .collect()
}

pub fn builtin_food_types() -> Vec<FoodType> {
    [
        ("sugar_syrup", "Sugar syrup"),
        ("honey", "Honey"),
        ("pollen_substitute", "Pollen substitute"),
        ("water", "Water"),
    ]
    .into_iter()
    .map(|(id, name)| FoodType {
        id: id.to_string(),
        name: name.to_string(),
    })
    .collect()
}
