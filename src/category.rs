use serde::{Deserialize, Serialize};

/// The seventeen wallpaper groups a pattern can be classified into.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Category {
    P1,
    P2,
    Pm,
    Pg,
    Cm,
    Pmm,
    Pmg,
    Pgg,
    Cmm,
    P4,
    P4m,
    P4g,
    P3,
    P3m1,
    P31m,
    P6,
    P6m,
}

impl Category {
    pub const ALL: [Category; 17] = [
        Category::P1,
        Category::P2,
        Category::Pm,
        Category::Pg,
        Category::Cm,
        Category::Pmm,
        Category::Pmg,
        Category::Pgg,
        Category::Cmm,
        Category::P4,
        Category::P4m,
        Category::P4g,
        Category::P3,
        Category::P3m1,
        Category::P31m,
        Category::P6,
        Category::P6m,
    ];

    /// Parse a user supplied label. Case and whitespace are ignored, so
    /// `" P3 m1"` and `"p3m1"` name the same group.
    pub fn parse(label: &str) -> Option<Category> {
        let normalized = normalize_label(label);
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.to_string() == normalized)
    }

    /// Highest rotation order present in the group.
    pub fn rotation_order(&self) -> u8 {
        match self {
            Category::P1 | Category::Pm | Category::Pg | Category::Cm => 1,
            Category::P2 | Category::Pmm | Category::Pmg | Category::Pgg | Category::Cmm => 2,
            Category::P3 | Category::P3m1 | Category::P31m => 3,
            Category::P4 | Category::P4m | Category::P4g => 4,
            Category::P6 | Category::P6m => 6,
        }
    }

    pub fn has_mirrors(&self) -> bool {
        matches!(
            self,
            Category::Pm
                | Category::Cm
                | Category::Pmm
                | Category::Pmg
                | Category::Cmm
                | Category::P4m
                | Category::P4g
                | Category::P3m1
                | Category::P31m
                | Category::P6m
        )
    }

    /// Glide reflections whose axis is not itself a mirror line.
    pub fn has_glides(&self) -> bool {
        matches!(
            self,
            Category::Pg
                | Category::Cm
                | Category::Pmg
                | Category::Pgg
                | Category::Cmm
                | Category::P4m
                | Category::P4g
                | Category::P3m1
                | Category::P31m
                | Category::P6m
        )
    }
}

pub fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}
