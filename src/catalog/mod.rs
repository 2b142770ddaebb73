use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};

use crate::category::Category;

static CATALOG_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/catalog");

/// Thresholds a run summary must clear to unlock the next level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    pub min_accuracy: f64,
    pub max_median_item_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub id: String,
    pub label: String,
    pub categories: Vec<Category>,
    pub pool_size: usize,
    pub run_duration_secs: f64,
    pub gate: Gate,
}

impl Level {
    pub fn allows(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }
}

/// A single classification challenge. `hints` holds the overlay payload for
/// each hint tier in order; a missing entry simply renders nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub truth: Category,
    pub content: String,
    #[serde(default)]
    pub hints: Vec<String>,
}

impl Item {
    pub fn hint_payload(&self, order: u8) -> Option<&str> {
        let idx = usize::from(order).checked_sub(1)?;
        self.hints.get(idx).map(String::as_str)
    }
}

#[derive(Deserialize)]
struct LevelsFile {
    levels: Vec<Level>,
}

#[derive(Deserialize)]
struct ItemsFile {
    items: Vec<Item>,
}

/// Levels in unlock order plus the bank of items they draw from.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    levels: Vec<Level>,
    items: Vec<Item>,
}

impl Catalog {
    pub fn new(levels: Vec<Level>, items: Vec<Item>) -> Self {
        Self { levels, items }
    }

    /// The catalog shipped inside the binary.
    pub fn embedded() -> Result<Self, serde_json::Error> {
        Self::from_json(
            embedded_file("levels.json"),
            embedded_file("items.json"),
        )
    }

    pub fn from_json(levels_json: &str, items_json: &str) -> Result<Self, serde_json::Error> {
        let levels: LevelsFile = serde_json::from_str(levels_json)?;
        let items: ItemsFile = serde_json::from_str(items_json)?;
        Ok(Self::new(levels.levels, items.items))
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn level(&self, id: &str) -> Option<&Level> {
        self.levels.iter().find(|l| l.id == id)
    }

    pub fn first_level(&self) -> Option<&Level> {
        self.levels.first()
    }

    /// The level after `id` in catalog order.
    pub fn next_level(&self, id: &str) -> Option<&Level> {
        let pos = self.levels.iter().position(|l| l.id == id)?;
        self.levels.get(pos + 1)
    }

    /// Items from the bank whose truth is one of the level's categories.
    pub fn items_for_level<'a>(&'a self, level: &'a Level) -> impl Iterator<Item = &'a Item> + 'a {
        self.items.iter().filter(move |item| level.allows(item.truth))
    }
}

fn embedded_file(name: &str) -> &'static str {
    CATALOG_DIR
        .get_file(name)
        .and_then(|f| f.contents_utf8())
        .unwrap_or_default()
}
