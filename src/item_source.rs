use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::catalog::{Catalog, Item, Level};
use crate::category::Category;
use crate::progress::Progress;

/// Strategy for choosing the items of a run.
pub trait ItemSource {
    /// Items for one run of `level`, in presentation order. The engine uses
    /// at most `level.pool_size` of them.
    fn select_items(
        &self,
        level: &Level,
        catalog: &Catalog,
        progress: &Progress,
        rng: &mut StdRng,
    ) -> Vec<Item>;
}

/// Uniform sample from the catalog bank.
#[derive(Debug, Clone, Copy, Default)]
pub struct BankSource;

impl ItemSource for BankSource {
    fn select_items(
        &self,
        level: &Level,
        catalog: &Catalog,
        _progress: &Progress,
        rng: &mut StdRng,
    ) -> Vec<Item> {
        let candidates = catalog.items_for_level(level).collect::<Vec<&Item>>();
        candidates
            .choose_multiple(rng, level.pool_size)
            .map(|item| (*item).clone())
            .collect()
    }
}

/// Sample that leans towards the learner's weak spots: groups that are often
/// mistaken for others, and groups carrying the symmetry features whose hints
/// get opened most.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeaknessSource;

impl ItemSource for WeaknessSource {
    fn select_items(
        &self,
        level: &Level,
        catalog: &Catalog,
        progress: &Progress,
        rng: &mut StdRng,
    ) -> Vec<Item> {
        if progress.confusion_matrix.is_empty() && progress.feature_weakness == Default::default() {
            // Fall back to random selection if no statistics available
            return BankSource.select_items(level, catalog, progress, rng);
        }

        let candidates = catalog.items_for_level(level).collect::<Vec<&Item>>();
        let chosen = candidates.choose_multiple_weighted(rng, level.pool_size, |item| {
            category_weight(item.truth, progress)
        });

        match chosen {
            Ok(iter) => {
                let mut items = iter.map(|item| (*item).clone()).collect::<Vec<Item>>();
                items.shuffle(rng);
                items
            }
            Err(e) => {
                debug!(
                    error = %e,
                    level = %level.id,
                    "weighted selection failed, sampling uniformly"
                );
                BankSource.select_items(level, catalog, progress, rng)
            }
        }
    }
}

/// Selection weight for one category. Every category keeps a base weight of
/// one so nothing drops out of rotation entirely.
pub fn category_weight(category: Category, progress: &Progress) -> f64 {
    let confusion = f64::from(progress.confusion_count(category)) * 2.0;
    let weakness = progress.feature_weakness;
    let mut feature = 0.0;
    if category.rotation_order() > 1 {
        feature += f64::from(weakness.rotations);
    }
    if category.has_mirrors() {
        feature += f64::from(weakness.mirrors);
    }
    if category.has_glides() {
        feature += f64::from(weakness.glides);
    }
    1.0 + confusion + feature * 0.25
}

/// Synthesizes fresh items instead of drawing from the bank. Content and
/// overlay references carry the category and a seed for the renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneratedSource;

impl ItemSource for GeneratedSource {
    fn select_items(
        &self,
        level: &Level,
        _catalog: &Catalog,
        _progress: &Progress,
        rng: &mut StdRng,
    ) -> Vec<Item> {
        (0..level.pool_size)
            .filter_map(|_| {
                let truth = *level.categories.choose(rng)?;
                let seed: u32 = rng.gen();
                let content = format!("gen:{truth}:{seed:08x}");
                Some(Item {
                    id: format!("gen-{truth}-{seed:08x}"),
                    truth,
                    hints: ["rotations", "mirrors", "glides", "answer"]
                        .iter()
                        .map(|layer| format!("{content}:{layer}"))
                        .collect(),
                    content,
                })
            })
            .collect()
    }
}
