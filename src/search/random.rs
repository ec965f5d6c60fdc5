//! Uniformly random core selection; the baseline every other search
//! should beat.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::{AccessionTable, Partition};
use crate::measures::PseudoMeasure;
use crate::search::SearchConfig;

pub(crate) fn run(
    table: &Arc<AccessionTable>,
    pm: &Arc<PseudoMeasure>,
    config: &SearchConfig,
) -> (Vec<usize>, f64) {
    let mut rng = StdRng::seed_from_u64(config.resolved_seed());
    let size = rng.random_range(config.min_size..=config.max_size);
    let part = Partition::random(table.len(), size, &mut rng);
    let score = pm.calculate(part.core(), table, None);
    (part.core().to_vec(), score)
}
