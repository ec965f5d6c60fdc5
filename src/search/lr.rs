//! Deterministic (l,r) selection: add the `l` best accessions, then drop
//! the `r` worst, per round. With `l > r` the core grows from a seed pair;
//! with `r > l` it shrinks from the full collection. Runs to completion,
//! no time limit applies.

use std::sync::Arc;

use crate::data::AccessionTable;
use crate::error::CoreHunterError;
use crate::measures::PseudoMeasure;
use crate::replica::{LrState, Replica, Strategy};
use crate::search::SearchConfig;

pub(crate) fn run(
    table: &Arc<AccessionTable>,
    pm: &Arc<PseudoMeasure>,
    config: &SearchConfig,
    l: usize,
    r: usize,
    exhaustive_seed: bool,
) -> Result<(Vec<usize>, f64), CoreHunterError> {
    if l == r {
        return Err(CoreHunterError::InvalidConfig(format!(
            "lr search requires l != r, got l = {l}, r = {r}"
        )));
    }
    let mut rep = Replica::new(
        Strategy::Lr(LrState::new(l, r, exhaustive_seed)),
        None,
        Arc::clone(table),
        Arc::clone(pm),
        config.min_size,
        config.max_size,
        None,
        None,
        config.resolved_seed(),
    );
    rep.init_random();
    rep.do_steps();
    Ok((rep.best_core().to_vec(), rep.best_score()))
}
