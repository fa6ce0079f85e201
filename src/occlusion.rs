// occlusion.rs — Combining per-view costs into one cost per pixel and plane.
//
// Only views whose centre sample is valid at a pixel take part. With no
// participating view the pixel/plane is unmatched and gets UNMATCHED_COST,
// which is larger than any real SAD or ZNCC value so it never wins the
// best-plane search against a matched plane.

use crate::config::{OcclusionMode, MAX_BEST_K};

/// Aggregated cost of a pixel/plane no source view could see.
pub const UNMATCHED_COST: f32 = 1e30;

/// Position of a source view relative to the reference in upload order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewSide {
    Before,
    After,
}

impl ViewSide {
    /// `index` is the view's position in upload order, `reference` the
    /// reference frame's.
    pub fn of(index: usize, reference: usize) -> Self {
        if index < reference {
            ViewSide::Before
        } else {
            ViewSide::After
        }
    }
}

/// Cost of one contributing source view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewCost {
    pub cost: f32,
    pub side: ViewSide,
}

/// Occlusion policy with its parameter resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregator {
    Mean,
    RefSplit,
    BestK(usize),
}

impl Aggregator {
    pub fn new(mode: OcclusionMode, best_k: usize) -> Self {
        match mode {
            OcclusionMode::None => Aggregator::Mean,
            OcclusionMode::RefSplit => Aggregator::RefSplit,
            OcclusionMode::BestK => Aggregator::BestK(best_k.clamp(1, MAX_BEST_K)),
        }
    }

    /// Aggregate the contributing views. `samples` may be reordered.
    pub fn aggregate(&self, samples: &mut [ViewCost]) -> f32 {
        if samples.is_empty() {
            return UNMATCHED_COST;
        }
        match *self {
            Aggregator::Mean => mean(samples.iter().map(|s| s.cost)),
            Aggregator::RefSplit => {
                let before = mean(samples.iter().filter(|s| s.side == ViewSide::Before).map(|s| s.cost));
                let after = mean(samples.iter().filter(|s| s.side == ViewSide::After).map(|s| s.cost));
                before.min(after)
            }
            Aggregator::BestK(k) => {
                samples.sort_by(|a, b| a.cost.total_cmp(&b.cost));
                let k = k.min(samples.len());
                mean(samples[..k].iter().map(|s| s.cost))
            }
        }
    }
}

/// Mean of `costs`; UNMATCHED_COST when empty.
fn mean(costs: impl Iterator<Item = f32>) -> f32 {
    let (sum, n) = costs.fold((0.0f32, 0u32), |(s, n), c| (s + c, n + 1));
    if n == 0 {
        UNMATCHED_COST
    } else {
        sum / n as f32
    }
}
