//! Boundary actions applied to mapped values at the destination range.

use sm_core::BoundaryAction;

/// Apply boundary actions element-wise. Returns `None` if any element hits a
/// `Mute` boundary, in which case nothing should be sent.
///
/// `min`/`max` broadcast when they hold a single element. A reversed range
/// (`min > max`) swaps both the bounds and their actions.
pub fn apply(
    values: &[f64],
    min: &[f64],
    max: &[f64],
    bound_min: BoundaryAction,
    bound_max: BoundaryAction,
) -> Option<Vec<f64>> {
    let mut out = Vec::with_capacity(values.len());
    for (i, &v) in values.iter().enumerate() {
        match (element(min, i), element(max, i)) {
            (Some(lo), Some(hi)) => out.push(apply_one(v, lo, hi, bound_min, bound_max)?),
            _ => out.push(v),
        }
    }
    Some(out)
}

fn element(bounds: &[f64], i: usize) -> Option<f64> {
    match bounds.len() {
        0 => None,
        1 => Some(bounds[0]),
        _ => bounds.get(i).copied(),
    }
}

/// Boundary handling for one element; `None` means muted.
pub fn apply_one(
    v: f64,
    min: f64,
    max: f64,
    bound_min: BoundaryAction,
    bound_max: BoundaryAction,
) -> Option<f64> {
    let (lo, hi, act_lo, act_hi) = if min <= max {
        (min, max, bound_min, bound_max)
    } else {
        (max, min, bound_max, bound_min)
    };
    let width = hi - lo;

    if v < lo {
        match act_lo {
            BoundaryAction::None => Some(v),
            BoundaryAction::Mute => None,
            BoundaryAction::Clamp => Some(lo),
            BoundaryAction::Wrap => Some(hi - excess(lo - v, width)),
            BoundaryAction::Fold => {
                let folded = lo + (lo - v);
                if folded > hi {
                    beyond_after_fold(folded, lo, hi, act_hi, true)
                } else {
                    Some(folded)
                }
            }
        }
    } else if v > hi {
        match act_hi {
            BoundaryAction::None => Some(v),
            BoundaryAction::Mute => None,
            BoundaryAction::Clamp => Some(hi),
            BoundaryAction::Wrap => Some(lo + excess(v - hi, width)),
            BoundaryAction::Fold => {
                let folded = hi - (v - hi);
                if folded < lo {
                    beyond_after_fold(folded, lo, hi, act_lo, false)
                } else {
                    Some(folded)
                }
            }
        }
    } else {
        Some(v)
    }
}

/// A fold from one side overshot the other side; that side's action decides.
fn beyond_after_fold(
    v: f64,
    lo: f64,
    hi: f64,
    action: BoundaryAction,
    past_hi: bool,
) -> Option<f64> {
    let width = hi - lo;
    let over = if past_hi { v - hi } else { lo - v };
    match action {
        BoundaryAction::None => Some(v),
        BoundaryAction::Mute => None,
        BoundaryAction::Clamp => Some(if past_hi { hi } else { lo }),
        BoundaryAction::Wrap => Some(if past_hi {
            lo + excess(over, width)
        } else {
            hi - excess(over, width)
        }),
        BoundaryAction::Fold => {
            // Both sides fold: bounce between the bounds.
            if width <= 0.0 {
                return Some(lo);
            }
            let bounces = (over / width).floor();
            let rest = over - bounces * width;
            let even = (bounces as i64) % 2 == 0;
            Some(match (past_hi, even) {
                (true, true) => hi - rest,
                (true, false) => lo + rest,
                (false, true) => lo + rest,
                (false, false) => hi - rest,
            })
        }
    }
}

/// Distance past a bound reduced modulo the range width.
fn excess(distance: f64, width: f64) -> f64 {
    if width <= 0.0 {
        return 0.0;
    }
    distance % width
}
