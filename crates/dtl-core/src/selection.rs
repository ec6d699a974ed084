//! Multi-publisher selection arithmetic shared by the File and Staging
//! engines.
//!
//! A subscriber's effective spatial selection is intersected against every
//! publisher's known local slab; each non-empty intersection becomes one
//! transfer. This is independent of the transport: both engines ask "how
//! many bytes, from which publishers" the same way, then move those bytes
//! through whichever substrate they own.

use std::collections::BTreeMap;

use crate::model::{variable::checked_byte_size, ReductionMethod, Variable};
use crate::errors::DtlError;

/// One non-empty intersection between a subscriber's selection and a
/// publisher's slab: the owning publisher and the byte count to transfer
/// for a single transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub publisher: String,
    pub bytes: u64,
}

fn intersect_1d(a_start: u64, a_count: u64, b_start: u64, b_count: u64) -> Option<u64> {
    let a_end = a_start + a_count;
    let b_end = b_start + b_count;
    let lo = a_start.max(b_start);
    let hi = a_end.min(b_end);
    if hi > lo {
        Some(hi - lo)
    } else {
        None
    }
}

/// Intersects `(start, count)` with every publisher's slab in
/// `publisher_regions`, returning the non-empty intersections' element
/// counts keyed by publisher id, in the map's iteration order.
fn intersecting_element_counts(start: &[u64], count: &[u64], publisher_regions: &BTreeMap<String, (Vec<u64>, Vec<u64>)>) -> Vec<(String, u64)> {
    let mut out = Vec::new();
    for (publisher, (p_start, p_count)) in publisher_regions {
        let ndims = start.len();
        if p_start.len() != ndims || p_count.len() != ndims {
            continue;
        }
        let mut elements: u64 = 1;
        let mut any_dim = false;
        let mut empty = false;
        for i in 0..ndims {
            match intersect_1d(start[i], count[i], p_start[i], p_count[i]) {
                Some(overlap) => {
                    elements = elements.saturating_mul(overlap);
                    any_dim = true;
                }
                None => {
                    empty = true;
                    break;
                }
            }
        }
        if ndims == 0 {
            // Scalar variable: a single publisher "owns" the whole value.
            out.push((publisher.clone(), 1));
            continue;
        }
        if !empty && any_dim && elements > 0 {
            out.push((publisher.clone(), elements));
        }
    }
    out
}

/// Computes the per-publisher transfers for one transaction of `var`,
/// applying the variable's reduction ratio (if any) uniformly to the
/// geometric intersection. `publisher_regions` are the publishers'
/// original (pre-reduction) local slabs as recorded by the metadata store.
pub fn transfers_for_variable(var: &Variable, publisher_regions: &BTreeMap<String, (Vec<u64>, Vec<u64>)>) -> Result<Vec<Transfer>, DtlError> {
    let (start, count) = var.effective_region();
    let raw_elements = intersecting_element_counts(&start, &count, publisher_regions);

    let reduction_ratio = if var.is_reduced() {
        let raw = var.global_size()?;
        let reduced = ReductionMethod::reduced_global_size(var)?;
        if raw == 0 {
            1.0
        } else {
            reduced as f64 / raw as f64
        }
    } else {
        1.0
    };

    let mut transfers = Vec::with_capacity(raw_elements.len());
    for (publisher, elements) in raw_elements {
        let raw_bytes = checked_byte_size(var.element_size, &[elements])?;
        let bytes = ((raw_bytes as f64) * reduction_ratio).ceil() as u64;
        transfers.push(Transfer { publisher, bytes });
    }
    Ok(transfers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(start: &[u64], count: &[u64]) -> (Vec<u64>, Vec<u64>) {
        (start.to_vec(), count.to_vec())
    }

    #[test]
    fn single_publisher_whole_overlap() {
        let mut regions = BTreeMap::new();
        regions.insert("p0".to_string(), region(&[0, 0], &[20000, 20000]));
        let var = Variable::new_ndim("var", vec![20000, 20000], vec![0, 0], vec![20000, 20000], 8).unwrap();
        let transfers = transfers_for_variable(&var, &regions).unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].bytes, 8 * 20000 * 20000);
    }

    #[test]
    fn two_publishers_split_along_second_dim() {
        let mut regions = BTreeMap::new();
        regions.insert("p0".to_string(), region(&[0, 0], &[20000, 10000]));
        regions.insert("p1".to_string(), region(&[0, 10000], &[20000, 10000]));
        let var = Variable::new_ndim("var", vec![20000, 20000], vec![0, 0], vec![20000, 20000], 8).unwrap();
        let transfers = transfers_for_variable(&var, &regions).unwrap();
        let total: u64 = transfers.iter().map(|t| t.bytes).sum();
        assert_eq!(transfers.len(), 2);
        assert_eq!(total, 8 * 20000 * 20000);
    }

    #[test]
    fn partial_selection_only_intersects_owning_publisher() {
        let mut regions = BTreeMap::new();
        regions.insert("p0".to_string(), region(&[0, 0], &[20000, 20000]));
        let mut var = Variable::new_ndim("var", vec![20000, 20000], vec![0, 0], vec![20000, 20000], 8).unwrap();
        var.set_selection(vec![10000, 0], vec![10000, 20000]).unwrap();
        let transfers = transfers_for_variable(&var, &regions).unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].bytes, 8 * 10000 * 20000);
    }
}
