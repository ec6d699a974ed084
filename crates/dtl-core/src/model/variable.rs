//! Typed N-dimensional array descriptor.
//!
//! A `Variable` couples a global `shape` with one actor's local `(start,
//! count)` slab inside it. Multiple actors co-defining the same name
//! partition the global shape between them; this struct only carries the
//! calling actor's own view, never the whole distributed picture.

use serde::{Deserialize, Serialize};

use crate::errors::DtlError;
use crate::model::reduction::{AttachedReduction, ReductionKind};

/// Selects one or a contiguous span of historical transactions for `get`.
/// Defaults to `Latest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionSelection {
    Latest,
    Single(u64),
    Range { first: u64, span: u64 },
}

impl Default for TransactionSelection {
    fn default() -> Self {
        TransactionSelection::Latest
    }
}

impl TransactionSelection {
    /// Number of transactions this selection spans, given the number
    /// currently committed. `Latest` always resolves to exactly one.
    pub fn count(&self) -> u64 {
        match self {
            TransactionSelection::Latest => 1,
            TransactionSelection::Single(_) => 1,
            TransactionSelection::Range { span, .. } => *span,
        }
    }
}

/// Checked `Π dims`, scaled by `element_size`. Returns `Overflow` rather
/// than silently wrapping.
pub fn checked_byte_size(element_size: u64, dims: &[u64]) -> Result<u64, DtlError> {
    let mut total: u64 = element_size;
    for &d in dims {
        total = total.checked_mul(d).ok_or(DtlError::Overflow)?;
    }
    Ok(total)
}

fn is_wrapped_negative(v: u64) -> bool {
    v == u64::MAX
}

/// Validates a candidate (shape, start, count, element_size) tuple's
/// structural invariants. Does not check redefinition identity (that's
/// the Stream's job, since it needs to compare against an existing
/// Variable).
pub fn validate_definition(shape: &[u64], start: &[u64], count: &[u64], element_size: u64) -> Result<(), DtlError> {
    if shape.len() != start.len() || shape.len() != count.len() {
        return Err(DtlError::InconsistentVariableDefinition(format!(
            "dimensionality mismatch: shape={}, start={}, count={}",
            shape.len(),
            start.len(),
            count.len()
        )));
    }
    if element_size == 0 || is_wrapped_negative(element_size) {
        return Err(DtlError::InconsistentVariableDefinition("element_size must be >= 1".into()));
    }
    for i in 0..shape.len() {
        if shape[i] == 0 || count[i] == 0 {
            return Err(DtlError::InconsistentVariableDefinition(format!("dimension {i}: shape/count must be >= 1")));
        }
        if is_wrapped_negative(shape[i]) || is_wrapped_negative(start[i]) || is_wrapped_negative(count[i]) {
            return Err(DtlError::InconsistentVariableDefinition(format!("dimension {i}: negative value")));
        }
        let end = start[i].checked_add(count[i]).ok_or(DtlError::Overflow)?;
        if end > shape[i] {
            return Err(DtlError::InconsistentVariableDefinition(format!(
                "dimension {i}: start+count ({end}) exceeds shape ({})",
                shape[i]
            )));
        }
    }
    Ok(())
}

/// A Variable as seen by one connected actor: its identity (name, shape,
/// element_size, shared across actors), its own local region, and any
/// reduction/selection it has attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub shape: Vec<u64>,
    pub start: Vec<u64>,
    pub count: Vec<u64>,
    pub element_size: u64,
    /// Subscriber-side spatial selection, substituting `(start, count)`
    /// for `get`. Absent means "use the full global shape".
    pub selection: Option<(Vec<u64>, Vec<u64>)>,
    pub transaction_selection: TransactionSelection,
    pub reduction: Option<AttachedReduction>,
}

impl Variable {
    pub fn new_ndim(name: impl Into<String>, shape: Vec<u64>, start: Vec<u64>, count: Vec<u64>, element_size: u64) -> Result<Self, DtlError> {
        validate_definition(&shape, &start, &count, element_size)?;
        Ok(Self {
            name: name.into(),
            shape,
            start,
            count,
            element_size,
            selection: None,
            transaction_selection: TransactionSelection::default(),
            reduction: None,
        })
    }

    pub fn new_scalar(name: impl Into<String>, element_size: u64) -> Result<Self, DtlError> {
        if element_size == 0 || is_wrapped_negative(element_size) {
            return Err(DtlError::InconsistentVariableDefinition("element_size must be >= 1".into()));
        }
        Ok(Self {
            name: name.into(),
            shape: Vec::new(),
            start: Vec::new(),
            count: Vec::new(),
            element_size,
            selection: None,
            transaction_selection: TransactionSelection::default(),
            reduction: None,
        })
    }

    /// Whether `other_shape`/`other_element_size` would be the *same*
    /// variable identity rather than a redefinition that must fail with
    /// `MultipleVariableDefinition`.
    pub fn same_identity(&self, shape: &[u64], element_size: u64) -> bool {
        self.shape == shape && self.element_size == element_size
    }

    pub fn global_size(&self) -> Result<u64, DtlError> {
        checked_byte_size(self.element_size, &self.shape)
    }

    /// Byte size of this actor's local region for `get`, scaled by the
    /// number of historical transactions `transaction_selection` spans. A
    /// default `Latest` selection spans exactly one, so this is unchanged
    /// for publishers and for subscribers that never call
    /// `set_transaction_selection_*`.
    pub fn local_size(&self) -> Result<u64, DtlError> {
        let per_tx = match &self.selection {
            Some((_, count)) => checked_byte_size(self.element_size, count)?,
            None => checked_byte_size(self.element_size, &self.count)?,
        };
        Ok(per_tx.saturating_mul(self.transaction_selection.count()))
    }

    pub fn is_reduced(&self) -> bool {
        self.reduction.is_some()
    }

    pub fn is_reduced_by_publisher(&self) -> bool {
        self.reduction.as_ref().map(|r| r.applied_by_publisher).unwrap_or(false)
    }

    pub fn reduction_kind(&self) -> Option<ReductionKind> {
        self.reduction.as_ref().map(|r| r.kind)
    }

    pub fn set_selection(&mut self, start: Vec<u64>, count: Vec<u64>) -> Result<(), DtlError> {
        if start.len() != self.shape.len() || count.len() != self.shape.len() {
            return Err(DtlError::InconsistentVariableDefinition("selection dimensionality mismatch".into()));
        }
        for i in 0..self.shape.len() {
            if count[i] == 0 {
                return Err(DtlError::InconsistentVariableDefinition(format!("selection dimension {i}: count must be >= 1")));
            }
            let end = start[i].checked_add(count[i]).ok_or(DtlError::Overflow)?;
            if end > self.shape[i] {
                return Err(DtlError::InconsistentVariableDefinition(format!(
                    "selection dimension {i}: start+count ({end}) exceeds shape ({})",
                    self.shape[i]
                )));
            }
        }
        self.selection = Some((start, count));
        Ok(())
    }

    pub fn set_transaction_selection_single(&mut self, idx: u64, total_committed: u64) -> Result<(), DtlError> {
        if idx >= total_committed {
            return Err(DtlError::UsageError(format!(
                "transaction index {idx} out of range (0..{total_committed})"
            )));
        }
        self.transaction_selection = TransactionSelection::Single(idx);
        Ok(())
    }

    pub fn set_transaction_selection_range(&mut self, first: u64, span: u64) -> Result<(), DtlError> {
        if span == 0 {
            return Err(DtlError::UsageError("transaction selection span must be >= 1".into()));
        }
        self.transaction_selection = TransactionSelection::Range { first, span };
        Ok(())
    }

    /// Effective local `(start, count)` after applying any subscriber
    /// selection. Used for intersection arithmetic against publisher
    /// slabs in the Staging engine.
    pub fn effective_region(&self) -> (Vec<u64>, Vec<u64>) {
        match &self.selection {
            Some((s, c)) => (s.clone(), c.clone()),
            None => (self.start.clone(), self.count.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_and_3d_sizes() {
        let scalar = Variable::new_scalar("scalar", 4).unwrap();
        assert_eq!(scalar.global_size().unwrap(), 4);

        let var3d = Variable::new_ndim("var3d", vec![64, 64, 64], vec![0, 0, 0], vec![64, 64, 64], 8).unwrap();
        assert_eq!(var3d.global_size().unwrap(), 64 * 64 * 64 * 8);
        assert_eq!(var3d.local_size().unwrap(), 64 * 64 * 64 * 8);
    }

    #[test]
    fn inconsistent_definitions_rejected() {
        assert!(Variable::new_ndim("var", vec![64], vec![0], vec![128], 8).is_err());
        assert!(validate_definition(&[64, 64, 64], &[0, 0], &[64, 64, 64], 8).is_err());
        assert!(validate_definition(&[64, 64, 64], &[0, 0, 0], &[64, 64], 8).is_err());
    }

    #[test]
    fn distributed_local_and_global_sizes() {
        let var = Variable::new_ndim("var", vec![64, 64, 64], vec![0, 0, 0], vec![48, 48, 48], 8).unwrap();
        assert_eq!(var.local_size().unwrap(), 48 * 48 * 48 * 8);
        assert_eq!(var.global_size().unwrap(), 64 * 64 * 64 * 8);
    }

    #[test]
    fn overflow_is_detected() {
        let huge = u64::MAX / 2;
        assert_eq!(checked_byte_size(8, &[huge, 2]), Err(DtlError::Overflow));
    }

    #[test]
    fn selection_out_of_bounds_rejected() {
        let mut var = Variable::new_ndim("var", vec![100, 100], vec![0, 0], vec![100, 100], 8).unwrap();
        assert!(var.set_selection(vec![50, 0], vec![60, 100]).is_err());
        assert!(var.set_selection(vec![50, 0], vec![50, 100]).is_ok());
        assert_eq!(var.local_size().unwrap(), 8 * 50 * 100);
    }

    #[test]
    fn local_size_scales_with_transaction_selection_span() {
        let mut var = Variable::new_ndim("var", vec![20000, 20000], vec![0, 0], vec![20000, 20000], 8).unwrap();
        let one_tx = var.local_size().unwrap();
        assert_eq!(one_tx, 8 * 20000 * 20000);

        var.set_transaction_selection_single(1, 5).unwrap();
        assert_eq!(var.local_size().unwrap(), one_tx);

        var.set_transaction_selection_range(2, 2).unwrap();
        assert_eq!(var.local_size().unwrap(), 2 * one_tx);
    }
}
