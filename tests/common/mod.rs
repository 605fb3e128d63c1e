#![allow(dead_code)]

use kkt::JacobianProvider;

/// Provider backed by explicit jacobian tables: full-width `[P]` rows that
/// get sliced per parameter on the way out, mimicking a model whose
/// parameters flatten to contiguous blocks.
pub struct TableProvider {
    pub param_lens: Vec<usize>,
    /// `loss_rows[b]` is the full `[P]` loss-jacobian row for element `b`.
    pub loss_rows: Vec<Vec<f64>>,
    /// `constraint_rows[b][c]` is the full `[P]` row for constraint `c`.
    pub constraint_rows: Vec<Vec<Vec<f64>>>,
}

impl TableProvider {
    fn slice(&self, row: &[f64], parameter: usize) -> Vec<f64> {
        let start: usize = self.param_lens[..parameter].iter().sum();
        row[start..start + self.param_lens[parameter]].to_vec()
    }
}

impl JacobianProvider<f64> for TableProvider {
    fn num_parameters(&self) -> usize {
        self.param_lens.len()
    }

    fn parameter_len(&self, parameter: usize) -> usize {
        self.param_lens[parameter]
    }

    fn loss_jacobian(&mut self, batch_index: usize, parameter: usize) -> Option<Vec<f64>> {
        let row = self.loss_rows[batch_index].clone();
        Some(self.slice(&row, parameter))
    }

    fn constraint_jacobian(
        &mut self,
        batch_index: usize,
        constraint: usize,
        parameter: usize,
    ) -> Option<Vec<f64>> {
        let row = self.constraint_rows[batch_index][constraint].clone();
        Some(self.slice(&row, parameter))
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `J_g J_g^T` for one batch element's constraint rows.
pub fn gram_of(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    rows.iter()
        .map(|ri| rows.iter().map(|rj| dot(ri, rj)).collect())
        .collect()
}

/// `g - J_g J_f^T` for one batch element.
pub fn rhs_of(g: &[f64], rows: &[Vec<f64>], loss_row: &[f64]) -> Vec<f64> {
    g.iter()
        .zip(rows)
        .map(|(&gv, row)| gv - dot(row, loss_row))
        .collect()
}

pub fn matvec(a: &[Vec<f64>], x: &[f64]) -> Vec<f64> {
    a.iter().map(|row| dot(row, x)).collect()
}

/// A unit-like row of width `p` with `value` at `index`.
pub fn unit_row(p: usize, index: usize, value: f64) -> Vec<f64> {
    let mut row = vec![0.0; p];
    row[index] = value;
    row
}
