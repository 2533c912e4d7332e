//! Append-only per-iteration diagnostics for one estimation run.
//!
//! Record 0 is the initial guess; record k is the state after iteration k.
//! The trajectory is owned exclusively by the run that fills it and is never
//! truncated or rewritten, so its length is always `iterations + 1`.

use std::io::Write;

/// One snapshot of the estimation state and the gradient diagnostics at it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IterationRecord {
    /// `‖x‖²` of the current signal estimate.
    pub x_norm_sq: f64,
    pub alpha: f64,
    pub beta: f64,
    /// Effective regularization strength `β/α`.
    pub lambda: f64,
    /// Negative log-posterior value.
    pub objective: f64,
    /// `‖∂J/∂x‖²` in the normal-equations scaling.
    pub grad_x_norm_sq: f64,
    /// `(∂J/∂α)²`.
    pub grad_alpha_sq: f64,
    /// `(∂J/∂β)²`.
    pub grad_beta_sq: f64,
}

impl IterationRecord {
    /// The stopping statistic: sum of the three squared gradient components.
    pub fn gradient_norm_sq(&self) -> f64 {
        self.grad_x_norm_sq + self.grad_alpha_sq + self.grad_beta_sq
    }
}

/// Ordered sequence of [`IterationRecord`]s for one engine run.
#[derive(Clone, Debug, Default)]
pub struct Trajectory {
    records: Vec<IterationRecord>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: IterationRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&IterationRecord> {
        self.records.last()
    }

    pub fn records(&self) -> &[IterationRecord] {
        &self.records
    }

    pub fn alphas(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.alpha).collect()
    }

    pub fn betas(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.beta).collect()
    }

    pub fn lambdas(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.lambda).collect()
    }

    pub fn x_norms(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.x_norm_sq).collect()
    }

    pub fn objectives(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.objective).collect()
    }

    /// Write the trajectory as a column-oriented CSV table.
    pub fn write_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        let mut w = csv::Writer::from_writer(writer);
        w.write_record([
            "x_norm",
            "alpha",
            "beta",
            "lambda",
            "obj",
            "grad_x_norm_sq",
            "grad_alpha_sq",
            "grad_beta_sq",
        ])?;
        for r in &self.records {
            w.write_record([
                r.x_norm_sq.to_string(),
                r.alpha.to_string(),
                r.beta.to_string(),
                r.lambda.to_string(),
                r.objective.to_string(),
                r.grad_x_norm_sq.to_string(),
                r.grad_alpha_sq.to_string(),
                r.grad_beta_sq.to_string(),
            ])?;
        }
        w.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(k: f64) -> IterationRecord {
        IterationRecord {
            x_norm_sq: k,
            alpha: 10.0 - k,
            beta: 1.0 + k,
            lambda: (1.0 + k) / (10.0 - k),
            objective: -k,
            grad_x_norm_sq: k,
            grad_alpha_sq: 2.0 * k,
            grad_beta_sq: 3.0 * k,
        }
    }

    #[test]
    fn preserves_append_order() {
        let mut t = Trajectory::new();
        for k in 0..5 {
            t.push(record(k as f64));
        }
        assert_eq!(t.len(), 5);
        let alphas = t.alphas();
        assert_eq!(alphas, vec![10.0, 9.0, 8.0, 7.0, 6.0]);
        assert_eq!(t.last().unwrap().x_norm_sq, 4.0);
    }

    #[test]
    fn gradient_norm_sums_components() {
        let r = record(2.0);
        assert_eq!(r.gradient_norm_sq(), 2.0 + 4.0 + 6.0);
    }

    #[test]
    fn csv_has_header_and_one_row_per_record() {
        let mut t = Trajectory::new();
        t.push(record(0.0));
        t.push(record(1.0));
        let mut buf = Vec::new();
        t.write_csv(&mut buf).expect("csv");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.trim_end().lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("x_norm,alpha,beta,lambda,obj"));
    }
}
