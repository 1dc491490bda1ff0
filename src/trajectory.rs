//! Allele-frequency trajectories recorded by the population models, with CSV/TSV/JSON writers.
use std::io::{self, Write};

use serde::Serialize;

use crate::matrix::{create_x_array_to, transpose_matrix};

/// Frequency of allele A per population (replicate or deme) per generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectories {
    pub labels: Vec<String>,
    /// Generation axis, `0..=generations`
    pub generations: Vec<i64>,
    /// Indexed `[population][generation]`
    pub frequencies: Vec<Vec<f64>>,
}

impl Trajectories {
    pub fn new(labels: Vec<String>, generations: usize) -> Self {
        let frequencies = vec![Vec::with_capacity(generations + 1); labels.len()];
        Self {
            labels,
            generations: create_x_array_to(generations as i64),
            frequencies,
        }
    }

    /// Append one generation, one value per population in label order.
    pub fn record(&mut self, observed: &[f64]) {
        for (series, &f) in self.frequencies.iter_mut().zip(observed) {
            series.push(f);
        }
    }

    pub fn final_frequencies(&self) -> Vec<f64> {
        self.frequencies
            .iter()
            .filter_map(|series| series.last().copied())
            .collect()
    }

    /// Frequencies indexed `[generation][population]`, the layout of a table row.
    pub fn rows(&self) -> io::Result<Vec<Vec<f64>>> {
        transpose_matrix(&self.frequencies).map_err(io::Error::other)
    }

    fn write_delimited<W: Write>(&self, mut w: W, sep: char) -> io::Result<()> {
        write!(w, "generation")?;
        for label in &self.labels {
            write!(w, "{sep}{label}")?;
        }
        writeln!(w)?;

        for (generation, row) in self.generations.iter().zip(self.rows()?) {
            write!(w, "{generation}")?;
            for f in row {
                write!(w, "{sep}{f}")?;
            }
            writeln!(w)?;
        }
        Ok(())
    }

    pub fn write_csv<W: Write>(&self, w: W) -> io::Result<()> {
        self.write_delimited(w, ',')
    }

    pub fn write_tsv<W: Write>(&self, w: W) -> io::Result<()> {
        self.write_delimited(w, '\t')
    }

    pub fn json_dump<W: Write>(&self, w: W) -> io::Result<()> {
        serde_json::to_writer_pretty(w, self)?;
        Ok(())
    }
}
