/*!

Per-step result accumulation and CSV export.

One [`ResultRow`] per step, appended in step order and never rewritten. The
series plus its CSV rendering is the run's entire output surface.

*/

use crate::context::{Context, DataPlugin};
use crate::error::EpiError;
use crate::population::CompartmentCounts;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// The state of the run at the end of one step. Row 0 is the post-seeding
/// initial state, so seeded infections appear in its `new_infections`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ResultRow {
    pub step: u32,
    pub time: f64,
    pub susceptible: usize,
    pub exposed: usize,
    pub infectious: usize,
    pub recovered: usize,
    pub dead: usize,
    pub new_infections: usize,
    pub cumulative_infections: usize,
    /// Fraction of the living population exposed or infectious; derived at
    /// record time, never stored in agent state.
    pub prevalence: f64,
}

#[derive(Default)]
pub struct ResultSeries {
    rows: Vec<ResultRow>,
    cumulative_infections: usize,
}

impl DataPlugin for ResultSeries {
    const new: &'static dyn Fn() -> Self = &ResultSeries::default;
}

impl ResultSeries {
    /// Appends the row for `step`. Steps must be recorded in order, exactly
    /// once each.
    pub fn record(
        &mut self,
        step: u32,
        time: f64,
        counts: CompartmentCounts,
        new_infections: usize,
        prevalence: f64,
    ) {
        debug_assert_eq!(step as usize, self.rows.len());
        self.cumulative_infections += new_infections;
        self.rows.push(ResultRow {
            step,
            time,
            susceptible: counts.susceptible,
            exposed: counts.exposed,
            infectious: counts.infectious,
            recovered: counts.recovered,
            dead: counts.dead,
            new_infections,
            cumulative_infections: self.cumulative_infections,
            prevalence,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn row(&self, step: u32) -> Option<&ResultRow> {
        self.rows.get(step as usize)
    }

    #[must_use]
    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), EpiError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_csv_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EpiError> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }
}

pub trait ContextResultsExt {
    fn results(&self) -> Option<&ResultSeries>;
    fn record_result(
        &mut self,
        step: u32,
        time: f64,
        counts: CompartmentCounts,
        new_infections: usize,
        prevalence: f64,
    );
}

impl ContextResultsExt for Context {
    fn results(&self) -> Option<&ResultSeries> {
        self.get_data_container::<ResultSeries>()
    }

    fn record_result(
        &mut self,
        step: u32,
        time: f64,
        counts: CompartmentCounts,
        new_infections: usize,
        prevalence: f64,
    ) {
        self.get_data_container_mut::<ResultSeries>()
            .record(step, time, counts, new_infections, prevalence);
    }
}
