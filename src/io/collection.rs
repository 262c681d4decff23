use crate::core::extract::MatchupResult;
use crate::types::OcResult;
use std::io::Write;

/// Matchup records accumulated by the driving loop.
///
/// The collection is owned by the caller and flushed at the interval the
/// caller chooses; flushing writes only records added since the last flush.
#[derive(Debug, Default)]
pub struct MatchupCollection {
    records: Vec<MatchupResult>,
    valid: usize,
    flushed: usize,
}

impl MatchupCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: MatchupResult) {
        if record.is_valid {
            self.valid += 1;
        }
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.valid
    }

    pub fn invalid_count(&self) -> usize {
        self.records.len() - self.valid
    }

    pub fn records(&self) -> &[MatchupResult] {
        &self.records
    }

    /// Records not yet written by [`Self::flush_to`]
    pub fn pending(&self) -> &[MatchupResult] {
        &self.records[self.flushed..]
    }

    /// At least `every` records are pending; `every == 0` never asks
    pub fn should_flush(&self, every: usize) -> bool {
        every > 0 && self.pending().len() >= every
    }

    /// Write pending records as JSON lines, returning how many were written.
    ///
    /// Progress is kept per record: after a write error the next flush
    /// resumes at the first record whose line was not terminated.
    pub fn flush_to<W: Write>(&mut self, mut writer: W) -> OcResult<usize> {
        let start = self.flushed;
        for record in &self.records[start..] {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
            self.flushed += 1;
        }
        writer.flush()?;

        let written = self.flushed - start;
        log::debug!("Flushed {} matchup records ({} total)", written, self.flushed);
        Ok(written)
    }

    /// Records with every band value present
    pub fn complete_records(&self) -> impl Iterator<Item = &MatchupResult> {
        self.records.iter().filter(|r| r.is_complete())
    }

    /// Records with a value for each of `columns`
    pub fn records_complete_on<'a, S: AsRef<str>>(
        &'a self,
        columns: &'a [S],
    ) -> impl Iterator<Item = &'a MatchupResult> + 'a {
        self.records.iter().filter(move |r| r.is_complete_on(columns))
    }

    pub fn into_records(self) -> Vec<MatchupResult> {
        self.records
    }
}

impl Extend<MatchupResult> for MatchupCollection {
    fn extend<I: IntoIterator<Item = MatchupResult>>(&mut self, iter: I) {
        for record in iter {
            self.push(record);
        }
    }
}
