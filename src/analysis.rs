//! Recurrence counts of unaccounted binaries across diff records

use crate::diff::DiffRecord;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

pub const CSV_HEADER: [&str; 2] = ["binary", "count"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    counts: HashMap<String, usize>,
}

impl FrequencyTable {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a DiffRecord>) -> Self {
        let mut counts = HashMap::new();
        for record in records {
            for path in &record.elf_names {
                *counts.entry(path.clone()).or_insert(0) += 1;
            }
        }
        Self { counts }
    }

    pub fn count(&self, path: &str) -> usize {
        self.counts.get(path).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Count descending, ties broken by path ascending
    pub fn ranked(&self) -> Vec<(&str, usize)> {
        let mut rows: Vec<(&str, usize)> = self
            .counts
            .iter()
            .map(|(path, count)| (path.as_str(), *count))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        rows
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(CSV_HEADER)?;
        for (path, count) in self.ranked() {
            wtr.write_record([path, count.to_string().as_str()])?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn export_csv(&self, path: &Path) -> Result<(), csv::Error> {
        let file = File::create(path).map_err(csv::Error::from)?;
        self.write_csv(io::BufWriter::new(file))
    }
}
