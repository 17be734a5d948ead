//! Tabular export of stored trials.
//!
//! The core only depends on [`TrialExporter`]; [`StandardExporter`] is the
//! built-in implementation and a richer one can be dropped in without
//! touching callers.

use iat_core::{Participant, Trial};
use iat_store::TrialStore;
use std::borrow::Cow;
use std::io::{self, Write};
use tracing::debug;

/// Trial fields in export order, after `session` and `participant_code`.
pub const TRIAL_FIELDS: [&str; 8] = [
    "block",
    "trial",
    "stimulus",
    "stimulus_class",
    "stimulus_level",
    "response_key",
    "response_correct",
    "response_time_ms",
];

pub type Row = Vec<String>;

pub trait TrialExporter {
    fn header(&self) -> Row;

    /// Data rows, recomputed from storage on every call.
    fn rows(&self) -> Box<dyn Iterator<Item = Row> + '_>;

    /// Header followed by every data row.
    fn export(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        Box::new(std::iter::once(self.header()).chain(self.rows()))
    }
}

pub struct StandardExporter<'s, S: TrialStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: TrialStore + ?Sized> StandardExporter<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }
}

impl<S: TrialStore + ?Sized> TrialExporter for StandardExporter<'_, S> {
    fn header(&self) -> Row {
        ["session", "participant_code"]
            .into_iter()
            .chain(TRIAL_FIELDS)
            .map(String::from)
            .collect()
    }

    fn rows(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        let snapshot = self.store.snapshot();
        debug!(rows = snapshot.len(), "Exporting trials");
        Box::new(
            snapshot
                .into_iter()
                .map(|(participant, trial)| trial_row(&participant, &trial)),
        )
    }
}

fn trial_row(participant: &Participant, trial: &Trial) -> Row {
    vec![
        sanitize(&participant.session_code).into_owned(),
        sanitize(&participant.code).into_owned(),
        trial.block.to_string(),
        trial.trial.to_string(),
        sanitize(&trial.stimulus).into_owned(),
        sanitize(&trial.stimulus_class).into_owned(),
        sanitize(&trial.stimulus_level).into_owned(),
        trial
            .response_key
            .as_deref()
            .map(|k| sanitize(k).into_owned())
            .unwrap_or_default(),
        trial
            .response_correct
            .map(|c| (if c { "1" } else { "0" }).to_string())
            .unwrap_or_default(),
        trial
            .response_time_ms
            .map(|ms| ms.to_string())
            .unwrap_or_default(),
    ]
}

/// Replaces line breaks and other control characters with spaces.
pub fn sanitize(value: &str) -> Cow<'_, str> {
    if !value.chars().any(char::is_control) {
        return Cow::Borrowed(value);
    }
    debug!(value, "Replacing control characters in export value");
    Cow::Owned(
        value
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect(),
    )
}

fn csv_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Writes the exporter's output as CSV. Returns the number of data rows.
pub fn write_csv<E, W>(exporter: &E, mut out: W) -> io::Result<usize>
where
    E: TrialExporter + ?Sized,
    W: Write,
{
    let mut rows = 0;
    for (i, row) in exporter.export().enumerate() {
        let line = row.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",");
        writeln!(out, "{line}")?;
        if i > 0 {
            rows += 1;
        }
    }
    out.flush()?;
    Ok(rows)
}
