//! Display the stored analysis result

use analysis_lib::{FileResultStore, ResultStore};
use anyhow::{Context, Result};
use chrono::NaiveDate;

use super::analyze::print_result;
use crate::config::Settings;

/// Show the stored result, optionally only if it falls on `date`
pub fn show_result(settings: &Settings, date: Option<&str>) -> Result<()> {
    let store = FileResultStore::new(&settings.results_file);

    let result = match date {
        Some(date) => {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{date}', expected YYYY-MM-DD"))?;
            store.find_by_date(date)?
        }
        None => store.latest()?.with_context(|| {
            format!("No analysis result in {}", settings.results_file.display())
        })?,
    };

    print_result(&result, settings)
}
