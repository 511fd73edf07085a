//! Price observations from CSV.
//!
//! Expected header: `date,symbol,close[,adjusted_close]` with ISO dates.

use std::path::Path;

use anyhow::Context;
use anyhow::Result;
use csv::ReaderBuilder;
use csv::Trim;

use super::data::PriceObservation;

/// Read every observation in `path`; symbols are upper-cased.
pub fn load_price_csv<P: AsRef<Path>>(path: P) -> Result<Vec<PriceObservation>> {
  let path = path.as_ref();
  let mut reader = ReaderBuilder::new()
    .trim(Trim::All)
    .from_path(path)
    .with_context(|| format!("failed to open price file {}", path.display()))?;

  let mut observations = Vec::new();
  for (line, record) in reader.deserialize::<PriceObservation>().enumerate() {
    let mut obs =
      record.with_context(|| format!("invalid record {} in {}", line + 1, path.display()))?;
    obs.symbol = obs.symbol.to_uppercase();
    observations.push(obs);
  }

  Ok(observations)
}
