use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use chrono::Days;
use chrono::Local;
use chrono::NaiveDate;
use clap::Parser;
use markowitz_rs::quant::portfolio::PortfolioEngine;
use markowitz_rs::quant::portfolio::PortfolioEngineConfig;
use markowitz_rs::quant::portfolio::PriceTable;
use markowitz_rs::quant::portfolio::data::compute_daily_returns;
use markowitz_rs::quant::portfolio::data::observation_counts;
use markowitz_rs::quant::portfolio::load_price_csv;
use markowitz_rs::visualization::FrontierPlotter;
use prettytable::Table;
use prettytable::row;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Minimum-variance portfolio optimizer over stored daily prices.
#[derive(Parser, Debug)]
#[command(name = "markowitz", version)]
struct Args {
  /// CSV with `date,symbol,close[,adjusted_close]` rows.
  #[arg(long)]
  prices: PathBuf,

  /// Comma-separated symbols; every symbol in the file when omitted.
  #[arg(long, value_delimiter = ',')]
  symbols: Vec<String>,

  /// First date (inclusive); defaults to one year before `--end`.
  #[arg(long)]
  start: Option<NaiveDate>,

  /// Last date (inclusive); defaults to today.
  #[arg(long)]
  end: Option<NaiveDate>,

  /// Minimum annualized expected return, e.g. 0.12.
  #[arg(long)]
  target: Option<f64>,

  #[arg(long)]
  allow_short: bool,

  /// Efficient frontier grid size.
  #[arg(long, default_value_t = 50)]
  points: usize,

  /// Write the efficient frontier chart to this HTML file.
  #[arg(long)]
  plot: Option<PathBuf>,

  /// Solve frontier points in parallel.
  #[arg(long)]
  parallel: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  let symbols: Vec<String> = args
    .symbols
    .iter()
    .map(|s| s.trim().to_uppercase())
    .filter(|s| !s.is_empty())
    .collect();

  let today = Local::now().date_naive();
  let end = args.end.unwrap_or(today);
  let start = match args.start {
    Some(start) => start,
    None => end
      .checked_sub_days(Days::new(365))
      .context("end date is too early for a one-year window")?,
  };
  if start > end {
    bail!("start date {start} is after end date {end}");
  }

  let observations = load_price_csv(&args.prices)?;
  let prices = PriceTable::from_observations_in_range(&observations, &symbols, Some(start), Some(end));

  for missing in symbols.iter().filter(|s| !prices.symbols().contains(*s)) {
    warn!(symbol = %missing, "no prices in range");
  }
  if let Ok(returns) = compute_daily_returns(&prices) {
    for (symbol, count) in returns.symbols().iter().zip(observation_counts(&returns)) {
      info!(symbol = %symbol, returns = count, "return observations");
    }
  }

  let engine = PortfolioEngine::new(PortfolioEngineConfig {
    target_return: args.target,
    allow_short: args.allow_short,
    frontier_points: args.points,
    parallel_frontier: args.parallel,
    ..Default::default()
  });

  let report = engine
    .run(&prices, args.plot.is_some())
    .with_context(|| format!("optimization failed for {start}..{end}"))?;
  let portfolio = &report.portfolio;

  let mut table = Table::new();
  table.add_row(row!["Symbol", "Weight"]);
  for (symbol, weight) in portfolio.weights_by_symbol() {
    table.add_row(row![symbol, format!("{:.2}%", 100.0 * weight)]);
  }
  table.printstd();

  println!("{}", portfolio.name_in_order(&symbols, today));
  println!("Expected return: {:.4}", portfolio.expected_return);
  println!("Volatility:      {:.4}", portfolio.volatility);
  println!("Sharpe ratio:    {:.4}", portfolio.sharpe);

  if let (Some(path), Some(frontier)) = (&args.plot, &report.frontier) {
    FrontierPlotter::new(frontier)
      .highlight(portfolio)
      .write_html(path);
    info!(path = %path.display(), points = frontier.len(), "frontier chart written");
  }

  Ok(())
}
