//! # Visualization
//!
//! $$
//! \{(\sigma_k,\mu_k)\}_{k=1}^{K} \mapsto \text{risk/return chart}
//! $$
//!
use std::path::Path;

use plotly::Layout;
use plotly::Plot;
use plotly::Scatter;
use plotly::common::Line;
use plotly::common::Marker;
use plotly::common::Mode;
use plotly::layout::Axis;
use plotly::layout::Margin;

use crate::quant::portfolio::Frontier;
use crate::quant::portfolio::PortfolioResult;

pub struct FrontierPlotter<'a> {
  frontier: &'a Frontier,
  highlight: Option<&'a PortfolioResult>,
  line_width: f64,
  title: String,
}

impl<'a> FrontierPlotter<'a> {
  pub fn new(frontier: &'a Frontier) -> Self {
    Self {
      frontier,
      highlight: None,
      line_width: 2.0,
      title: "Efficient Frontier".to_string(),
    }
  }

  pub fn title(mut self, title: &str) -> Self {
    self.title = title.into();
    self
  }

  pub fn line_width(mut self, w: f64) -> Self {
    self.line_width = w;
    self
  }

  /// Mark an optimized portfolio on top of the curve.
  pub fn highlight(mut self, portfolio: &'a PortfolioResult) -> Self {
    self.highlight = Some(portfolio);
    self
  }

  pub fn plot(&self) -> Plot {
    let mut plot = Plot::new();
    plot.set_layout(
      Layout::new()
        .title(self.title.as_str())
        .auto_size(true)
        .margin(Margin::new().left(64).right(24).top(64).bottom(56))
        .x_axis(Axis::new().title("Annualized Volatility (Std Dev)"))
        .y_axis(Axis::new().title("Annualized Return")),
    );

    let hover_text = self
      .frontier
      .points()
      .map(|p| {
        let weights = p
          .weights
          .iter()
          .map(|w| format!("{:.2}%", 100.0 * w))
          .collect::<Vec<String>>()
          .join(", ");
        format!(
          "vol: {:.4}<br>return: {:.4}<br>weights: {}",
          p.volatility, p.expected_return, weights
        )
      })
      .collect::<Vec<String>>();

    let trace = Scatter::new(
      self.frontier.volatilities.clone(),
      self.frontier.returns.clone(),
    )
    .mode(Mode::LinesMarkers)
    .line(Line::new().width(self.line_width))
    .name("Efficient Frontier")
    .hover_text_array(hover_text)
    .hover_template("%{hovertext}<extra></extra>");
    plot.add_trace(trace);

    if let Some(portfolio) = self.highlight {
      let label = match portfolio.target_return {
        Some(t) => format!("Optimized (target {:.2}%)", 100.0 * t),
        None => "Minimum variance".to_string(),
      };
      let marker = Scatter::new(vec![portfolio.volatility], vec![portfolio.expected_return])
        .mode(Mode::Markers)
        .marker(Marker::new().size(12))
        .name(label.as_str());
      plot.add_trace(marker);
    }

    plot
  }

  pub fn show(&self) {
    self.plot().show();
  }

  pub fn write_html<P: AsRef<Path>>(&self, path: P) {
    self.plot().write_html(path);
  }
}

/// Frontier chart with default styling.
pub fn plot_frontier(frontier: &Frontier, highlight: Option<&PortfolioResult>) -> Plot {
  let plotter = FrontierPlotter::new(frontier);
  match highlight {
    Some(p) => plotter.highlight(p).plot(),
    None => plotter.plot(),
  }
}
