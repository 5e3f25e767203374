//! Expense analysis output.

use serde::Serialize;
use serde_json::Value;

/// Charts the analysis script renders on every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartKind {
    MonthlyTrend,
    PieChart,
    Heatmap,
}

/// Every chart, in the order they are reported to clients.
pub const CHART_KINDS: [ChartKind; 3] = [
    ChartKind::MonthlyTrend,
    ChartKind::PieChart,
    ChartKind::Heatmap,
];

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MonthlyTrend => "monthly_trend",
            Self::PieChart => "pie_chart",
            Self::Heatmap => "heatmap",
        }
    }

    /// File name the script writes for this chart.
    pub fn file_name(&self) -> String {
        format!("{}.png", self.as_str())
    }
}

impl std::fmt::Display for ChartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed output of one analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    /// The JSON object the script printed.
    pub summary: Value,
    /// Public paths of the three charts, in [`CHART_KINDS`] order.
    pub images: Vec<String>,
}
