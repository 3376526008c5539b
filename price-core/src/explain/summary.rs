//! Plain-text factor list returned alongside the chart

use super::{Contribution, Explanation};

const HEADER: &str = "Factors influencing the predicted price:\n";

/// Integral values print without a fraction, everything else in shortest form
fn format_value(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn describe_one(contribution: &Contribution) -> String {
    let direction = if contribution.increases_price() {
        "increased"
    } else {
        "decreased"
    };
    let value = match &contribution.label {
        Some(label) => format!("{} ({})", format_value(contribution.value), label),
        None => format_value(contribution.value),
    };
    format!(
        "- {}: Value = {}, {} price by {:.2} units.",
        contribution.feature,
        value,
        direction,
        contribution.shap.abs()
    )
}

/// One line per feature in column order
pub fn describe(explanation: &Explanation) -> String {
    let mut text = String::from(HEADER);
    for contribution in &explanation.contributions {
        text.push_str(&describe_one(contribution));
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_COUNT;

    fn contribution(feature: &'static str, value: f64, label: Option<&str>, shap: f64) -> Contribution {
        Contribution {
            feature,
            value,
            label: label.map(str::to_string),
            shap,
        }
    }

    #[test]
    fn test_line_format() {
        assert_eq!(
            describe_one(&contribution("Area", 150.0, None, 200_000.0)),
            "- Area: Value = 150, increased price by 200000.00 units."
        );
        assert_eq!(
            describe_one(&contribution("City", 1.0, Some("Cairo"), -30_000.456)),
            "- City: Value = 1 (Cairo), decreased price by 30000.46 units."
        );
        assert_eq!(
            describe_one(&contribution("Price_per_sqm", 12345.5, None, 0.0)),
            "- Price_per_sqm: Value = 12345.5, decreased price by 0.00 units."
        );
    }

    #[test]
    fn test_every_feature_gets_a_line() {
        let explanation = Explanation {
            base_value: 0.0,
            prediction: 0.0,
            contributions: (0..FEATURE_COUNT)
                .map(|i| contribution(crate::features::FEATURE_LAYOUT[i], i as f64, None, i as f64 - 4.0))
                .collect(),
        };

        let text = describe(&explanation);
        assert!(text.starts_with(HEADER));

        let lines: Vec<&str> = text.lines().skip(1).collect();
        assert_eq!(lines.len(), FEATURE_COUNT);
        assert!(lines[0].starts_with("- Type:"));
        assert!(lines[8].starts_with("- Price_per_sqm:"));
        assert!(lines[5].contains("increased price by 1.00 units."));
        assert!(lines[4].contains("decreased price by 0.00 units."));
    }
}
