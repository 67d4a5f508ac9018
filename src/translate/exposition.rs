//! Text exposition rendering for the scrape endpoint.

use std::collections::BTreeMap;
use std::fmt::Write;

use super::ROLLUP_LABEL;
use crate::catalog::classify;
use crate::source::Vector;

/// Linked from every `# HELP` line.
pub const HELP_URL: &str = "https://docs.temporal.io/cloud/metrics#available-metrics";

/// Labels that never make it into the rendered text.
const HIDDEN_LABELS: [&str; 3] = ["__name__", ROLLUP_LABEL, "temporal_service_type"];

const TRIMMED_SUFFIXES: [&str; 3] = ["_count", "_sum", "_bucket"];

/// Render every result set, keyed by published metric name.
///
/// Names render in lexicographic order and labels in key order.
pub fn render(results: &BTreeMap<String, Vector>) -> String {
    let mut out = String::new();

    for (metric_name, samples) in results {
        let family = trim_suffixes(metric_name);
        let _ = writeln!(out, "# HELP {family} {HELP_URL}");
        let _ = writeln!(out, "# TYPE {family} {}", classify(metric_name));

        for sample in samples {
            out.push_str(metric_name);

            let mut separator = '{';
            for (key, value) in &sample.metric {
                if HIDDEN_LABELS.contains(&key.as_str()) {
                    continue;
                }
                out.push(separator);
                out.push_str(key);
                out.push_str("=\"");
                escape_into(&mut out, value);
                out.push('"');
                separator = ',';
            }
            if separator == ',' {
                out.push('}');
            }

            out.push(' ');
            out.push_str(&format_value(sample.value.value));
            out.push('\n');
        }
    }

    out
}

fn trim_suffixes(name: &str) -> &str {
    TRIMMED_SUFFIXES
        .iter()
        .fold(name, |n, suffix| n.strip_suffix(suffix).unwrap_or(n))
}

/// `\` → `\\`, newline → `\n`, `"` → `\"`.
fn escape_into(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
}

/// Shortest round-trip representation, with the common literals spelled out.
///
/// Decimal exponents below -4 or from 6 up switch to `d.ddde±XX` form.
pub fn format_value(f: f64) -> String {
    if f == 1.0 {
        "1".into()
    } else if f == 0.0 {
        "0".into()
    } else if f == -1.0 {
        "-1".into()
    } else if f.is_nan() {
        "NaN".into()
    } else if f == f64::INFINITY {
        "+Inf".into()
    } else if f == f64::NEG_INFINITY {
        "-Inf".into()
    } else {
        format_general(f)
    }
}

fn format_general(f: f64) -> String {
    // `{:e}` yields the shortest round-trip digits, e.g. `1.5e-7`.
    let sci = format!("{f:e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return f.to_string();
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return f.to_string();
    };

    if (-4..6).contains(&exp) {
        f.to_string()
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    }
}
