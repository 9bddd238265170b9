//! Text exposition encoder
//!
//! Renders registry snapshots in the line-oriented text format (version
//! 0.0.4) understood by pull-based scrapers:
//!
//! ```text
//! # HELP pond_temperature_histogram_celsius The temperature of the frog pond.
//! # TYPE pond_temperature_histogram_celsius histogram
//! pond_temperature_histogram_celsius_bucket{le="20"} 0
//! pond_temperature_histogram_celsius_bucket{le="+Inf"} 3
//! pond_temperature_histogram_celsius_sum 82
//! pond_temperature_histogram_celsius_count 3
//! ```
//!
//! Output depends only on the snapshot: families come in registration order,
//! instances in first-seen order, quantiles and buckets ascending. Encoding
//! the same snapshot twice gives byte-identical output.

use crate::metrics::desc::{BUCKET_LABEL, QUANTILE_LABEL};
use crate::metrics::snapshot::{FamilySnapshot, SampleValue};
use std::io::{self, Write};

/// Content type served with encoded output
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Encoder for the text exposition format
#[derive(Debug, Default, Clone, Copy)]
pub struct TextEncoder;

impl TextEncoder {
    pub fn new() -> Self {
        Self
    }

    pub fn format_type(&self) -> &'static str {
        CONTENT_TYPE
    }

    /// Write every family with at least one instance to `writer`
    pub fn encode<W: Write>(&self, families: &[FamilySnapshot], writer: &mut W) -> io::Result<()> {
        for family in families {
            // A labelled family nobody has touched yet has nothing to report
            if family.samples.is_empty() {
                continue;
            }

            writeln!(writer, "# HELP {} {}", family.name, escape_help(&family.help))?;
            writeln!(writer, "# TYPE {} {}", family.name, family.kind.as_str())?;

            for sample in &family.samples {
                let labels = LabelSet {
                    names: &family.label_names,
                    values: &sample.label_values,
                };
                match &sample.value {
                    SampleValue::Counter(value) | SampleValue::Gauge(value) => {
                        write_line(writer, &family.name, "", &labels, None, &format_value(*value))?;
                    }
                    SampleValue::Summary(summary) => {
                        for (quantile, estimate) in &summary.quantiles {
                            write_line(
                                writer,
                                &family.name,
                                "",
                                &labels,
                                Some((QUANTILE_LABEL, &format_value(*quantile))),
                                &format_value(*estimate),
                            )?;
                        }
                        write_line(writer, &family.name, "_sum", &labels, None, &format_value(summary.sum))?;
                        write_line(writer, &family.name, "_count", &labels, None, &summary.count.to_string())?;
                    }
                    SampleValue::Histogram(histogram) => {
                        for (bound, count) in &histogram.buckets {
                            write_line(
                                writer,
                                &family.name,
                                "_bucket",
                                &labels,
                                Some((BUCKET_LABEL, &format_value(*bound))),
                                &count.to_string(),
                            )?;
                        }
                        write_line(writer, &family.name, "_sum", &labels, None, &format_value(histogram.sum))?;
                        write_line(writer, &family.name, "_count", &labels, None, &histogram.count.to_string())?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Encode into an owned byte buffer
    pub fn encode_to_vec(&self, families: &[FamilySnapshot]) -> io::Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(4096);
        self.encode(families, &mut buffer)?;
        Ok(buffer)
    }
}

struct LabelSet<'a> {
    names: &'a [String],
    values: &'a [String],
}

fn write_line<W: Write>(
    writer: &mut W,
    name: &str,
    suffix: &str,
    labels: &LabelSet<'_>,
    extra: Option<(&str, &str)>,
    value: &str,
) -> io::Result<()> {
    write!(writer, "{}{}", name, suffix)?;

    let has_labels = !labels.names.is_empty() || extra.is_some();
    if has_labels {
        writer.write_all(b"{")?;
        let mut first = true;
        let pairs = labels
            .names
            .iter()
            .map(String::as_str)
            .zip(labels.values.iter().map(String::as_str))
            .chain(extra);
        for (label, label_value) in pairs {
            if !first {
                writer.write_all(b",")?;
            }
            first = false;
            write!(writer, "{}=\"{}\"", label, escape_label_value(label_value))?;
        }
        writer.write_all(b"}")?;
    }

    writeln!(writer, " {}", value)
}

/// Shortest round-trip decimal form, with the format's spellings for special values
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
