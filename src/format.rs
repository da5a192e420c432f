//! Field separator and number formatting for kapture text files.
//!
//! Formatting is passed explicitly to every writer so the output does not depend on the
//! environment it was produced in.

use itertools::Itertools;

/// kapture version written in the header of every file.
pub const KAPTURE_FORMAT_VERSION: &str = "1.0";

/// How records are laid out in kapture text files.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatOptions {
    /// Placed between two fields of a record.
    pub separator: String,
    /// Number of fractional digits for floating point fields. `None` writes the shortest
    /// decimal that reads back to the same value.
    pub precision: Option<usize>,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            separator: ", ".to_string(),
            precision: None,
        }
    }
}

impl FormatOptions {
    /// Render a floating point field in plain decimal notation, never exponential.
    pub fn float(&self, x: f64) -> String {
        // -0 prints as "-0"
        let x = if x == 0.0 { 0.0 } else { x };
        let s = match self.precision {
            Some(p) => format!("{:.*}", p, x),
            None => format!("{}", x),
        };
        // small negatives can round to -0.000
        match s.strip_prefix('-') {
            Some(digits) if digits.chars().all(|c| c == '0' || c == '.') => digits.to_string(),
            _ => s,
        }
    }

    /// Join already rendered fields into one record.
    pub fn record<I>(&self, fields: I) -> String
    where
        I: IntoIterator,
        I::Item: std::fmt::Display,
    {
        fields.into_iter().join(&self.separator)
    }

    /// The two comment lines at the top of every kapture file.
    pub fn header(&self, columns: &str) -> String {
        format!(
            "# kapture format: {}\n# {}\n",
            KAPTURE_FORMAT_VERSION, columns
        )
    }
}

#[test]
fn test_float_is_plain_decimal() {
    let opts = FormatOptions::default();
    assert_eq!(opts.float(1000.0), "1000");
    assert_eq!(opts.float(0.0001), "0.0001");
    assert_eq!(opts.float(1e-10), "0.0000000001");
    assert_eq!(opts.float(1e21), "1000000000000000000000");
    assert_eq!(opts.float(-0.0), "0");
}

#[test]
fn test_float_precision() {
    let opts = FormatOptions {
        precision: Some(3),
        ..FormatOptions::default()
    };
    assert_eq!(opts.float(0.5), "0.500");
    assert_eq!(opts.float(-0.0), "0.000");
    assert_eq!(opts.float(2.0 / 3.0), "0.667");
    assert_eq!(opts.float(-1e-17), "0.000");
    assert_eq!(opts.float(-0.0004), "0.000");
    assert_eq!(opts.float(-0.0006), "-0.001");
}

#[test]
fn test_record() {
    let opts = FormatOptions::default();
    assert_eq!(opts.record(vec!["7", "0", "a.jpg"]), "7, 0, a.jpg");
    let opts = FormatOptions {
        separator: " ".to_string(),
        ..FormatOptions::default()
    };
    assert_eq!(opts.record(vec![1, 2, 3]), "1 2 3");
}

#[test]
fn test_header() {
    let opts = FormatOptions::default();
    assert_eq!(
        opts.header("X, Y, Z, [R, G, B]"),
        "# kapture format: 1.0\n# X, Y, Z, [R, G, B]\n"
    );
}
