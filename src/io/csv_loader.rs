//! Reference `LabelledDataSet` backed by the CSV sample format (§6.3): one
//! sample per line, `<label>,<x1>,<x2>,...,<xn>`. An empty label field is
//! the placeholder `"_"`. This is plumbing that demonstrates the
//! `LabelledDataSet` boundary, not a full-featured loader — the rest of the
//! loader surface (streaming, shuffling, multi-file data sets) is out of
//! scope (§1).

use std::io;
use std::path::Path;

use crate::error::{Result, RichardError};
use crate::io::{DataDetails, LabelledDataSet, Sample};

#[derive(Debug)]
pub struct CsvDataLoader {
    samples: Vec<Sample>,
    cursor: usize,
    fetch_size: usize,
}

impl CsvDataLoader {
    pub fn open(path: &Path, fetch_size: usize, details: &DataDetails) -> Result<Self> {
        let path_str = path.display().to_string();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|e| RichardError::io(&path_str, csv_to_io_error(e)))?;

        let expected_len = details.shape.len();
        let mut samples = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| RichardError::io(&path_str, csv_to_io_error(e)))?;
            let mut fields = record.iter();
            let label_token = fields.next().unwrap_or("");
            let label = if label_token.is_empty() { "_".to_string() } else { label_token.to_string() };

            let mut data = Vec::with_capacity(expected_len);
            for field in fields {
                let raw: f32 = field.parse().map_err(|_| {
                    RichardError::config("csv row", format!("`{field}` is not a valid number"))
                })?;
                data.push(details.normalization.normalize(raw));
            }
            if data.len() != expected_len {
                return Err(RichardError::config(
                    "csv row",
                    format!("expected {expected_len} values, found {}", data.len()),
                ));
            }
            samples.push(Sample { label, data });
        }

        if samples.is_empty() {
            return Err(RichardError::io(
                &path_str,
                io::Error::new(io::ErrorKind::InvalidData, "data set is empty"),
            ));
        }

        Ok(CsvDataLoader { samples, cursor: 0, fetch_size })
    }
}

fn csv_to_io_error(e: csv::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

impl LabelledDataSet for CsvDataLoader {
    fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    fn load_samples(&mut self, count: usize) -> Result<Vec<Sample>> {
        let end = (self.cursor + count).min(self.samples.len());
        let batch = self.samples[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(batch)
    }

    fn seek_to_beginning(&mut self) {
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::NormalizationParams;
    use crate::shape::Shape3;

    fn write_csv(contents: &str) -> tempfile_path::TempCsv {
        tempfile_path::TempCsv::new(contents)
    }

    // Minimal temp-file helper so this test has no external dev-dependency
    // beyond what the crate already pulls in.
    mod tempfile_path {
        use std::fs::File;
        use std::io::Write;
        use std::path::PathBuf;

        pub struct TempCsv {
            pub path: PathBuf,
        }

        impl TempCsv {
            pub fn new(contents: &str) -> Self {
                let mut path = std::env::temp_dir();
                path.push(format!("richard-csv-test-{}.csv", std::process::id()));
                let mut f = File::create(&path).unwrap();
                f.write_all(contents.as_bytes()).unwrap();
                TempCsv { path }
            }
        }

        impl Drop for TempCsv {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    #[test]
    fn csv_round_trip_normalizes_and_labels() {
        let temp = write_csv("1,0,255,128\n");
        let details = DataDetails {
            normalization: NormalizationParams { min: 0.0, max: 255.0 },
            class_labels: vec!["0".to_string(), "1".to_string()],
            shape: Shape3::vector(3),
        };
        let mut loader = CsvDataLoader::open(&temp.path, 1, &details).unwrap();
        let batch = loader.load_samples(1).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].label, "1");
        assert_eq!(batch[0].data, vec![0.0, 1.0, 128.0 / 255.0]);
    }

    #[test]
    fn empty_label_field_becomes_underscore() {
        let temp = write_csv(",1,2,3\n");
        let details = DataDetails {
            normalization: NormalizationParams { min: 0.0, max: 1.0 },
            class_labels: vec![],
            shape: Shape3::vector(3),
        };
        let mut loader = CsvDataLoader::open(&temp.path, 1, &details).unwrap();
        let batch = loader.load_samples(1).unwrap();
        assert_eq!(batch[0].label, "_");
    }
}
