use super::*;
use crate::{common::*, error::PipelineError};
use std::io::Read;

const NUM_COLUMNS: usize = 6;

/// The dataset described by a headerless CSV metadata file.
///
/// Each row holds `min_x, min_y, max_x, max_y, class_id, image_ref` in this
/// order.
#[derive(Debug, Clone)]
pub struct CsvDataset {
    pub image_dir: PathBuf,
    pub samples: Vec<Arc<SampleRecord>>,
}

impl SampleDataset for CsvDataset {
    fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    fn samples(&self) -> &[Arc<SampleRecord>] {
        &self.samples
    }
}

impl CsvDataset {
    pub fn load(image_dir: impl AsRef<Path>, metadata_file: impl AsRef<Path>) -> Result<Self> {
        let image_dir = image_dir.as_ref();
        let metadata_file = metadata_file.as_ref();

        let samples = load_sample_records(metadata_file)
            .with_context(|| format!("failed to load '{}'", metadata_file.display()))?;
        info!(
            "loaded {} samples from '{}'",
            samples.len(),
            metadata_file.display()
        );

        Ok(Self {
            image_dir: image_dir.to_owned(),
            samples: samples.into_iter().map(Arc::new).collect(),
        })
    }
}

/// Parse sample records from a metadata file, keeping the file order.
pub fn load_sample_records(path: impl AsRef<Path>) -> Result<Vec<SampleRecord>> {
    let file = std::fs::File::open(path)?;
    parse_sample_records(file)
}

/// Parse sample records from a reader, keeping the input order.
///
/// Duplicated rows are kept. The crop box geometry is not checked here.
pub fn parse_sample_records<R>(reader: R) -> Result<Vec<SampleRecord>>
where
    R: Read,
{
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(::csv::Trim::All)
        .from_reader(reader);

    reader
        .records()
        .enumerate()
        .map(|(index, row)| -> Result<_> {
            let row = row?;
            let line = row
                .position()
                .map(|pos| pos.line())
                .unwrap_or(index as u64 + 1);
            parse_row(&row, line)
        })
        .collect()
}

fn parse_row(row: &::csv::StringRecord, line: u64) -> Result<SampleRecord> {
    if row.len() != NUM_COLUMNS {
        return Err(PipelineError::MalformedRecord {
            line,
            reason: format!("expect {} columns, but get {}", NUM_COLUMNS, row.len()),
        }
        .into());
    }

    let parse_int = |column: usize, name: &str| -> Result<i64> {
        let text = &row[column];
        text.parse::<i64>().map_err(|_| {
            Error::from(PipelineError::MalformedRecord {
                line,
                reason: format!("{} '{}' is not an integer", name, text),
            })
        })
    };

    let crop_box = CropBox {
        min_x: parse_int(0, "min_x")?,
        min_y: parse_int(1, "min_y")?,
        max_x: parse_int(2, "max_x")?,
        max_y: parse_int(3, "max_y")?,
    };
    let class_id = parse_int(4, "class_id")?;
    let image_ref = row[5].to_owned();

    Ok(SampleRecord {
        crop_box,
        class_id,
        image_ref,
    })
}
