//! CSV export of product records
//!
//! One header row with the record field names, then one row per record. When variant
//! prices are exported, `additional_info` holds the price table as a JSON object and is
//! left empty for products without one.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::SinkError;
use crate::models::{PriceTable, RECORD_FIELDS, Record};
use crate::traits::RecordSink;

/// Shape of a row as read back; `additional_info` is still the raw JSON cell
#[derive(Deserialize)]
struct CsvRow {
    title: String,
    description: String,
    price: f64,
    rating: u8,
    num_of_reviews: u32,
    #[serde(default)]
    additional_info: Option<String>,
}

pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    with_additional_info: bool,
}

impl CsvSink<File> {
    pub fn create(path: impl AsRef<Path>, with_additional_info: bool) -> Result<Self, SinkError> {
        let path = path.as_ref();
        info!("Writing records to {}", path.display());
        Ok(Self {
            writer: csv::Writer::from_path(path)?,
            with_additional_info,
        })
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(writer: W, with_additional_info: bool) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            with_additional_info,
        }
    }

    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer.into_inner().map_err(|e| {
            SinkError::Io(std::io::Error::new(
                e.error().kind(),
                e.error().to_string(),
            ))
        })
    }

    fn row(&self, record: &Record) -> Result<Vec<String>, SinkError> {
        let mut row = vec![
            record.title.clone(),
            record.description.clone(),
            record.price.to_string(),
            record.rating.to_string(),
            record.num_of_reviews.to_string(),
        ];

        if self.with_additional_info {
            row.push(match &record.additional_info {
                Some(prices) => serde_json::to_string(prices)?,
                None => String::new(),
            });
        }

        Ok(row)
    }
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn write(&mut self, records: &[Record]) -> Result<(), SinkError> {
        self.writer
            .write_record(Record::field_names(self.with_additional_info))?;

        for record in records {
            let row = self.row(record)?;
            self.writer.write_record(&row)?;
        }

        self.writer.flush()?;
        info!("Wrote {} records", records.len());
        Ok(())
    }
}

/// Read back records written by [`CsvSink`]
pub fn read_records<R: Read>(reader: R) -> Result<Vec<Record>, SinkError> {
    let mut reader = csv::Reader::from_reader(reader);

    let headers = reader.headers()?.clone();
    let known = headers.len() <= RECORD_FIELDS.len()
        && headers.iter().zip(RECORD_FIELDS).all(|(h, f)| h == f);
    if headers.len() < 5 || !known {
        return Err(SinkError::InvalidRow {
            row: 0,
            message: format!("unexpected header {:?}", headers.iter().collect::<Vec<_>>()),
        });
    }

    let mut records = Vec::new();
    for row in reader.deserialize::<CsvRow>() {
        let row = row?;

        let additional_info = match row.additional_info.as_deref() {
            None | Some("") => None,
            Some(json) => Some(serde_json::from_str::<PriceTable>(json)?),
        };

        records.push(Record {
            title: row.title,
            description: row.description,
            price: row.price,
            rating: row.rating,
            num_of_reviews: row.num_of_reviews,
            additional_info,
        });
    }

    Ok(records)
}
