use crate::error::{ExchangeError, Result};
use crate::schema::ModelSchema;
use crate::store::{Datastore, Record};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub model: &'static str,
    pub exported: usize,
    /// `None` when the model was empty and nothing was written.
    pub path: Option<PathBuf>,
}

/// `<dir>/<model>_export.csv`, lower-cased.
pub fn default_export_path(dir: &Path, model: &ModelSchema) -> PathBuf {
    dir.join(format!("{}_export.csv", model.name.to_ascii_lowercase()))
}

pub fn export<S: Datastore>(
    store: &S,
    model: &ModelSchema,
    destination: &Path,
    delimiter: u8,
) -> Result<ExportSummary> {
    let records = store.iterate_all(model, model.ordering)?;
    if records.is_empty() {
        log::info!("{}: no data to export", model.name);
        return Ok(ExportSummary {
            model: model.name,
            exported: 0,
            path: None,
        });
    }

    let destination_err = |message: String| ExchangeError::Destination {
        path: destination.to_path_buf(),
        message,
    };
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| destination_err(e.to_string()))?;
        }
    }
    // Written beside the destination and renamed into place once complete.
    let mut partial = destination.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);
    let written = std::fs::File::create(&partial)
        .map_err(|e| e.to_string())
        .and_then(|file| {
            write_records(model, &records, file, delimiter).map_err(|e| e.to_string())
        })
        .and_then(|()| std::fs::rename(&partial, destination).map_err(|e| e.to_string()));
    if let Err(message) = written {
        let _ = std::fs::remove_file(&partial);
        return Err(destination_err(message));
    }

    log::info!(
        "{}: exported {} records to {}",
        model.name,
        records.len(),
        destination.to_string_lossy()
    );
    Ok(ExportSummary {
        model: model.name,
        exported: records.len(),
        path: Some(destination.to_path_buf()),
    })
}

/// Header plus one row per record, columns in descriptor order.
pub fn write_records<W: Write>(
    model: &ModelSchema,
    records: &[Record],
    out: W,
    delimiter: u8,
) -> std::result::Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new().delimiter(delimiter).from_writer(out);
    wtr.write_record(model.fields().iter().map(|f| f.name))?;
    for record in records {
        wtr.write_record(model.fields().iter().map(|f| {
            record
                .get(f.name)
                .map(|v| v.to_string())
                .unwrap_or_default()
        }))?;
    }
    wtr.flush()?;
    Ok(())
}
