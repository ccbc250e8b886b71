use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::error::Result;
use crate::notify::MatchContext;
use crate::tracker::TransitionEvent;

const HEADER: [&str; 6] = [
    "timestamp_iso",
    "product_id",
    "store_id",
    "sku",
    "availability",
    "product_url",
];

/// Append-only CSV file with one row per transition.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `event`, writing the header first if the file is new.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory or file cannot be written.
    pub fn append(&self, event: &TransitionEvent, context: &MatchContext) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file_exists = self.path.exists();
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        let mut out = String::new();
        if !file_exists {
            push_row(&mut out, &HEADER);
        }
        let timestamp = event.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string();
        let product_id = context.product_id.to_string();
        let store_id = context.store_id.to_string();
        let sku = event.sku.to_string();
        push_row(
            &mut out,
            &[
                timestamp.as_str(),
                product_id.as_str(),
                store_id.as_str(),
                sku.as_str(),
                event.availability.as_str(),
                context.product_url.as_str(),
            ],
        );
        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

fn push_row(out: &mut String, fields: &[&str]) {
    let row: Vec<String> = fields.iter().map(|f| escape(f)).collect();
    out.push_str(&row.join(","));
    out.push_str("\r\n");
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
