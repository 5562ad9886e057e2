use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::model::RenderedDocument;

pub const DOCUMENT_COLUMNS: [&str; 10] = [
    "DOCUMENT_ID",
    "DOCUMENT_TITLE",
    "DOCUMENT_TYPE",
    "PUBLISH_DATE",
    "LANGUAGE",
    "TEMPLATE_ID",
    "ENTITY_ID",
    "LINKAGE_LEVEL",
    "WORD_COUNT",
    "RAW_MARKDOWN",
];

const LANGUAGE: &str = "en";

/// Write rendered documents as CSV in input order. Returns bytes written.
pub fn write_documents_csv(path: &Path, documents: &[RenderedDocument]) -> Result<u64, csv::Error> {
    let writer = BufWriter::new(File::create(path).map_err(csv::Error::from)?);
    let counting = CountingWriter::new(writer);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(counting);

    writer.write_record(DOCUMENT_COLUMNS)?;
    for document in documents {
        let doc_type = display_doc_type(&document.doc_type);
        let linkage_level = document.linkage_level.to_string();
        let word_count = document.word_count.to_string();
        writer.write_record([
            document.document_id.as_str(),
            document.title.as_str(),
            doc_type.as_str(),
            document.publish_date.as_deref().unwrap_or_default(),
            LANGUAGE,
            document.template_id.as_str(),
            document.entity_id.as_deref().unwrap_or_default(),
            linkage_level.as_str(),
            word_count.as_str(),
            document.body.as_str(),
        ])?;
    }

    writer.flush()?;
    let counting = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(counting.bytes_written())
}

/// `broker_research` -> `Broker Research`.
pub fn display_doc_type(doc_type: &str) -> String {
    doc_type
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_type_display_is_title_case() {
        assert_eq!(display_doc_type("broker_research"), "Broker Research");
        assert_eq!(display_doc_type("ngo_reports"), "Ngo Reports");
    }
}
