//! NZB index generation
//!
//! Emits a newzBin 1.1 NZB document referencing every posted article by
//! Message-ID: one `<file>` element for the main upload plus one per
//! additional artifact (PAR2, SFV), segments sorted by ascending number,
//! attributes and text XML-escaped.

use std::collections::HashSet;
use std::io::Cursor;
use std::path::PathBuf;

use chrono::Utc;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::info;

use crate::error::{PostError, Result};
use crate::paths::sanitize_file_name;
use crate::segments::Segment;

/// One `<file>` element in the document
#[derive(Debug, Clone)]
struct NzbEntry {
    subject: String,
    segments: Vec<Segment>,
}

/// NZB document assembler
#[derive(Debug, Clone)]
pub struct NzbGenerator {
    output_dir: PathBuf,
    poster: String,
}

impl NzbGenerator {
    /// Create a generator writing into `output_dir` with the configured
    /// poster attribute
    pub fn new(output_dir: impl Into<PathBuf>, poster: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            poster: poster.into(),
        }
    }

    /// Write `<sanitized_base>.nzb` for the posted file
    ///
    /// `group` may name several newsgroups comma-separated; each becomes one
    /// `<group>` element, trimmed, in input order. `additional` carries
    /// artifact segments (e.g. `("PAR2", ...)`, `("SFV", ...)`), each
    /// emitted as its own `<file>` element.
    ///
    /// # Errors
    ///
    /// - [`PostError::InvalidConfig`] - no segments at all, or duplicate
    ///   Message-IDs (a collision is a bug upstream)
    /// - [`PostError::Io`] - writing the document failed
    pub fn generate(
        &self,
        file_name: &str,
        segments: Vec<Segment>,
        group: &str,
        additional: Vec<(String, Vec<Segment>)>,
    ) -> Result<PathBuf> {
        if segments.is_empty() {
            return Err(PostError::InvalidConfig(
                "no segments to reference from the NZB".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for segment in segments.iter().chain(additional.iter().flat_map(|(_, s)| s)) {
            if !seen.insert(segment.message_id.as_str()) {
                return Err(PostError::InvalidConfig(format!(
                    "duplicate message-id {}",
                    segment.message_id
                )));
            }
        }

        let groups: Vec<String> = group
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();

        let mut entries = vec![make_entry(segments)?];
        for (_, artifact_segments) in additional {
            if !artifact_segments.is_empty() {
                entries.push(make_entry(artifact_segments)?);
            }
        }

        let document = render_document(file_name, &self.poster, &groups, &entries);

        std::fs::create_dir_all(&self.output_dir)?;
        let path = self
            .output_dir
            .join(format!("{}.nzb", sanitize_file_name(file_name)));
        std::fs::write(&path, document)?;

        info!(path = %path.display(), files = entries.len(), "Wrote NZB index");
        Ok(path)
    }
}

/// Sort segments ascending; the lowest-numbered one donates the subject
fn make_entry(mut segments: Vec<Segment>) -> Result<NzbEntry> {
    segments.sort_by_key(|s| s.number);
    let subject = segments
        .first()
        .map(|s| s.subject.clone())
        .ok_or_else(|| PostError::InvalidConfig("empty segment group".to_string()))?;
    Ok(NzbEntry { subject, segments })
}

fn render_document(
    file_name: &str,
    poster: &str,
    groups: &[String],
    entries: &[NzbEntry],
) -> String {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    let date = Utc::now().timestamp().to_string();

    let mut nzb_elem = BytesStart::new("nzb");
    nzb_elem.push_attribute(("xmlns", "http://www.newzbin.com/DTD/2003/nzb"));
    writer.write_event(Event::Start(nzb_elem)).expect("in-memory write");

    writer
        .write_event(Event::Start(BytesStart::new("head")))
        .expect("in-memory write");
    let mut meta_elem = BytesStart::new("meta");
    meta_elem.push_attribute(("type", "title"));
    writer.write_event(Event::Start(meta_elem)).expect("in-memory write");
    writer
        .write_event(Event::Text(BytesText::new(file_name)))
        .expect("in-memory write");
    writer
        .write_event(Event::End(BytesEnd::new("meta")))
        .expect("in-memory write");
    writer
        .write_event(Event::End(BytesEnd::new("head")))
        .expect("in-memory write");

    for entry in entries {
        let mut file_elem = BytesStart::new("file");
        file_elem.push_attribute(("poster", poster));
        file_elem.push_attribute(("date", date.as_str()));
        file_elem.push_attribute(("subject", entry.subject.as_str()));
        writer.write_event(Event::Start(file_elem)).expect("in-memory write");

        writer
            .write_event(Event::Start(BytesStart::new("groups")))
            .expect("in-memory write");
        for group in groups {
            writer
                .write_event(Event::Start(BytesStart::new("group")))
                .expect("in-memory write");
            writer
                .write_event(Event::Text(BytesText::new(group)))
                .expect("in-memory write");
            writer
                .write_event(Event::End(BytesEnd::new("group")))
                .expect("in-memory write");
        }
        writer
            .write_event(Event::End(BytesEnd::new("groups")))
            .expect("in-memory write");

        writer
            .write_event(Event::Start(BytesStart::new("segments")))
            .expect("in-memory write");
        for segment in &entry.segments {
            let mut seg_elem = BytesStart::new("segment");
            seg_elem.push_attribute(("bytes", segment.bytes.to_string().as_str()));
            seg_elem.push_attribute(("number", segment.number.to_string().as_str()));
            writer.write_event(Event::Start(seg_elem)).expect("in-memory write");
            writer
                .write_event(Event::Text(BytesText::new(&segment.message_id)))
                .expect("in-memory write");
            writer
                .write_event(Event::End(BytesEnd::new("segment")))
                .expect("in-memory write");
        }
        writer
            .write_event(Event::End(BytesEnd::new("segments")))
            .expect("in-memory write");

        writer
            .write_event(Event::End(BytesEnd::new("file")))
            .expect("in-memory write");
    }

    writer
        .write_event(Event::End(BytesEnd::new("nzb")))
        .expect("in-memory write");

    let body = writer.into_inner().into_inner();
    let body = String::from_utf8(body).expect("writer emits UTF-8");

    let mut document = String::with_capacity(body.len() + 160);
    document.push_str("<?xml version=\"1.0\" encoding=\"iso-8859-1\"?>\n");
    document.push_str(
        "<!DOCTYPE nzb PUBLIC \"-//newzBin//DTD NZB 1.1//EN\" \"http://www.newzbin.com/DTD/nzb/nzb-1.1.dtd\">\n",
    );
    document.push_str(&body);
    document.push('\n');
    document
}
