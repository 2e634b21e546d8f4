use chrono::NaiveDate;
use std::fmt::Write as _;

use crate::monitor::domain::{PropertyKey, Source, ViolationRecord};
use crate::monitor::sources::SourceError;

/// Rendered digest ready for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestMessage {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    pub record_count: usize,
}

/// Everything one run contributes to the e-mail.
#[derive(Debug, Clone, Copy)]
pub struct Digest<'a> {
    pub property: &'a PropertyKey,
    pub monitored: &'a [Source],
    pub records: &'a [ViolationRecord],
    pub unavailable: &'a [SourceError],
    pub generated_on: NaiveDate,
}

impl<'a> Digest<'a> {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn subject(&self) -> String {
        format!(
            "NYC Property Violations - Block {}, Lot {}",
            self.property.block, self.property.lot
        )
    }

    pub fn render(&self) -> DigestMessage {
        DigestMessage {
            subject: self.subject(),
            html_body: self.render_html(),
            text_body: self.render_text(),
            record_count: self.records.len(),
        }
    }

    fn sections(&self) -> Vec<(Source, Vec<&'a ViolationRecord>)> {
        let mut sources: Vec<Source> = self.monitored.to_vec();
        sources.sort();
        sources.dedup();

        sources
            .into_iter()
            .filter(|source| !self.unavailable.iter().any(|err| err.feed == *source))
            .map(|source| {
                let records = self
                    .records
                    .iter()
                    .filter(|record| record.source == source)
                    .collect();
                (source, records)
            })
            .collect()
    }

    fn render_html(&self) -> String {
        let mut html = String::new();
        html.push_str(
            "<html><head><style>\
table {border-collapse: collapse; width: 100%;}\
th, td {border: 1px solid #ddd; padding: 8px; text-align: left;}\
th {background-color: #f2f2f2;}\
.section {margin-bottom: 20px;}\
.no-violations {color: #666; font-style: italic;}\
</style></head><body>",
        );
        html.push_str("<h2>NYC Property Violations Report</h2>");
        writeln!(
            html,
            "<p><strong>Property:</strong> {}</p>",
            escape_html(&self.property.to_string())
        )
        .expect("property paragraph");
        writeln!(
            html,
            "<p><strong>Date:</strong> {}</p>",
            self.generated_on.format("%Y-%m-%d")
        )
        .expect("date paragraph");

        if self.is_empty() {
            html.push_str("<p class='no-violations'>All clear: no new violations since the last check.</p>");
        }

        for (source, records) in self.sections() {
            writeln!(html, "<div class='section'><h3>{}</h3>", source.label())
                .expect("section heading");
            if records.is_empty() {
                html.push_str("<p class='no-violations'>No new violations found</p></div>");
                continue;
            }

            html.push_str("<table><tr><th>Issued</th><th>ID</th><th>Description</th></tr>");
            for record in records {
                writeln!(
                    html,
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                    record.issued_label(),
                    escape_html(&record.native_id),
                    escape_html(&record.description)
                )
                .expect("record row");
            }
            html.push_str("</table></div>");
        }

        if !self.unavailable.is_empty() {
            html.push_str("<div class='section'><h3>Unavailable sources</h3><ul>");
            for err in self.unavailable {
                writeln!(html, "<li>{}</li>", escape_html(&err.to_string()))
                    .expect("unavailable item");
            }
            html.push_str("</ul></div>");
        }

        html.push_str("</body></html>");
        html
    }

    fn render_text(&self) -> String {
        let mut text = String::new();
        writeln!(text, "NYC Property Violations Report").expect("title");
        writeln!(text, "Property: {}", self.property).expect("property line");
        writeln!(text, "Date: {}", self.generated_on.format("%Y-%m-%d")).expect("date line");

        if self.is_empty() {
            writeln!(text, "\nAll clear: no new violations since the last check.")
                .expect("all clear line");
        }

        for (source, records) in self.sections() {
            writeln!(text, "\n{}", source.label()).expect("section heading");
            if records.is_empty() {
                writeln!(text, "  No new violations found").expect("empty section");
                continue;
            }
            for record in records {
                writeln!(
                    text,
                    "- {} | {} | {}",
                    record.issued_label(),
                    record.native_id,
                    record.description
                )
                .expect("record line");
            }
        }

        if !self.unavailable.is_empty() {
            writeln!(text, "\nUnavailable sources").expect("unavailable heading");
            for err in self.unavailable {
                writeln!(text, "- {err}").expect("unavailable line");
            }
        }

        text
    }
}

pub(crate) fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
