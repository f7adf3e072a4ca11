//! Paginated PDF rendering of verification reports (PDF 1.4, standard Helvetica fonts).

use std::fmt::Write as _;

const PAGE_WIDTH: u32 = 612;
const PAGE_HEIGHT: u32 = 792;
const MARGIN: u32 = 72;
const LINE_HEIGHT: u32 = 15;
const BODY_SIZE: u32 = 11;
/// Usable line width in glyph units (1/1000 of the font size) at [`BODY_SIZE`].
const BODY_WIDTH: u32 = (PAGE_WIDTH - 2 * MARGIN) * 1000 / BODY_SIZE;
const SPACE_WIDTH: u32 = 278;

/// Structured content of a verification report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportDocument {
    /// Document title.
    pub title: String,
    /// Topic label.
    pub topic: String,
    /// Question asked.
    pub question: String,
    /// Answer body; newlines start new paragraphs.
    pub answer: String,
    /// Reliability score.
    pub reliability_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    const fn resource(self) -> &'static str {
        match self {
            Self::Regular => "F1",
            Self::Bold => "F2",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Line {
    font: Font,
    size: u32,
    text: String,
}

impl ReportDocument {
    fn lines(&self) -> Vec<Line> {
        let mut lines = vec![
            Line {
                font: Font::Bold,
                size: 18,
                text: self.title.clone(),
            },
            blank(),
        ];
        push_wrapped(&mut lines, &format!("Topic: {}", self.topic));
        push_wrapped(&mut lines, &format!("Question: {}", self.question));
        lines.push(blank());
        lines.push(Line {
            font: Font::Bold,
            size: 14,
            text: "Answer".into(),
        });
        for paragraph in self.answer.split('\n') {
            push_wrapped(&mut lines, paragraph);
        }
        lines.push(blank());
        lines.push(Line {
            font: Font::Regular,
            size: BODY_SIZE,
            text: format!("Reliability Score: {}", self.reliability_score),
        });
        lines
    }

    /// Renders the document. Output always starts with `%PDF-1.4`.
    #[must_use]
    pub fn render_pdf(&self) -> Vec<u8> {
        let per_page = ((PAGE_HEIGHT - 2 * MARGIN) / LINE_HEIGHT) as usize;
        let lines = self.lines();
        let pages: Vec<&[Line]> = lines.chunks(per_page.max(1)).collect();

        let mut pdf = PdfWriter::new();
        let page_ids: Vec<usize> = (0..pages.len()).map(|i| 6 + 2 * i).collect();
        let kids = page_ids
            .iter()
            .map(|id| format!("{id} 0 R"))
            .collect::<Vec<_>>()
            .join(" ");

        pdf.object(1, b"<< /Type /Catalog /Pages 2 0 R >>");
        pdf.object(
            2,
            format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()).as_bytes(),
        );
        pdf.object(
            3,
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
        );
        pdf.object(
            4,
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>",
        );
        pdf.object(
            5,
            format!(
                "<< /Title ({}) /Producer (LiveProof AI) >>",
                escape(&self.title)
            )
            .as_bytes(),
        );
        for (index, page) in pages.iter().enumerate() {
            let page_id = page_ids[index];
            let content_id = page_id + 1;
            pdf.object(
                page_id,
                format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                     /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {content_id} 0 R >>"
                )
                .as_bytes(),
            );
            let stream = content_stream(page);
            let mut body = format!("<< /Length {} >>\nstream\n", stream.len()).into_bytes();
            body.extend_from_slice(&stream);
            body.extend_from_slice(b"\nendstream");
            pdf.object(content_id, &body);
        }
        pdf.finish(1, 5)
    }
}

fn blank() -> Line {
    Line {
        font: Font::Regular,
        size: BODY_SIZE,
        text: String::new(),
    }
}

fn push_wrapped(lines: &mut Vec<Line>, text: &str) {
    for chunk in wrap(text, BODY_WIDTH) {
        lines.push(Line {
            font: Font::Regular,
            size: BODY_SIZE,
            text: chunk,
        });
    }
}

/// Approximate Helvetica advance width in glyph units.
const fn glyph_width(ch: char) -> u32 {
    match ch {
        'i' | 'j' | 'l' => 222,
        ' ' | '!' | ',' | '.' | '/' | ':' | ';' | 'I' | 'f' | 't' | '[' | ']' => 278,
        '(' | ')' | '-' | 'r' | '`' | '\'' => 333,
        'J' | 'c' | 'k' | 's' | 'v' | 'x' | 'y' | 'z' => 500,
        'L' => 556,
        'F' | 'T' | 'Z' => 611,
        'A' | 'B' | 'E' | 'K' | 'P' | 'S' | 'V' | 'X' | 'Y' => 667,
        'C' | 'D' | 'H' | 'N' | 'R' | 'U' | 'w' => 722,
        'G' | 'O' | 'Q' => 778,
        'M' | 'm' => 833,
        '%' => 889,
        'W' => 944,
        '@' | '\u{2014}' | '\u{2026}' | '\u{2122}' => 1000,
        _ => 556,
    }
}

fn text_width(text: &str) -> u32 {
    text.chars().map(glyph_width).sum()
}

/// Byte length of the longest prefix of `word` that fits `max_width`, never less than one char.
fn fitting_prefix(word: &str, max_width: u32) -> usize {
    let mut width = 0;
    for (index, ch) in word.char_indices() {
        width += glyph_width(ch);
        if width > max_width {
            return if index == 0 { ch.len_utf8() } else { index };
        }
    }
    word.len()
}

/// Greedy word wrap against a glyph-unit budget; words wider than a line are split.
fn wrap(text: &str, max_width: u32) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_width = 0;
    for mut word in text.split_whitespace() {
        let mut word_width = text_width(word);
        while word_width > max_width {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
                current_width = 0;
            }
            let (head, rest) = word.split_at(fitting_prefix(word, max_width));
            out.push(head.to_string());
            word = rest;
            word_width = text_width(word);
        }
        if word.is_empty() {
            continue;
        }
        if !current.is_empty() && current_width + SPACE_WIDTH + word_width > max_width {
            out.push(std::mem::take(&mut current));
            current_width = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_width += SPACE_WIDTH;
        }
        current.push_str(word);
        current_width += word_width;
    }
    if !current.is_empty() || out.is_empty() {
        out.push(current);
    }
    out
}

fn content_stream(lines: &[Line]) -> Vec<u8> {
    let mut stream = String::from("BT\n");
    let _ = writeln!(stream, "{MARGIN} {} Td", PAGE_HEIGHT - MARGIN);
    let mut current: Option<(Font, u32)> = None;
    for line in lines {
        if current != Some((line.font, line.size)) {
            let _ = writeln!(stream, "/{} {} Tf", line.font.resource(), line.size);
            current = Some((line.font, line.size));
        }
        let _ = writeln!(stream, "({}) Tj", escape(&line.text));
        let _ = writeln!(stream, "0 -{LINE_HEIGHT} Td");
    }
    stream.push_str("ET");
    stream.into_bytes()
}

/// WinAnsi code for characters outside printable ASCII, if the font encoding has one.
fn win_ansi(ch: char) -> Option<u8> {
    match ch {
        '\u{a0}'..='\u{ff}' => u8::try_from(u32::from(ch)).ok(),
        '\u{20ac}' => Some(0x80),
        '\u{2026}' => Some(0x85),
        '\u{2018}' => Some(0x91),
        '\u{2019}' => Some(0x92),
        '\u{201c}' => Some(0x93),
        '\u{201d}' => Some(0x94),
        '\u{2022}' => Some(0x95),
        '\u{2013}' => Some(0x96),
        '\u{2014}' => Some(0x97),
        '\u{2122}' => Some(0x99),
        _ => None,
    }
}

/// Escapes a PDF literal string. Latin-1 and common typographic characters are written as
/// WinAnsi octal escapes; anything the encoding lacks becomes `?`.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(ch);
            }
            ' '..='~' => out.push(ch),
            _ => match win_ansi(ch) {
                Some(code) => {
                    let _ = write!(out, "\\{code:03o}");
                }
                None => out.push('?'),
            },
        }
    }
    out
}

struct PdfWriter {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new() -> Self {
        Self {
            buf: b"%PDF-1.4\n".to_vec(),
            offsets: Vec::new(),
        }
    }

    /// Objects must be written in ascending id order starting at 1.
    fn object(&mut self, id: usize, body: &[u8]) {
        debug_assert_eq!(id, self.offsets.len() + 1);
        self.offsets.push(self.buf.len());
        self.buf.extend_from_slice(format!("{id} 0 obj\n").as_bytes());
        self.buf.extend_from_slice(body);
        self.buf.extend_from_slice(b"\nendobj\n");
    }

    fn finish(mut self, root: usize, info: usize) -> Vec<u8> {
        let xref_at = self.buf.len();
        let count = self.offsets.len() + 1;
        let mut xref = format!("xref\n0 {count}\n0000000000 65535 f \n");
        for offset in &self.offsets {
            let _ = write!(xref, "{offset:010} 00000 n \n");
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {count} /Root {root} 0 R /Info {info} 0 R >>\nstartxref\n{xref_at}\n%%EOF\n"
        );
        self.buf.extend_from_slice(xref.as_bytes());
        self.buf
    }
}
