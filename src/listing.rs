/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use crate::file_reader::FileReader;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

enum Entry {
    /// A preformatted instruction line tagged with its source point.
    Line { point: String, text: String },
    /// A contiguous batch of data bytes starting at `pc`.
    Data { pc: i64, bytes: Vec<u8> },
}

/// Collects the program listing during emission: instruction lines with
/// their reconstructed operands, and raw data shown as 16-byte hex/ASCII
/// rows. Source text is re-read lazily by path when the listing is
/// rendered.
pub struct Listing {
    entries: Vec<Entry>,
}

impl Listing {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add_instruction(&mut self, point: &str, text: String) {
        self.entries.push(Entry::Line {
            point: point.to_string(),
            text,
        });
    }

    /// Marks that the next data batch starts at a new address.
    pub fn divider(&mut self, pc: i64) {
        self.entries.push(Entry::Data {
            pc,
            bytes: Vec::new(),
        });
    }

    pub fn add_data(&mut self, pc: i64, bytes: &[u8]) {
        match self.entries.last_mut() {
            Some(Entry::Data { bytes: batch, .. }) => batch.extend_from_slice(bytes),
            _ => self.entries.push(Entry::Data {
                pc,
                bytes: bytes.to_vec(),
            }),
        }
    }

    pub fn render<F: FileReader>(&self, reader: &F) -> String {
        let mut out = String::new();
        let mut file_cache: HashMap<String, Vec<String>> = HashMap::new();
        let mut previous_line: Option<String> = None;
        let mut previous_file: Option<String> = None;

        for entry in &self.entries {
            match entry {
                Entry::Line { point, text } => {
                    // strip the macro-expansion arrows back to the call site
                    let current = point.split("->").next().unwrap_or(point).to_string();
                    let Some((file, line_number)) = current.rsplit_once(':') else {
                        let _ = writeln!(out, "{}", text);
                        continue;
                    };
                    let Ok(line_number) = line_number.parse::<usize>() else {
                        let _ = writeln!(out, "{}", text);
                        continue;
                    };
                    if previous_file.as_deref() != Some(file) {
                        previous_file = Some(file.to_string());
                        let _ = writeln!(out, "Source file: {}", file);
                    }
                    let lines = file_cache.entry(file.to_string()).or_insert_with(|| {
                        reader
                            .read_to_string(Path::new(file))
                            .map(|s| s.lines().map(str::to_string).collect())
                            .unwrap_or_default()
                    });
                    if previous_line.as_deref() == Some(current.as_str()) {
                        let _ = writeln!(out, "{:<32}", text);
                    } else {
                        let source = lines
                            .get(line_number - 1)
                            .map(|s| s.trim())
                            .unwrap_or_default();
                        let _ = writeln!(out, "{:<32} {:>5}  {}", text, line_number, source);
                        previous_line = Some(current);
                    }
                }
                Entry::Data { pc, bytes } => {
                    previous_line = None;
                    let mut previous_row: Option<&[u8]> = None;
                    let mut in_dupe = false;
                    for (i, row) in bytes.chunks(16).enumerate() {
                        if previous_row == Some(row) {
                            if !in_dupe {
                                in_dupe = true;
                                let _ = writeln!(out, "   . . .");
                            }
                            continue;
                        }
                        in_dupe = false;
                        previous_row = Some(row);
                        let mut data_line = format!(" {:04X} ", pc + (i as i64) * 16);
                        let mut char_line = String::new();
                        for &byte in row {
                            let _ = write!(data_line, " {:02X}", byte);
                            if (32..=126).contains(&byte) {
                                char_line.push(byte as char);
                            } else {
                                char_line.push('.');
                            }
                        }
                        let _ = writeln!(out, "{:<54}  |{:<16}|", data_line, char_line);
                    }
                }
            }
        }
        out
    }
}

impl Default for Listing {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects the label map: every surviving label with its address and
/// defining source position, rendered sorted by address with the label
/// column fitted to the longest name.
pub struct LabelMap {
    entries: Vec<(i64, String, String)>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, label: &str, point: &str, location: i64) {
        let label = if let Some(rest) = label.strip_prefix('_') {
            // macro arguments and their caller-side bindings are noise
            if rest.parse::<usize>().is_ok() || rest.starts_with('*') {
                return;
            }
            label.to_string()
        } else if label.starts_with('*') {
            // anonymous labels all display the same way
            "*".to_string()
        } else {
            label.to_string()
        };
        // absolute paths would swamp the chart; keep the leaf names but
        // preserve the macro-expansion arrows
        let short: Vec<&str> = point
            .split("->")
            .map(|loc| loc.rsplit(['/', '\\']).next().unwrap_or(loc))
            .collect();
        self.entries.push((location, label, short.join("->")));
    }

    pub fn render(&self) -> String {
        let mut entries = self.entries.clone();
        entries.sort();
        let width = entries.iter().map(|(_, l, _)| l.len()).max().unwrap_or(0);
        let mut out = String::new();
        for (location, label, point) in &entries {
            let _ = writeln!(
                out,
                "${:04X} | {:<width$} | {}",
                location,
                label,
                point,
                width = width
            );
        }
        out
    }
}

impl Default for LabelMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_reader::MockFileReader;

    #[test]
    fn test_data_rows_and_dupe_collapse() {
        let reader = MockFileReader::default();
        let mut listing = Listing::new();
        let mut bytes = vec![0x41u8; 48];
        bytes.extend_from_slice(&[1, 2, 3]);
        listing.add_data(0x400, &bytes);
        let text = listing.render(&reader);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with(" 0400  41 41"));
        assert!(lines[0].contains("|AAAAAAAAAAAAAAAA|"));
        assert_eq!(lines[1], "   . . .");
        assert!(lines[2].starts_with(" 0430  01 02 03"));
        assert!(lines[2].contains("|...             |"));
    }

    #[test]
    fn test_instruction_lines_show_source_once() {
        let mut reader = MockFileReader::default();
        reader.add_file("t.oph", "lda #1 lda #2\n");
        let mut listing = Listing::new();
        listing.add_instruction("t.oph:1", " 0000  A9 01     lda #$01".to_string());
        listing.add_instruction("t.oph:1", " 0002  A9 02     lda #$02".to_string());
        let text = listing.render(&reader);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Source file: t.oph");
        assert!(lines[1].contains("lda #$01"));
        assert!(lines[1].contains("1  lda #1 lda #2"));
        assert!(lines[2].contains("lda #$02"));
        assert!(!lines[2].contains("lda #1 lda #2"));
    }

    #[test]
    fn test_label_map_sorts_and_filters() {
        let mut map = LabelMap::new();
        map.add("interrupt_handler", "src/t.oph:9", 0x2000);
        map.add("main", "t.oph:3", 0x100);
        map.add("_1", "t.oph:4", 1);
        map.add("_*2_loop", "t.oph:5", 2);
        map.add("*7", "t.oph:6", 0x150);
        let text = map.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "$0100 | main              | t.oph:3");
        assert_eq!(lines[1], "$0150 | *                 | t.oph:6");
        assert_eq!(lines[2], "$2000 | interrupt_handler | t.oph:9");
    }
}
