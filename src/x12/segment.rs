//! Segment-level primitives: field sanitization and the `*`/`~` writer.

/// Characters with structural meaning in the interchange: element
/// separator, segment terminator, repetition separator, and the two
/// escape-prone characters payers reject. Stripped from every free-text
/// field before emission.
const RESERVED: [char; 5] = ['~', '*', '^', '|', '\\'];

/// Sanitize a free-text field for embedding in a segment: strip the
/// reserved separator characters and trim surrounding whitespace.
pub fn sanitize_field(raw: &str) -> String {
    raw.chars().filter(|c| !RESERVED.contains(c)).collect::<String>().trim().to_string()
}

/// Diagnosis codes travel without their decimal point: Z59.0 → Z590.
pub fn strip_diagnosis_decimal(code: &str) -> String {
    sanitize_field(code).replace('.', "")
}

/// Accumulates `*`-delimited, `~`-terminated segments and tallies them.
#[derive(Debug, Default)]
pub struct SegmentWriter {
    buf: String,
    count: u32,
}

impl SegmentWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit one segment. Elements are written exactly as given; callers
    /// sanitize free text and decide which optional elements to carry.
    pub fn segment(&mut self, id: &str, elements: &[&str]) {
        self.buf.push_str(id);
        for element in elements {
            self.buf.push('*');
            self.buf.push_str(element);
        }
        self.buf.push('~');
        self.count += 1;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn finish(self) -> (String, u32) {
        (self.buf, self.count)
    }
}
