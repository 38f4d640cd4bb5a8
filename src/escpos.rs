//! ESC/POS byte streams for the 58/80 mm thermal printers at the front desk.
//!
//! The output is meant to be piped to the printer as-is. Text is transliterated to ASCII (Romanian diacritics folded to
//! their base letters) so output is identical on every code page.

use serde::{Deserialize, Serialize};

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;
const LF: u8 = 0x0A;

/// Paper width, configured as millimetres (58 or 80).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum PaperWidth {
    Mm58,
    #[default]
    Mm80,
}

impl PaperWidth {
    /// Characters per line in the default font.
    pub fn chars(self) -> usize {
        match self {
            PaperWidth::Mm58 => 32,
            PaperWidth::Mm80 => 48,
        }
    }

    pub fn from_mm(mm: u32) -> Self {
        if mm <= 58 {
            PaperWidth::Mm58
        } else {
            PaperWidth::Mm80
        }
    }
}

impl From<u32> for PaperWidth {
    fn from(mm: u32) -> Self {
        PaperWidth::from_mm(mm)
    }
}

impl From<PaperWidth> for u32 {
    fn from(width: PaperWidth) -> Self {
        match width {
            PaperWidth::Mm58 => 58,
            PaperWidth::Mm80 => 80,
        }
    }
}

/// Fold Romanian (and common Latin-1) diacritics to plain ASCII letters.
/// Characters with no mapping are returned unchanged.
pub fn remove_diacritics(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            'ă' | 'â' | 'á' | 'à' | 'ä' => 'a',
            'Ă' | 'Â' | 'Á' | 'À' | 'Ä' => 'A',
            'î' | 'í' | 'ì' | 'ï' => 'i',
            'Î' | 'Í' | 'Ì' | 'Ï' => 'I',
            'ș' | 'ş' => 's',
            'Ș' | 'Ş' => 'S',
            'ț' | 'ţ' => 't',
            'Ț' | 'Ţ' => 'T',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'É' | 'È' | 'Ë' | 'Ê' => 'E',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'Ó' | 'Ò' | 'Ö' | 'Ô' => 'O',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
            other => other,
        })
        .collect()
}

/// Greedy word wrap to at most `width` characters per line. Words longer
/// than a line are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            let rest = word.split_off(width);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let needed = if line.is_empty() { word.len() } else { line.chars().count() + 1 + word.len() };
        if needed > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.extend(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Chainable writer for an ESC/POS job.
///
/// ```rust,ignore
/// let mut b = EscPosBuilder::new();
/// b.init()
///     .center()
///     .bold(true).text("BON PREDARE\n").bold(false)
///     .left()
///     .line_pair("Manopera", "50.00 RON")
///     .feed(3)
///     .cut();
/// let data = b.build();
/// ```
pub struct EscPosBuilder {
    buffer: Vec<u8>,
    paper: PaperWidth,
}

impl EscPosBuilder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(512),
            paper: PaperWidth::Mm80,
        }
    }

    pub fn with_paper(mut self, paper: PaperWidth) -> Self {
        self.paper = paper;
        self
    }

    pub fn paper(&self) -> PaperWidth {
        self.paper
    }

    /// `ESC @`: reset the printer.
    pub fn init(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x40]);
        self
    }

    /// `ESC E n`
    pub fn bold(&mut self, on: bool) -> &mut Self {
        self.buffer
            .extend_from_slice(&[ESC, 0x45, if on { 1 } else { 0 }]);
        self
    }

    /// `GS ! n`: character magnification, each axis clamped to 1..=8.
    pub fn text_size(&mut self, width: u8, height: u8) -> &mut Self {
        let w = width.clamp(1, 8) - 1;
        let h = height.clamp(1, 8) - 1;
        self.buffer.extend_from_slice(&[GS, 0x21, (w << 4) | h]);
        self
    }

    pub fn normal_size(&mut self) -> &mut Self {
        self.text_size(1, 1)
    }

    pub fn double_height(&mut self) -> &mut Self {
        self.text_size(1, 2)
    }

    pub fn left(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x61, 0]);
        self
    }

    pub fn center(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x61, 1]);
        self
    }

    /// Append text. Diacritics are folded; anything left outside ASCII
    /// becomes `?`.
    pub fn text(&mut self, s: &str) -> &mut Self {
        let folded = remove_diacritics(s);
        self.buffer
            .extend(folded.chars().map(|ch| if ch.is_ascii() { ch as u8 } else { b'?' }));
        self
    }

    pub fn lf(&mut self) -> &mut Self {
        self.buffer.push(LF);
        self
    }

    /// Text followed by a line-feed.
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s).lf()
    }

    /// Word-wrapped paragraph at the paper width.
    pub fn wrapped(&mut self, s: &str) -> &mut Self {
        for line in wrap(&remove_diacritics(s), self.paper.chars()) {
            self.line(&line);
        }
        self
    }

    /// Full-width row of dashes.
    pub fn separator(&mut self) -> &mut Self {
        let width = self.paper.chars();
        self.buffer.extend(std::iter::repeat(b'-').take(width));
        self.buffer.push(LF);
        self
    }

    /// `label` flush left, `value` flush right, at least one space between.
    pub fn line_pair(&mut self, label: &str, value: &str) -> &mut Self {
        let label = remove_diacritics(label);
        let value = remove_diacritics(value);
        let width = self.paper.chars();
        let gap = width
            .saturating_sub(label.chars().count() + value.chars().count())
            .max(1);
        self.text(&label);
        self.buffer.extend(std::iter::repeat(b' ').take(gap));
        self.text(&value);
        self.lf()
    }

    /// `ESC d n`
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x64, lines]);
        self
    }

    /// `GS V A 16`: feed and partial cut.
    pub fn cut(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[GS, 0x56, 0x41, 0x10]);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_resets() {
        let mut b = EscPosBuilder::new();
        b.init();
        assert_eq!(b.build(), vec![0x1B, 0x40]);
    }

    #[test]
    fn bold_toggles() {
        let mut b = EscPosBuilder::new();
        b.bold(true).text("HI").bold(false);
        assert_eq!(b.build(), vec![0x1B, 0x45, 1, b'H', b'I', 0x1B, 0x45, 0]);
    }

    #[test]
    fn cut_is_partial() {
        let mut b = EscPosBuilder::new();
        b.cut();
        assert_eq!(b.build(), vec![0x1D, 0x56, 0x41, 0x10]);
    }

    #[test]
    fn romanian_text_is_folded() {
        let mut b = EscPosBuilder::new();
        b.text("Ștefan Țară încă");
        assert_eq!(b.build(), b"Stefan Tara inca".to_vec());
    }

    #[test]
    fn unmapped_char_becomes_question_mark() {
        let mut b = EscPosBuilder::new();
        b.text("5€");
        assert_eq!(b.build(), b"5?".to_vec());
    }

    #[test]
    fn separator_fills_58mm() {
        let mut b = EscPosBuilder::new().with_paper(PaperWidth::Mm58);
        b.separator();
        let data = b.build();
        assert_eq!(data.len(), 33);
        assert!(data[..32].iter().all(|&c| c == b'-'));
    }

    #[test]
    fn line_pair_right_aligns() {
        let mut b = EscPosBuilder::new().with_paper(PaperWidth::Mm58);
        b.line_pair("Total", "80.00 RON");
        let data = b.build();
        // "Total" (5) + spaces (18) + "80.00 RON" (9) + LF
        assert_eq!(data.len(), 33);
        assert_eq!(&data[..5], b"Total");
        assert_eq!(&data[23..32], b"80.00 RON");
    }

    #[test]
    fn text_size_packs_nibbles() {
        let mut b = EscPosBuilder::new();
        b.text_size(2, 2);
        assert_eq!(b.build(), vec![0x1D, 0x21, 0x11]);
    }

    #[test]
    fn wrap_respects_width_and_splits_long_words() {
        let lines = wrap("Imprimanta nu trage hartia din tava doi", 12);
        assert!(lines.iter().all(|l| l.chars().count() <= 12), "{lines:?}");
        assert_eq!(lines.join(" "), "Imprimanta nu trage hartia din tava doi");
        assert_eq!(wrap("ABCDEFGHIJ", 4), vec!["ABCD", "EFGH", "IJ"]);
        assert!(wrap("   ", 10).is_empty());
    }

    #[test]
    fn paper_width_from_config_number() {
        let w: PaperWidth = serde_json::from_str("58").expect("parse");
        assert_eq!(w, PaperWidth::Mm58);
        assert_eq!(serde_json::to_string(&PaperWidth::Mm80).expect("ser"), "80");
    }
}
