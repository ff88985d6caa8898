use miette::Result;

use crate::cursor::Cursor;
use crate::error::*;
use crate::table::Table;
use crate::{MEMORY_SIZE, PROGRAM_START};

/// Last addressable byte.
const MEMORY_END: u16 = (MEMORY_SIZE - 1) as u16;

/// Two-pass assembler. The first pass scans sections, emits opcodes and
/// collects label definitions plus any forward references; the second pass
/// backpatches the references. Consumed by [`Assembler::assemble`].
///
/// Label addresses are OR-ed into the placeholder bytes, so the emitted
/// image is identical whether a label is declared before or after its use.
pub struct Assembler<'a> {
    src: &'a str,
    cur: Cursor<'a>,
    mem: Box<[u8; MEMORY_SIZE]>,
    /// One past the highest written address; the image ends here.
    end: u16,
    saw_text: bool,
    labels: Table<u16>,
    pending: Table<Vec<u16>>,
}

impl<'a> Assembler<'a> {
    pub fn new(src: &'a str) -> Self {
        Assembler {
            src,
            cur: Cursor::new(src),
            mem: Box::new([0; MEMORY_SIZE]),
            end: PROGRAM_START,
            saw_text: false,
            labels: Table::new(),
            pending: Table::new(),
        }
    }

    /// Assemble the whole source, returning the image from 0x200 up to the
    /// last emitted byte. Gaps left by `org` are zero-filled.
    pub fn assemble(mut self) -> Result<Vec<u8>> {
        let mut loc = PROGRAM_START;
        self.cur.skip_trivia();
        while !self.cur.is_eof() {
            self.section(&mut loc)?;
            self.cur.skip_trivia();
        }
        self.backpatch()?;
        Ok(self.mem[PROGRAM_START as usize..self.end as usize].to_vec())
    }

    fn section(&mut self, loc: &mut u16) -> Result<()> {
        if !self.cur.eat("section") {
            return Err(asm_no_section(self.cur.pos(), self.src));
        }
        self.cur.skip_trivia();
        let name_at = self.cur.pos();
        if self.cur.eat(".text:") {
            self.text_section(loc, name_at)
        } else if self.cur.eat(".data:") {
            self.data_section(loc, name_at)
        } else {
            Err(asm_unknown_section(name_at, self.src))
        }
    }

    fn text_section(&mut self, loc: &mut u16, at: usize) -> Result<()> {
        if self.saw_text || *loc != PROGRAM_START {
            return Err(asm_section_order(at, self.src));
        }
        self.saw_text = true;
        loop {
            self.cur.skip_trivia();
            if self.cur.is_eof() || self.cur.starts_with("section") || *loc > 0xFFF {
                break;
            }
            if self.cur.peek() == b'_' {
                self.label_decl(*loc)?;
                continue;
            }
            let opcode = self.opcode(*loc)?;
            // a raw zero word marks the end of the program
            if opcode == 0 {
                break;
            }
            if *loc >= MEMORY_END {
                *loc = MEMORY_END + 1;
                break;
            }
            self.write_byte(loc, (opcode >> 8) as u8);
            self.write_byte(loc, (opcode & 0xFF) as u8);
        }
        if *loc > 0xFFF {
            return Err(asm_section_overflow(self.cur.pos(), self.src, "text"));
        }
        Ok(())
    }

    fn data_section(&mut self, loc: &mut u16, at: usize) -> Result<()> {
        if !self.saw_text {
            return Err(asm_section_order(at, self.src));
        }
        self.cur.skip_trivia();
        if self.cur.eat("org") {
            let at = self.cur.pos();
            let origin = self.hex_operand(3)?;
            if origin < *loc {
                return Err(asm_org_collision(at, self.src));
            }
            *loc = origin;
        } else {
            // without an explicit origin, data starts one opcode past the
            // end of text
            *loc += 2;
        }
        loop {
            self.cur.skip_trivia();
            if !(self.cur.starts_with("0x") || self.cur.starts_with("0X")) {
                break;
            }
            // literals left over once the cursor hits the end of memory
            if *loc >= 0xFFF {
                return Err(asm_section_overflow(self.cur.pos(), self.src, "data"));
            }
            let byte = self.hex_operand(2)? as u8;
            self.write_byte(loc, byte);
        }
        Ok(())
    }

    /// `_name:` where the name is letters only.
    fn label_decl(&mut self, loc: u16) -> Result<()> {
        self.cur.bump();
        let start = self.cur.pos();
        while !self.cur.is_eof() && self.cur.peek() != b':' {
            if !self.cur.peek().is_ascii_alphabetic() {
                return Err(asm_bad_label(self.cur.pos(), self.src));
            }
            self.cur.bump();
        }
        let name = &self.src[start..self.cur.pos()];
        if name.is_empty() {
            return Err(asm_bad_label(start, self.src));
        }
        self.cur.bump();
        self.labels.insert(name.to_owned(), loc);
        Ok(())
    }

    /// One opcode: either a mnemonic with operands or a raw `0xNNNN` word.
    fn opcode(&mut self, loc: u16) -> Result<u16> {
        let start = self.cur.pos();
        let first = self.cur.bump();
        if first.is_ascii_alphabetic() {
            return self.mnemonic(start, loc);
        }
        if first == b'0' && matches!(self.cur.peek(), b'x' | b'X') {
            self.cur.bump();
            return self.hex_digits(4);
        }
        Err(asm_unknown_mnemonic((start, 1), self.src))
    }

    fn mnemonic(&mut self, start: usize, loc: u16) -> Result<u16> {
        while self.cur.peek().is_ascii_alphabetic() {
            self.cur.bump();
        }
        let word = self.src[start..self.cur.pos()].to_ascii_uppercase();
        let opcode = match word.as_str() {
            "NOP" => 0x0001,
            "EXT" => 0x0002,
            "CLS" => 0x00E0,
            "TGS" => 0x00E1,
            "RET" => 0x00EE,
            "JMP" => {
                self.cur.skip_trivia();
                if self.cur.peek().is_ascii_alphabetic() {
                    0x1000 | self.label_ref(loc)
                } else {
                    0x1000 | self.hex_operand(3)?
                }
            }
            "CAL" => 0x2000 | self.hex_operand(3)?,
            "SKE" => self.compare(0x3000, 0x5000)?,
            "SKNE" => self.compare(0x4000, 0x9000)?,
            "SKP" => 0xE09E | self.register()? << 8,
            "SKNP" => 0xE0A1 | self.register()? << 8,
            "MOV" => self.mov()?,
            "ADD" => self.add()?,
            "MOVO" => 0x8001 | self.register_pair()?,
            "MOVA" => 0x8002 | self.register_pair()?,
            "MOVX" => 0x8003 | self.register_pair()?,
            "SUB" => 0x8005 | self.register_pair()?,
            "STLS" => 0x8006 | self.register_pair()?,
            "MOVS" => 0x8007 | self.register_pair()?,
            "STMS" => 0x800E | self.register_pair()?,
            "STMR" => 0xF055 | self.register_pair()?,
            "FMR" => 0xF065 | self.register()? << 8,
            "JRB" => 0xB000 | self.hex_operand(3)?,
            "RND" => {
                let x = self.register()?;
                0xC000 | x << 8 | self.hex_operand(2)?
            }
            "DSP" => {
                let regs = self.register_pair()?;
                0xD000 | regs | (self.hex_operand(2)? & 0x000F)
            }
            "PRT" => 0xF000 | self.register()? << 8,
            "STK" => 0xF00A | self.register()? << 8,
            "STBC" => 0xF033 | self.register()? << 8,
            _ => {
                return Err(asm_unknown_mnemonic(
                    (start, self.cur.pos() - start),
                    self.src,
                ))
            }
        };
        Ok(opcode)
    }

    /// `SKE`/`SKNE`: register then either a byte literal or a second
    /// register.
    fn compare(&mut self, imm_op: u16, reg_op: u16) -> Result<u16> {
        let x = self.register()?;
        self.cur.skip_trivia();
        match self.cur.peek().to_ascii_uppercase() {
            b'0' => Ok(imm_op | x << 8 | self.hex_operand(2)?),
            b'V' => Ok(reg_op | x << 8 | self.register()? << 4),
            _ => Err(asm_bad_operand(self.cur.pos(), self.src)),
        }
    }

    fn mov(&mut self) -> Result<u16> {
        self.cur.skip_trivia();
        match self.cur.peek().to_ascii_uppercase() {
            b'I' => {
                self.cur.bump();
                Ok(0xA000 | self.hex_operand(3)?)
            }
            b'D' => {
                self.keyword("DT")?;
                Ok(0xF015 | self.register()? << 8)
            }
            b'S' => {
                self.keyword("ST")?;
                Ok(0xF018 | self.register()? << 8)
            }
            b'V' => {
                let x = self.register()?;
                self.cur.skip_trivia();
                match self.cur.peek().to_ascii_uppercase() {
                    b'0' => Ok(0x6000 | x << 8 | self.hex_operand(2)?),
                    b'V' => Ok(0x8000 | x << 8 | self.register()? << 4),
                    b'D' => {
                        self.keyword("DT")?;
                        Ok(0xF007 | x << 8)
                    }
                    _ => Err(asm_bad_operand(self.cur.pos(), self.src)),
                }
            }
            _ => Err(asm_bad_operand(self.cur.pos(), self.src)),
        }
    }

    fn add(&mut self) -> Result<u16> {
        self.cur.skip_trivia();
        match self.cur.peek().to_ascii_uppercase() {
            b'I' => {
                self.cur.bump();
                Ok(0xF01E | self.register()? << 8)
            }
            b'V' => {
                let x = self.register()?;
                self.cur.skip_trivia();
                match self.cur.peek().to_ascii_uppercase() {
                    b'0' => Ok(0x7000 | x << 8 | self.hex_operand(2)?),
                    b'V' => Ok(0x8004 | x << 8 | self.register()? << 4),
                    _ => Err(asm_bad_operand(self.cur.pos(), self.src)),
                }
            }
            _ => Err(asm_bad_operand(self.cur.pos(), self.src)),
        }
    }

    /// `VX VY` operand pair, positioned into the X and Y opcode fields.
    fn register_pair(&mut self) -> Result<u16> {
        let x = self.register()?;
        let y = self.register()?;
        Ok(x << 8 | y << 4)
    }

    /// Consume an exact keyword operand, case-insensitively.
    fn keyword(&mut self, word: &str) -> Result<()> {
        let at = self.cur.pos();
        for expect in word.bytes() {
            if self.cur.bump().to_ascii_uppercase() != expect {
                return Err(asm_bad_operand(at, self.src));
            }
        }
        Ok(())
    }

    fn register(&mut self) -> Result<u16> {
        self.cur.skip_trivia();
        let at = self.cur.pos();
        if self.cur.bump().to_ascii_uppercase() != b'V' {
            return Err(asm_bad_register(at, self.src));
        }
        self.hex_digits(1)
    }

    /// A `0x`-prefixed literal with an exact digit count.
    fn hex_operand(&mut self, digits: u32) -> Result<u16> {
        self.cur.skip_trivia();
        let at = self.cur.pos();
        if self.cur.bump() != b'0' || !matches!(self.cur.peek(), b'x' | b'X') {
            return Err(asm_bad_number(at, self.src));
        }
        self.cur.bump();
        self.hex_digits(digits)
    }

    fn hex_digits(&mut self, digits: u32) -> Result<u16> {
        let mut value: u16 = 0;
        for _ in 0..digits {
            let digit = (self.cur.peek() as char)
                .to_digit(16)
                .ok_or_else(|| asm_bad_hex(self.cur.pos(), self.src))?;
            value = value << 4 | digit as u16;
            self.cur.bump();
        }
        Ok(value)
    }

    /// A bare label reference. Resolves immediately when the label is
    /// already declared, otherwise records the reference site and emits a
    /// zero placeholder for the backpatch pass.
    fn label_ref(&mut self, loc: u16) -> u16 {
        let start = self.cur.pos();
        while self.cur.peek().is_ascii_alphabetic() {
            self.cur.bump();
        }
        let name = &self.src[start..self.cur.pos()];
        if let Some(&address) = self.labels.get(name) {
            return address;
        }
        if let Some(sites) = self.pending.get_mut(name) {
            sites.push(loc);
        } else {
            self.pending.insert(name.to_owned(), vec![loc]);
        }
        0
    }

    fn backpatch(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        for (name, sites) in pending.iter() {
            let address = *self
                .labels
                .get(name)
                .ok_or_else(|| asm_unresolved_label(name))?;
            for &site in sites {
                self.mem[site as usize] |= (address >> 8) as u8;
                self.mem[site as usize + 1] |= (address & 0xFF) as u8;
            }
        }
        Ok(())
    }

    fn write_byte(&mut self, loc: &mut u16, byte: u8) {
        self.mem[*loc as usize] = byte;
        *loc += 1;
        if *loc > self.end {
            self.end = *loc;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(src: &str) -> Vec<u8> {
        Assembler::new(src).assemble().unwrap()
    }

    /// First emitted opcode of a one-line text section.
    fn first_opcode(line: &str) -> u16 {
        let bytes = image(&format!("section .text:\n    {line}"));
        u16::from_be_bytes([bytes[0], bytes[1]])
    }

    #[test]
    fn emits_every_mnemonic_template() {
        let cases = [
            ("NOP", 0x0001),
            ("EXT", 0x0002),
            ("CLS", 0x00E0),
            ("TGS", 0x00E1),
            ("RET", 0x00EE),
            ("JMP 0x400", 0x1400),
            ("CAL 0x2F0", 0x22F0),
            ("SKE V1 0x05", 0x3105),
            ("SKE V1 V2", 0x5120),
            ("SKNE V1 0x05", 0x4105),
            ("SKNE V1 V2", 0x9120),
            ("MOV V4 0x2A", 0x642A),
            ("MOV V4 V5", 0x8450),
            ("MOV I 0x2F5", 0xA2F5),
            ("MOV V2 DT", 0xF207),
            ("MOV DT V2", 0xF215),
            ("MOV ST V2", 0xF218),
            ("ADD V1 0x10", 0x7110),
            ("ADD V1 V2", 0x8124),
            ("ADD I V3", 0xF31E),
            ("MOVO V1 V2", 0x8121),
            ("MOVA V1 V2", 0x8122),
            ("MOVX V1 V2", 0x8123),
            ("SUB V1 V2", 0x8125),
            ("STLS V1 V2", 0x8126),
            ("MOVS V1 V2", 0x8127),
            ("STMS V1 V2", 0x812E),
            ("JRB 0x300", 0xB300),
            ("RND V3 0x7F", 0xC37F),
            ("DSP V1 V2 0x05", 0xD125),
            ("SKP V1", 0xE19E),
            ("SKNP V1", 0xE1A1),
            ("PRT V1", 0xF100),
            ("STK V1", 0xF10A),
            ("STBC V1", 0xF133),
            ("STMR V1 V2", 0xF175),
            ("FMR V1", 0xF165),
        ];
        for (line, expected) in cases {
            assert_eq!(first_opcode(line), expected, "for `{line}`");
        }
    }

    #[test]
    fn mnemonics_are_case_insensitive() {
        assert_eq!(first_opcode("mov v4 0x2a"), 0x642A);
        assert_eq!(first_opcode("sKnE va vb"), 0x9AB0);
    }

    #[test]
    fn raw_words_pass_through() {
        assert_eq!(first_opcode("0xD015"), 0xD015);
    }

    #[test]
    fn raw_zero_word_ends_the_program() {
        let bytes = image("section .text:\n    NOP\n    0x0000");
        assert_eq!(bytes, vec![0x00, 0x01]);
    }

    #[test]
    fn display_height_is_masked_to_a_nibble() {
        assert_eq!(first_opcode("DSP V1 V2 0xF5"), 0xD125);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let bytes = image("# header\nsection .text:\n    # only a nop\n    NOP\n");
        assert_eq!(bytes, vec![0x00, 0x01]);
    }

    #[test]
    fn backward_label_reference_resolves_inline() {
        let bytes = image("section .text:\n_top:\n    NOP\n    JMP top");
        assert_eq!(bytes, vec![0x00, 0x01, 0x12, 0x00]);
    }

    #[test]
    fn forward_reference_matches_backward_reference() {
        let forward = image("section .text:\n    JMP end\n    NOP\n_end:\n    EXT");
        let backward = {
            // same program with the jump target resolvable on sight
            let src = "section .text:\n    JMP 0x204\n    NOP\n_end:\n    EXT";
            image(src)
        };
        assert_eq!(forward, backward);
        assert_eq!(forward, vec![0x12, 0x04, 0x00, 0x01, 0x00, 0x02]);
    }

    #[test]
    fn unresolved_label_is_an_error() {
        let err = Assembler::new("section .text:\n    JMP nowhere")
            .assemble()
            .unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn data_without_origin_sits_two_bytes_past_text() {
        let bytes = image("section .text:\n    EXT\nsection .data:\n    0xAB 0xCD");
        assert_eq!(bytes, vec![0x00, 0x02, 0x00, 0x00, 0xAB, 0xCD]);
    }

    #[test]
    fn data_origin_zero_fills_the_gap() {
        let bytes = image("section .text:\n    EXT\nsection .data:\n    org 0x208\n    0xAB");
        assert_eq!(bytes.len(), 9);
        assert_eq!(&bytes[..2], &[0x00, 0x02]);
        assert_eq!(bytes[8], 0xAB);
    }

    #[test]
    fn data_origin_may_not_collide_with_text() {
        let err = Assembler::new("section .text:\n    NOP\n    NOP\nsection .data:\n    org 0x202")
            .assemble()
            .unwrap_err();
        assert!(err.to_string().contains("origin"));
    }

    #[test]
    fn data_overflowing_memory_is_an_error() {
        let err = Assembler::new(
            "section .text:\n    EXT\nsection .data:\n    org 0xFFE\n    0xAB 0xCD",
        )
        .assemble()
        .unwrap_err();
        assert!(err.to_string().contains("fit in memory"));
    }

    #[test]
    fn data_must_follow_text() {
        assert!(Assembler::new("section .data:\n    0x01").assemble().is_err());
        assert!(
            Assembler::new("section .text:\n    EXT\nsection .text:\n    EXT")
                .assemble()
                .is_err()
        );
    }

    #[test]
    fn missing_section_keyword_is_an_error() {
        assert!(Assembler::new("MOV V0 0x01").assemble().is_err());
        assert!(Assembler::new("section .bss:\n").assemble().is_err());
    }

    #[test]
    fn malformed_operands_are_errors() {
        for src in [
            "section .text:\n    MOV V0 0xG1",
            "section .text:\n    MOV W0 0x01",
            "section .text:\n    MOV V0",
            "section .text:\n    FROB V0",
            "section .text:\n_bad1:\n    NOP",
        ] {
            assert!(Assembler::new(src).assemble().is_err(), "for `{src}`");
        }
    }

    #[test]
    fn empty_source_assembles_to_nothing() {
        assert!(image("").is_empty());
        assert!(image("# nothing but comments\n").is_empty());
    }
}
