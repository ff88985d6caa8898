use minifb::Key;

/// Pressed-key state, one bit per hex key code 0x0-0xF.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Keys(u16);

impl Keys {
    #[inline]
    pub fn press(&mut self, code: u8) {
        self.0 |= 1 << code;
    }

    #[inline]
    pub fn release(&mut self, code: u8) {
        self.0 &= !(1 << code);
    }

    #[inline]
    pub fn pressed(&self, code: u8) -> bool {
        self.0 & (1 << code) != 0
    }
}

/// Host key to hex key code, using the usual 4x4 block under the number
/// row:
///
/// ```text
/// 1 2 3 4        1 2 3 C
/// Q W E R   ->   4 5 6 D
/// A S D F        7 8 9 E
/// Z X C V        A 0 B F
/// ```
pub fn key_code(key: Key) -> Option<u8> {
    let code = match key {
        Key::Key1 => 0x1,
        Key::Key2 => 0x2,
        Key::Key3 => 0x3,
        Key::Key4 => 0xC,
        Key::Q => 0x4,
        Key::W => 0x5,
        Key::E => 0x6,
        Key::R => 0xD,
        Key::A => 0x7,
        Key::S => 0x8,
        Key::D => 0x9,
        Key::F => 0xE,
        Key::Z => 0xA,
        Key::X => 0x0,
        Key::C => 0xB,
        Key::V => 0xF,
        _ => return None,
    };
    Some(code)
}

/// ASCII form of a hex key code, as `STK` stores and the glyph lookup
/// opcode expects.
pub fn key_ascii(code: u8) -> u8 {
    if code < 10 {
        b'0' + code
    } else {
        b'A' + code - 10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmask_round_trip() {
        let mut keys = Keys::default();
        keys.press(0x0);
        keys.press(0xF);
        assert!(keys.pressed(0x0));
        assert!(keys.pressed(0xF));
        assert!(!keys.pressed(0x7));
        keys.release(0xF);
        assert!(!keys.pressed(0xF));
        assert!(keys.pressed(0x0));
    }

    #[test]
    fn layout_covers_all_sixteen_codes() {
        let mut seen = Keys::default();
        for key in [
            Key::Key1,
            Key::Key2,
            Key::Key3,
            Key::Key4,
            Key::Q,
            Key::W,
            Key::E,
            Key::R,
            Key::A,
            Key::S,
            Key::D,
            Key::F,
            Key::Z,
            Key::X,
            Key::C,
            Key::V,
        ] {
            seen.press(key_code(key).unwrap());
        }
        assert!((0..16).all(|code| seen.pressed(code)));
        assert_eq!(key_code(Key::Space), None);
    }

    #[test]
    fn ascii_codes_match_the_glyph_convention() {
        assert_eq!(key_ascii(0x0), b'0');
        assert_eq!(key_ascii(0x9), b'9');
        assert_eq!(key_ascii(0xA), b'A');
        assert_eq!(key_ascii(0xF), b'F');
    }
}
