use std::io::Write;
use std::time::Duration;

use minifb::{Key, KeyRepeat, Scale, ScaleMode, Window, WindowOptions};

use crate::error::FrontendError;
use crate::keyboard::{key_ascii, key_code, Keys};
use crate::runtime::{FrameBuffer, DISPLAY_HEIGHT, DISPLAY_WIDTH};

const PIXEL_ON: u32 = 0xFFFF_FFFF;
const PIXEL_OFF: u32 = 0xFF00_0000;

/// Everything the emulator loop needs from the host: frame presentation,
/// key state, quit signalling, a blocking key read and a sound cue.
pub trait Frontend {
    /// Poll host events; refreshes the key bitmask and quit flag.
    fn pump(&mut self) -> Result<(), FrontendError>;
    fn keys(&self) -> Keys;
    fn quit_requested(&self) -> bool;
    /// Block until a hex key goes down, returning its ASCII code, or
    /// `None` when the window is closed while waiting.
    fn await_key(&mut self) -> Result<Option<u8>, FrontendError>;
    fn present(&mut self, fb: &FrameBuffer) -> Result<(), FrontendError>;
    fn beep(&mut self);
}

/// minifb-backed frontend. Escape or closing the window requests a quit.
pub struct Screen {
    window: Window,
    buffer: Vec<u32>,
    keys: Keys,
    quit: bool,
}

impl Screen {
    pub fn open() -> Result<Self, FrontendError> {
        let window = Window::new(
            "ocho",
            DISPLAY_WIDTH,
            DISPLAY_HEIGHT,
            WindowOptions {
                resize: true,
                scale: Scale::X8,
                scale_mode: ScaleMode::AspectRatioStretch,
                ..WindowOptions::default()
            },
        )
        .map_err(FrontendError::from)?;
        Ok(Screen {
            window,
            buffer: vec![PIXEL_OFF; DISPLAY_WIDTH * DISPLAY_HEIGHT],
            keys: Keys::default(),
            quit: false,
        })
    }

    fn closed(&self) -> bool {
        !self.window.is_open() || self.window.is_key_down(Key::Escape)
    }
}

impl Frontend for Screen {
    fn pump(&mut self) -> Result<(), FrontendError> {
        self.window.update();
        self.quit = self.closed();
        self.keys = Keys::default();
        for key in self.window.get_keys() {
            if let Some(code) = key_code(key) {
                self.keys.press(code);
            }
        }
        Ok(())
    }

    fn keys(&self) -> Keys {
        self.keys
    }

    fn quit_requested(&self) -> bool {
        self.quit
    }

    fn await_key(&mut self) -> Result<Option<u8>, FrontendError> {
        loop {
            self.window.update();
            if self.closed() {
                self.quit = true;
                return Ok(None);
            }
            for key in self.window.get_keys_pressed(KeyRepeat::No) {
                if let Some(code) = key_code(key) {
                    return Ok(Some(key_ascii(code)));
                }
            }
            spin_sleep::sleep(Duration::from_millis(16));
        }
    }

    fn present(&mut self, fb: &FrameBuffer) -> Result<(), FrontendError> {
        for y in 0..DISPLAY_HEIGHT {
            for x in 0..DISPLAY_WIDTH {
                self.buffer[y * DISPLAY_WIDTH + x] =
                    if fb.get(x, y) { PIXEL_ON } else { PIXEL_OFF };
            }
        }
        self.window
            .update_with_buffer(&self.buffer, DISPLAY_WIDTH, DISPLAY_HEIGHT)
            .map_err(FrontendError::from)
    }

    fn beep(&mut self) {
        // terminal bell in lieu of audio synthesis
        print!("\x07");
        let _ = std::io::stdout().flush();
    }
}
