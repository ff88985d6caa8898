// Assembling
mod assembler;
pub use assembler::Assembler;
mod cursor;
mod table;
pub use table::{fnv1a, Table};

// Running
mod runtime;
pub use runtime::{Emulator, Flow, FrameBuffer, Machine, DISPLAY_HEIGHT, DISPLAY_WIDTH};
mod display;
pub use display::{Frontend, Screen};
mod keyboard;
pub use keyboard::Keys;

pub mod error;

/// First byte of the program area; everything below it is reserved for
/// the interpreter and the glyph sprites.
pub const PROGRAM_START: u16 = 0x200;

/// Total addressable memory.
pub const MEMORY_SIZE: usize = 0x1000;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 4;
