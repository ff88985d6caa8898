use std::io::Write;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::display::Frontend;
use crate::error::{EmuError, ExecError, OversizeImage};
use crate::keyboard::Keys;
use crate::{MEMORY_SIZE, PROGRAM_START};

pub const DISPLAY_WIDTH: usize = 64;
pub const DISPLAY_HEIGHT: usize = 32;

const STACK_DEPTH: usize = 16;
const GLYPH_START: usize = 0x50;

/// Instruction slots in the program area; the program counter halts past
/// the last one.
const SLOT_LIMIT: u16 = ((MEMORY_SIZE - PROGRAM_START as usize) / 2) as u16;

/// Instruction clock. Timers tick and the frame is presented every
/// `TIMER_DIVIDER`th cycle, giving the usual 60 Hz.
const CLOCK_HZ: f64 = 600.0;
const TIMER_DIVIDER: u64 = 10;

/// Built-in hex digit sprites, five bytes per glyph, installed at 0x50.
const GLYPH_SPRITES: [u8; 80] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

/// 64x32 monochrome framebuffer. Sprites XOR into it.
pub struct FrameBuffer {
    pixels: [[bool; DISPLAY_WIDTH]; DISPLAY_HEIGHT],
}

impl FrameBuffer {
    fn new() -> Self {
        FrameBuffer {
            pixels: [[false; DISPLAY_WIDTH]; DISPLAY_HEIGHT],
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.pixels[y][x]
    }

    #[inline]
    fn toggle(&mut self, x: usize, y: usize) {
        self.pixels[y][x] = !self.pixels[y][x];
    }

    fn clear(&mut self) {
        self.pixels = [[false; DISPLAY_WIDTH]; DISPLAY_HEIGHT];
    }

    fn invert(&mut self) {
        for row in self.pixels.iter_mut() {
            for pixel in row.iter_mut() {
                *pixel = !*pixel;
            }
        }
    }
}

/// What a single cycle asks of the driver loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halt,
    /// `STK`: block for a key and store its ASCII code in register `dest`.
    AwaitKey { dest: usize },
}

/// Bounded return-address stack.
struct CallStack {
    slots: [u16; STACK_DEPTH],
    depth: usize,
}

impl CallStack {
    fn new() -> Self {
        CallStack {
            slots: [0; STACK_DEPTH],
            depth: 0,
        }
    }

    fn push(&mut self, slot: u16) -> Result<(), ExecError> {
        if self.depth == STACK_DEPTH {
            return Err(ExecError::StackOverflow);
        }
        self.slots[self.depth] = slot;
        self.depth += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<u16, ExecError> {
        if self.depth == 0 {
            return Err(ExecError::StackUnderflow);
        }
        self.depth -= 1;
        Ok(self.slots[self.depth])
    }
}

/// The virtual machine proper: 4 KiB of memory with the glyph sprites at
/// 0x50, sixteen registers, the index register, a slot-indexed program
/// counter and both timers. [`Machine::step`] runs one
/// fetch-decode-execute cycle; timers are ticked separately by the driver.
pub struct Machine {
    mem: Box<[u8; MEMORY_SIZE]>,
    v: [u8; 16],
    i: u16,
    /// Slot index into the program area: byte address `0x200 + 2 * pc`.
    pc: u16,
    stack: CallStack,
    delay: u8,
    sound: u8,
    fb: FrameBuffer,
}

impl Machine {
    pub fn new() -> Self {
        let mut mem = Box::new([0u8; MEMORY_SIZE]);
        mem[GLYPH_START..GLYPH_START + GLYPH_SPRITES.len()].copy_from_slice(&GLYPH_SPRITES);
        Machine {
            mem,
            v: [0; 16],
            i: 0,
            pc: 0,
            stack: CallStack::new(),
            delay: 0,
            sound: 0,
            fb: FrameBuffer::new(),
        }
    }

    /// Copy a program image to 0x200.
    pub fn load_image(&mut self, image: &[u8]) -> Result<(), OversizeImage> {
        let max = MEMORY_SIZE - PROGRAM_START as usize;
        if image.len() > max {
            return Err(OversizeImage {
                len: image.len(),
                max,
            });
        }
        let start = PROGRAM_START as usize;
        self.mem[start..start + image.len()].copy_from_slice(image);
        Ok(())
    }

    pub fn framebuffer(&self) -> &FrameBuffer {
        &self.fb
    }

    pub fn set_register(&mut self, index: usize, value: u8) {
        self.v[index] = value;
    }

    /// One fetch-decode-execute cycle. Halts cleanly on a zero opcode or
    /// once the program counter leaves the program area.
    pub fn step(&mut self, keys: Keys) -> Result<Flow, ExecError> {
        if self.pc >= SLOT_LIMIT {
            return Ok(Flow::Halt);
        }
        let base = PROGRAM_START as usize + self.pc as usize * 2;
        let opcode = u16::from_be_bytes([self.mem[base], self.mem[base + 1]]);
        if opcode == 0 {
            return Ok(Flow::Halt);
        }
        let flow = self.execute(opcode, keys)?;
        self.pc = self.pc.wrapping_add(1);
        Ok(flow)
    }

    /// Decrement both timers; returns whether the sound timer was live
    /// (the driver beeps on true).
    pub fn tick_timers(&mut self) -> bool {
        if self.delay > 0 {
            self.delay -= 1;
        }
        if self.sound > 0 {
            self.sound -= 1;
            true
        } else {
            false
        }
    }

    fn execute(&mut self, opcode: u16, keys: Keys) -> Result<Flow, ExecError> {
        let x = ((opcode & 0x0F00) >> 8) as usize;
        let y = ((opcode & 0x00F0) >> 4) as usize;
        let nn = (opcode & 0x00FF) as u8;
        let nnn = opcode & 0x0FFF;
        match opcode & 0xF000 {
            0x0000 => match nnn {
                // NOP
                0x001 => {}
                // EXT
                0x002 => return Ok(Flow::Halt),
                0x0E0 => self.fb.clear(),
                0x0E1 => self.fb.invert(),
                0x0EE => self.pc = self.stack.pop()?,
                _ => return Err(ExecError::UnknownOpcode(opcode)),
            },
            0x1000 => self.pc = slot_of(nnn).wrapping_sub(1),
            // CAL operands are already slot indices, unlike JMP targets
            0x2000 => {
                self.stack.push(self.pc)?;
                self.pc = nnn;
            }
            0x3000 => {
                if self.v[x] == nn {
                    self.skip();
                }
            }
            0x4000 => {
                if self.v[x] != nn {
                    self.skip();
                }
            }
            // register-to-register skips require a zero low nibble
            0x5000 => {
                if opcode & 0x000F != 0 {
                    return Err(ExecError::UnknownOpcode(opcode));
                }
                if self.v[x] == self.v[y] {
                    self.skip();
                }
            }
            0x6000 => self.v[x] = nn,
            0x7000 => self.v[x] = self.v[x].wrapping_add(nn),
            0x8000 => self.alu(opcode, x, y)?,
            0x9000 => {
                if opcode & 0x000F != 0 {
                    return Err(ExecError::UnknownOpcode(opcode));
                }
                if self.v[x] != self.v[y] {
                    self.skip();
                }
            }
            0xA000 => self.i = nnn,
            0xB000 => self.pc = slot_of(nnn.wrapping_add(self.v[0] as u16)).wrapping_sub(1),
            0xC000 => self.v[x] = rand::thread_rng().gen::<u8>() & nn,
            0xD000 => self.draw(x, y, (opcode & 0x000F) as usize),
            0xE000 => match nn {
                0x9E => {
                    if self.v[x] <= 0xF && keys.pressed(self.v[x]) {
                        self.skip();
                    }
                }
                0xA1 => {
                    if self.v[x] <= 0xF && !keys.pressed(self.v[x]) {
                        self.skip();
                    }
                }
                _ => return Err(ExecError::UnknownOpcode(opcode)),
            },
            0xF000 => return self.misc(opcode, x, nn),
            _ => unreachable!(),
        }
        Ok(Flow::Continue)
    }

    fn alu(&mut self, opcode: u16, x: usize, y: usize) -> Result<(), ExecError> {
        match opcode & 0x000F {
            0x0 => self.v[x] = self.v[y],
            0x1 => self.v[x] |= self.v[y],
            0x2 => self.v[x] &= self.v[y],
            0x3 => self.v[x] ^= self.v[y],
            // The carry flag is only ever set here, never cleared, and the
            // comparison is against the wrapped result rather than the
            // operand range. Kept exactly as the dialect defines it.
            0x4 => {
                let result = self.v[x].wrapping_add(self.v[y]);
                if result > result.wrapping_sub(self.v[x]) {
                    self.v[0xF] = 1;
                }
                self.v[x] = result;
            }
            0x5 => {
                let result = self.v[x].wrapping_sub(self.v[y]);
                if result < result.wrapping_sub(self.v[x]) {
                    self.v[0xF] = 1;
                }
                self.v[x] = result;
            }
            0x7 => {
                let result = self.v[y].wrapping_sub(self.v[x]);
                if result > result.wrapping_sub(self.v[x]) {
                    self.v[0xF] = 1;
                }
                self.v[x] = result;
            }
            // both shifts copy the low bit into VF
            0x6 => {
                self.v[0xF] = self.v[x] & 1;
                self.v[x] >>= 1;
            }
            0xE => {
                self.v[0xF] = self.v[x] & 1;
                self.v[x] <<= 1;
            }
            _ => return Err(ExecError::UnknownOpcode(opcode)),
        }
        Ok(())
    }

    fn misc(&mut self, opcode: u16, x: usize, nn: u8) -> Result<Flow, ExecError> {
        match nn {
            0x00 => emit_char(&mut std::io::stdout(), self.v[x]),
            0x07 => self.v[x] = self.delay,
            0x0A => return Ok(Flow::AwaitKey { dest: x }),
            0x15 => self.delay = self.v[x],
            0x18 => self.sound = self.v[x],
            0x1E => self.i = self.i.wrapping_add(self.v[x] as u16),
            // glyph lookup takes the ASCII code of a hex digit
            0x29 => {
                self.i = match self.v[x] {
                    ch @ b'0'..=b'9' => GLYPH_START as u16 + 5 * (ch - b'0') as u16,
                    ch @ b'A'..=b'F' => GLYPH_START as u16 + 5 * (ch - 0x37) as u16,
                    _ => return Err(ExecError::InvalidOperand(opcode)),
                };
            }
            0x33 => {
                let value = self.v[x];
                self.write_mem(self.i, value / 100);
                self.write_mem(self.i.wrapping_add(1), value / 10 % 10);
                self.write_mem(self.i.wrapping_add(2), value % 10);
            }
            0x55 => {
                for offset in 0..=x {
                    self.write_mem(self.i.wrapping_add(offset as u16), self.v[offset]);
                }
            }
            0x65 => {
                for offset in 0..=x {
                    self.v[offset] = self.read_mem(self.i.wrapping_add(offset as u16));
                }
            }
            _ => return Err(ExecError::UnknownOpcode(opcode)),
        }
        Ok(Flow::Continue)
    }

    /// `DXYN`. Rows come from memory at `I`, wrapping at the end of
    /// memory; coordinates wrap around the screen edges. `VF` reports a
    /// collision with any previously-set pixel. Bit 7 of each row lands
    /// one pixel right of `VX` and bit 0 is never drawn, matching the
    /// dialect's row indexing.
    fn draw(&mut self, x: usize, y: usize, height: usize) {
        self.v[0xF] = 0;
        let mut collided = false;
        for row in 0..height {
            let byte = self.read_mem(self.i.wrapping_add(row as u16));
            for col in 1..8 {
                if (byte >> (8 - col)) & 1 == 0 {
                    continue;
                }
                let px = (self.v[x] as usize + col) & (DISPLAY_WIDTH - 1);
                let py = (self.v[y] as usize + row) & (DISPLAY_HEIGHT - 1);
                if !collided && self.fb.get(px, py) {
                    self.v[0xF] = 1;
                    collided = true;
                }
                self.fb.toggle(px, py);
            }
        }
    }

    #[inline]
    fn skip(&mut self) {
        self.pc = self.pc.wrapping_add(1);
    }

    #[inline]
    fn read_mem(&self, addr: u16) -> u8 {
        self.mem[addr as usize & (MEMORY_SIZE - 1)]
    }

    #[inline]
    fn write_mem(&mut self, addr: u16, value: u8) {
        self.mem[addr as usize & (MEMORY_SIZE - 1)] = value;
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte address to program-counter slot.
#[inline]
fn slot_of(addr: u16) -> u16 {
    addr.wrapping_sub(PROGRAM_START) / 2
}

/// `PRT` writes the register verbatim, one raw byte, not a UTF-8
/// encoding of it.
fn emit_char(out: &mut impl Write, byte: u8) {
    let _ = out.write_all(&[byte]);
    let _ = out.flush();
}

/// Drives a [`Machine`] against a [`Frontend`] at the instruction clock,
/// ticking timers and presenting the framebuffer on cycle zero and every
/// tenth cycle after.
pub struct Emulator<F: Frontend> {
    machine: Machine,
    frontend: F,
}

impl<F: Frontend> Emulator<F> {
    pub fn new(machine: Machine, frontend: F) -> Self {
        Emulator { machine, frontend }
    }

    pub fn run(&mut self) -> Result<(), EmuError> {
        let cycle = Duration::from_secs_f64(1.0 / CLOCK_HZ);
        let mut cycles: u64 = 0;
        loop {
            let started = Instant::now();
            self.frontend.pump()?;
            if self.frontend.quit_requested() {
                return Ok(());
            }
            match self.machine.step(self.frontend.keys())? {
                Flow::Continue => {}
                Flow::Halt => return Ok(()),
                Flow::AwaitKey { dest } => match self.frontend.await_key()? {
                    Some(ascii) => self.machine.set_register(dest, ascii),
                    // window closed while waiting
                    None => return Ok(()),
                },
            }
            if cycles % TIMER_DIVIDER == 0 {
                if self.machine.tick_timers() {
                    self.frontend.beep();
                }
                self.frontend.present(self.machine.framebuffer())?;
            }
            cycles += 1;
            // overruns are not repaid on later cycles
            let elapsed = started.elapsed();
            if elapsed < cycle {
                spin_sleep::sleep(cycle - elapsed);
            }
        }
    }
}
