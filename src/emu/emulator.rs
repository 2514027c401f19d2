use std::{collections::VecDeque, io::Write};

use anyhow::{Error, Result};

use crate::plat::{Instruction, Opcode, Register};

use super::{
    alu::{self, AluOp, AluOutput},
    interrupts::InterruptState,
    ram::Memory,
    registers::{EmuRegisters, Fl},
    EmuError, ADDRESS_SPACE, INTERRUPT_LINES,
};

/// How many executed instructions are remembered for backtraces.
const HISTORY_LEN: usize = 256;

/// The emulator's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmuState {
    /// The emulator is allowed to run.
    Continue,
    /// Stops execution and hands control to the debugger, but doesn't put the emulator in a hard, unrecoverable [`Halt`][EmuState::Halt] state.
    Pause,
    /// Halt execution. Only [`reset`](Emulator::reset) leaves this state.
    Halt,
}

/// Outcome of a single [`step`](Emulator::step).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Continue,
    Halted,
}

/// The main emulation context for the LS-8.
///
/// Memory is anything implementing [Memory], including a `&mut` borrow of a store
/// owned elsewhere. `PRN` and `PRA` write their output, one item per line, to `W`.
pub struct Emulator<M: Memory, W: Write> {
    pub registers: EmuRegisters,
    pub ram: M,
    pub state: EmuState,
    pub interrupts: InterruptState,
    /// Recently executed instructions along with their addresses, oldest first.
    pub instr_history: VecDeque<(u8, Instruction)>,
    /// The error that halted the machine, if any.
    pub fault: Option<EmuError>,
    output: W,
}

impl<M: Memory, W: Write> Emulator<M, W> {
    /// Creates a new [Emulator] in its power-on state over the given memory.
    ///
    /// # Errors
    ///
    /// This function will return an error if `ram` cannot hold the whole address space.
    pub fn new(ram: M, output: W) -> Result<Self> {
        if ram.size() < ADDRESS_SPACE {
            return Err(Error::from(EmuError::AddressOutOfRange { size: ram.size() }));
        }
        Ok(Self {
            registers: EmuRegisters::new(),
            ram,
            state: EmuState::Continue,
            interrupts: InterruptState::Armed,
            instr_history: VecDeque::new(),
            fault: None,
            output,
        })
    }

    /// Puts the CPU back into its power-on state. Memory is left as is.
    pub fn reset(&mut self) {
        self.registers.reset();
        self.state = EmuState::Continue;
        self.interrupts = InterruptState::Armed;
        self.instr_history.clear();
        self.fault = None;
    }

    /// Stores a byte in memory. Meant for loading programs before execution starts.
    pub fn load_byte(&mut self, addr: u8, value: u8) {
        self.ram.write(addr as usize, value);
    }

    /// Copies a program image into memory, starting at address 0.
    pub fn load_program(&mut self, program: &[u8]) -> Result<()> {
        if program.len() > ADDRESS_SPACE {
            return Err(Error::from(EmuError::ProgramTooLarge(program.len())));
        }
        for (addr, byte) in program.iter().enumerate() {
            self.ram.write(addr, *byte);
        }
        log::debug!("loaded {} byte program", program.len());
        Ok(())
    }

    /// Executes exactly one instruction, or services one pending interrupt.
    ///
    /// A fatal error halts the machine with PC and IR left at the failing instruction,
    /// and is returned. Stepping a halted machine does nothing.
    pub fn step(&mut self) -> Result<StepResult> {
        if self.state == EmuState::Halt {
            return Ok(StepResult::Halted);
        }
        self.try_step().map_err(|e| {
            log::error!(
                "halting at pc={:#04x} ir={:#010b}: {}",
                self.registers.pc,
                self.registers.ir,
                e
            );
            self.state = EmuState::Halt;
            self.fault = e.downcast_ref::<EmuError>().cloned();
            e
        })
    }

    fn try_step(&mut self) -> Result<StepResult> {
        if self.service_interrupt() {
            return Ok(StepResult::Continue);
        }

        let pc = self.registers.pc;
        let ir = self.read(pc);
        self.registers.ir = ir;
        let op = Opcode::try_from(ir).map_err(|e| EmuError::from_decode(e, pc))?;
        let mut bytes = [ir, 0, 0];
        for i in 1..op.size() {
            bytes[i as usize] = self.read(pc.wrapping_add(i));
        }
        let instr = Instruction::from_bytes(bytes).map_err(|e| EmuError::from_decode(e, pc))?;
        log::trace!("[pc={:#04x}] {}", pc, instr);
        if self.instr_history.len() == HISTORY_LEN {
            self.instr_history.pop_front();
        }
        self.instr_history.push_back((pc, instr));

        self.registers.pc = match self.execute(instr)? {
            Some(dest) => dest,
            None => pc.wrapping_add(instr.size()),
        };

        if self.state == EmuState::Halt {
            Ok(StepResult::Halted)
        } else {
            Ok(StepResult::Continue)
        }
    }

    /// Runs a decoded instruction, returning the new PC if it transfers control.
    fn execute(&mut self, instr: Instruction) -> Result<Option<u8>> {
        let next = match instr.op {
            Opcode::Nop => None,
            Opcode::Hlt => {
                self.state = EmuState::Halt;
                None
            }
            Opcode::Ret => Some(self.pop()),
            Opcode::Iret => Some(self.return_from_interrupt()),
            Opcode::Pra => {
                let value = self.registers.get(instr.reg()?);
                writeln!(self.output, "{}", char::from(value))?;
                None
            }
            Opcode::Prn => {
                let value = self.registers.get(instr.reg()?);
                writeln!(self.output, "{}", value)?;
                None
            }
            Opcode::Call => {
                let reg = instr.reg()?;
                self.push(self.registers.pc.wrapping_add(2));
                Some(self.registers.get(reg))
            }
            Opcode::Int => {
                let line = self.registers.get(instr.reg()?) & (INTERRUPT_LINES - 1);
                self.registers.is |= 1 << line;
                None
            }
            Opcode::Pop => {
                let reg = instr.reg()?;
                let value = self.pop();
                self.registers.set(reg, value);
                None
            }
            Opcode::Push => {
                let value = self.registers.get(instr.reg()?);
                self.push(value);
                None
            }
            Opcode::Jmp => Some(self.registers.get(instr.reg()?)),
            Opcode::Jeq => self.jump_if(self.registers.fl.contains(Fl::EQ), instr.reg()?),
            Opcode::Jne => self.jump_if(!self.registers.fl.contains(Fl::EQ), instr.reg()?),
            Opcode::Jlt => self.jump_if(self.registers.fl.contains(Fl::LT), instr.reg()?),
            Opcode::Jgt => self.jump_if(self.registers.fl.contains(Fl::GT), instr.reg()?),
            Opcode::Not => self.alu_unary(AluOp::Not, instr)?,
            Opcode::Inc => self.alu_unary(AluOp::Inc, instr)?,
            Opcode::Dec => self.alu_unary(AluOp::Dec, instr)?,
            Opcode::Ld => {
                let (a, b) = instr.regs()?;
                let value = self.read(self.registers.get(b));
                self.registers.set(a, value);
                None
            }
            Opcode::Ldi => {
                let (a, imm) = instr.reg_imm()?;
                self.registers.set(a, imm);
                None
            }
            Opcode::St => {
                let (a, b) = instr.regs()?;
                self.ram
                    .write(self.registers.get(a) as usize, self.registers.get(b));
                None
            }
            Opcode::Cmp => self.alu_binary(AluOp::Cmp, instr)?,
            Opcode::Add => self.alu_binary(AluOp::Add, instr)?,
            Opcode::Sub => self.alu_binary(AluOp::Sub, instr)?,
            Opcode::Mul => self.alu_binary(AluOp::Mul, instr)?,
            Opcode::Div => self.alu_binary(AluOp::Div, instr)?,
            Opcode::Mod => self.alu_binary(AluOp::Mod, instr)?,
            Opcode::Or => self.alu_binary(AluOp::Or, instr)?,
            Opcode::Xor => self.alu_binary(AluOp::Xor, instr)?,
            Opcode::And => self.alu_binary(AluOp::And, instr)?,
        };
        Ok(next)
    }

    fn jump_if(&self, condition: bool, reg: Register) -> Option<u8> {
        condition.then(|| self.registers.get(reg))
    }

    fn alu_unary(&mut self, op: AluOp, instr: Instruction) -> Result<Option<u8>> {
        self.alu(op, instr.reg()?, 0)?;
        Ok(None)
    }

    fn alu_binary(&mut self, op: AluOp, instr: Instruction) -> Result<Option<u8>> {
        let (a, b) = instr.regs()?;
        self.alu(op, a, self.registers.get(b))?;
        Ok(None)
    }

    /// Runs `op` on `dest` and `operand`, storing the result in `dest` (or in FL for comparisons).
    ///
    /// # Errors
    ///
    /// On division by zero `dest` is left untouched.
    pub fn alu(&mut self, op: AluOp, dest: Register, operand: u8) -> Result<(), EmuError> {
        match alu::apply(op, self.registers.get(dest), operand)? {
            AluOutput::Value(value) => self.registers.set(dest, value),
            AluOutput::Flags(fl) => self.registers.fl = fl,
        }
        Ok(())
    }

    /// Decrements SP, then stores `value` at the new top of the stack.
    pub fn push(&mut self, value: u8) {
        let sp = self.registers.sp().wrapping_sub(1);
        self.registers.set_sp(sp);
        self.ram.write(sp as usize, value);
    }

    /// Reads the top of the stack, then increments SP.
    pub fn pop(&mut self) -> u8 {
        let sp = self.registers.sp();
        let value = self.read(sp);
        self.registers.set_sp(sp.wrapping_add(1));
        value
    }

    pub fn read(&self, addr: u8) -> u8 {
        self.ram.read(addr as usize)
    }

    pub fn is_halted(&self) -> bool {
        self.state == EmuState::Halt
    }

    pub fn pc(&self) -> u8 {
        self.registers.pc
    }

    pub fn ir(&self) -> u8 {
        self.registers.ir
    }

    pub fn fl(&self) -> Fl {
        self.registers.fl
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut W {
        &mut self.output
    }

    /// Tears the emulator down, handing back its memory and output sink.
    pub fn into_parts(self) -> (M, W) {
        (self.ram, self.output)
    }
}
