//! The 1802 interpreter: fetch/decode/dispatch, the run loop and reset.

use std::sync::Arc;

use crate::control::CpuControl;
use crate::fault::DecodeFault;
use crate::memory::Memory;
use crate::opcode::{decode, Condition, Opcode};
use crate::ports::{InputPorts, OutputPorts};
use crate::state::{RegisterFile, RunState};
use crate::timing::{cycle_cost, Pacer};

/// The CPU core: register file, cycle counter and run-loop state over
/// externally constructed memory and port collaborators.
///
/// Exactly one logical thread may execute [`step`](Self::step) /
/// [`run`](Self::run) at a time. The machine is `Send` so a host can move
/// it onto a dedicated worker and keep the [`CpuControl`] and
/// [`InputPorts`] handles for itself — while a run is in progress those
/// handles are the only state the host may touch; everything else is
/// reachable again through `&mut self` once the run returns.
#[derive(Debug)]
pub struct Cpu {
    regs: RegisterFile,
    memory: Memory,
    input: Arc<InputPorts>,
    output: OutputPorts,
    control: Arc<CpuControl>,
    cycles: u64,
    idle: bool,
    step_mode: bool,
    stop_after_cycles: Option<u64>,
}

impl Cpu {
    /// Builds a CPU over its collaborators and applies the power-up reset.
    #[must_use]
    pub fn new(memory: Memory, input: Arc<InputPorts>, output: OutputPorts) -> Self {
        let mut cpu = Self {
            regs: RegisterFile::default(),
            memory,
            input,
            output,
            control: Arc::new(CpuControl::new()),
            cycles: 0,
            idle: false,
            step_mode: false,
            stop_after_cycles: None,
        };
        cpu.reset();
        cpu
    }

    /// Applies the control-logic reset: IE on, X, P and R0 zero, cycle
    /// counter zero, idle cleared, Q off.
    ///
    /// Deliberately leaves D, DF, T, R1–R15 and the external flags
    /// untouched: the hardware reset line clears only the control section,
    /// not the data paths.
    pub fn reset(&mut self) {
        self.cycles = 0;
        self.output.set_q(false);
        self.regs.set_ie(true);
        self.regs.set_x(0);
        self.regs.set_p(0);
        self.regs.set_r(0, 0);
        self.idle = false;
    }

    /// Runs the fetch-decode-execute loop until the machine idles, a stop
    /// is requested, or the configured cycle cap is crossed. In
    /// single-step mode, executes exactly one instruction and returns
    /// without pacing.
    ///
    /// # Errors
    ///
    /// Returns the [`DecodeFault`] for an undefined opcode byte. The fault
    /// is fatal to this invocation; the caller owns the transition to
    /// [`RunState::Stopped`] afterwards.
    pub fn run(&mut self) -> Result<(), DecodeFault> {
        self.control.clear_stop();
        let mut pacer = Pacer::start(self.cycles);

        while !self.idle && !self.control.is_stop_requested() {
            self.step()?;

            if self.step_mode {
                break;
            }

            pacer.pace(self.cycles, || self.control.is_stop_requested());

            if self.stop_after_cycles.is_some_and(|cap| self.cycles > cap) {
                self.control.request_stop();
                break;
            }
        }

        Ok(())
    }

    /// Executes exactly one instruction: fetch the byte at R(P), advance
    /// R(P) mod 65536, dispatch, and account its fixed cycle cost.
    ///
    /// # Errors
    ///
    /// Returns the [`DecodeFault`] when the fetched byte is the undefined
    /// opcode.
    pub fn step(&mut self) -> Result<(), DecodeFault> {
        let pc = self.regs.r(self.regs.p());
        let byte = self.memory.get_byte(pc);
        self.regs.set_r(self.regs.p(), pc.wrapping_add(1));

        let opcode = decode(byte).ok_or(DecodeFault::new(byte))?;
        self.execute(opcode);
        self.cycles += cycle_cost(opcode);
        Ok(())
    }

    /// Requests a cooperative stop of the current run.
    pub fn stop(&self) {
        self.control.request_stop();
    }

    /// Returns `true` while no run is in progress or a stop is pending.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.control.is_stop_requested()
    }

    /// Returns `true` once `IDL` has halted the machine.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.idle
    }

    /// Returns the host-observable machine state.
    #[must_use]
    pub fn run_state(&self) -> RunState {
        if self.idle {
            RunState::Idle
        } else if self.control.is_stop_requested() {
            RunState::Stopped
        } else {
            RunState::Running
        }
    }

    /// Switches single-step mode, where each [`run`](Self::run) executes
    /// exactly one instruction and returns without pacing.
    pub const fn set_step_mode(&mut self, enabled: bool) {
        self.step_mode = enabled;
    }

    /// Returns `true` while single-step mode is on.
    #[must_use]
    pub const fn is_step_mode(&self) -> bool {
        self.step_mode
    }

    /// Configures or removes the absolute cycle cap that stops a run once
    /// exceeded. Used for deterministic testing of free-running programs.
    pub const fn set_stop_after_cycles(&mut self, cap: Option<u64>) {
        self.stop_after_cycles = cap;
    }

    /// Drives external flag `index` (`0..=3` selecting EF1–EF4).
    ///
    /// # Panics
    ///
    /// Panics when `index` is not in `0..=3`.
    pub fn set_external_flag(&self, index: usize, value: bool) {
        self.control.set_external_flag(index, value);
    }

    /// Returns the shared handle for cross-thread stop and external-flag
    /// access.
    #[must_use]
    pub fn control(&self) -> Arc<CpuControl> {
        Arc::clone(&self.control)
    }

    /// Returns the shared input-port handle.
    #[must_use]
    pub fn input_ports(&self) -> Arc<InputPorts> {
        Arc::clone(&self.input)
    }

    /// Borrows memory.
    #[must_use]
    pub const fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Mutably borrows memory (program loading, MP latch); only while the
    /// machine is stopped.
    pub const fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Borrows the output ports.
    #[must_use]
    pub const fn output_ports(&self) -> &OutputPorts {
        &self.output
    }

    /// Mutably borrows the output ports (observer wiring); only while the
    /// machine is stopped.
    pub const fn output_ports_mut(&mut self) -> &mut OutputPorts {
        &mut self.output
    }

    /// Reads the accumulator D.
    #[must_use]
    pub const fn d(&self) -> u8 {
        self.regs.d()
    }

    /// Reads the data flag DF.
    #[must_use]
    pub const fn df(&self) -> bool {
        self.regs.df()
    }

    /// Reads the scratch register T.
    #[must_use]
    pub const fn t(&self) -> u8 {
        self.regs.t()
    }

    /// Reads the program-counter selector P.
    #[must_use]
    pub const fn p(&self) -> u8 {
        self.regs.p()
    }

    /// Reads the data-pointer selector X.
    #[must_use]
    pub const fn x(&self) -> u8 {
        self.regs.x()
    }

    /// Reads the interrupt-enable flag IE.
    #[must_use]
    pub const fn ie(&self) -> bool {
        self.regs.ie()
    }

    /// Reads general register `index` (low four bits used).
    #[must_use]
    pub const fn r(&self, index: u8) -> u16 {
        self.regs.r(index)
    }

    /// Reads the machine-cycle counter.
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Borrows the register file.
    #[must_use]
    pub const fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    fn execute(&mut self, opcode: Opcode) {
        match opcode {
            Opcode::Idl => self.idle = true,
            Opcode::Ldn(r) => {
                let value = self.memory.get_byte(self.regs.r(r));
                self.regs.set_d(value);
            }
            Opcode::Inc(r) => self.regs.inc_r(r),
            Opcode::Dec(r) => self.regs.dec_r(r),
            Opcode::ShortBranch(condition) => self.short_branch(condition),
            Opcode::Skp => self.advance_pc(1),
            Opcode::Lda(r) => {
                let value = self.memory.get_byte(self.regs.r(r));
                self.regs.set_d(value);
                self.regs.inc_r(r);
            }
            Opcode::Str(r) => self.memory.set_byte(self.regs.r(r), self.regs.d()),
            Opcode::Irx => self.regs.inc_r(self.regs.x()),
            Opcode::Out(port) => self.output_via_rx(port),
            Opcode::Inp(port) => self.input_via_rx(port),
            Opcode::Ret => self.restore_x_p(true),
            Opcode::Dis => self.restore_x_p(false),
            Opcode::Ldxa => {
                let value = self.load_via_rx();
                self.regs.set_d(value);
                self.regs.inc_r(self.regs.x());
            }
            Opcode::Stxd => {
                self.memory.set_byte(self.regs.r(self.regs.x()), self.regs.d());
                self.regs.dec_r(self.regs.x());
            }
            Opcode::Adc => {
                let operand = self.load_via_rx();
                self.add(operand, self.regs.df());
            }
            Opcode::Sdb => {
                let operand = self.load_via_rx();
                self.subtract_d_from(operand, self.regs.df());
            }
            Opcode::Shrc => self.shift_right(self.regs.df()),
            Opcode::Smb => {
                let operand = self.load_via_rx();
                self.subtract_from_d(operand, self.regs.df());
            }
            Opcode::Sav => self.memory.set_byte(self.regs.r(self.regs.x()), self.regs.t()),
            Opcode::Mark => self.mark(),
            Opcode::Req => self.output.set_q(false),
            Opcode::Seq => self.output.set_q(true),
            Opcode::Adci => {
                let operand = self.fetch_immediate();
                self.add(operand, self.regs.df());
            }
            Opcode::Sdbi => {
                let operand = self.fetch_immediate();
                self.subtract_d_from(operand, self.regs.df());
            }
            Opcode::Shlc => self.shift_left(self.regs.df()),
            Opcode::Smbi => {
                let operand = self.fetch_immediate();
                self.subtract_from_d(operand, self.regs.df());
            }
            Opcode::Glo(r) => self.regs.set_d(self.regs.r_low(r)),
            Opcode::Ghi(r) => self.regs.set_d(self.regs.r_high(r)),
            Opcode::Plo(r) => self.regs.set_r_low(r, self.regs.d()),
            Opcode::Phi(r) => self.regs.set_r_high(r, self.regs.d()),
            Opcode::LongBranch(condition) => self.long_branch(condition),
            Opcode::Nop => {}
            Opcode::LongSkip(condition) => {
                if self.condition_met(condition) {
                    self.advance_pc(2);
                }
            }
            Opcode::Sep(r) => self.regs.set_p(r),
            Opcode::Sex(r) => self.regs.set_x(r),
            Opcode::Ldx => {
                let value = self.load_via_rx();
                self.regs.set_d(value);
            }
            Opcode::Or => {
                let operand = self.load_via_rx();
                self.regs.set_d(self.regs.d() | operand);
            }
            Opcode::And => {
                let operand = self.load_via_rx();
                self.regs.set_d(self.regs.d() & operand);
            }
            Opcode::Xor => {
                let operand = self.load_via_rx();
                self.regs.set_d(self.regs.d() ^ operand);
            }
            Opcode::Add => {
                let operand = self.load_via_rx();
                self.add(operand, false);
            }
            Opcode::Sd => {
                let operand = self.load_via_rx();
                self.subtract_d_from(operand, true);
            }
            Opcode::Shr => self.shift_right(false),
            Opcode::Sm => {
                let operand = self.load_via_rx();
                self.subtract_from_d(operand, true);
            }
            Opcode::Ldi => {
                let value = self.fetch_immediate();
                self.regs.set_d(value);
            }
            Opcode::Ori => {
                let operand = self.fetch_immediate();
                self.regs.set_d(self.regs.d() | operand);
            }
            Opcode::Ani => {
                let operand = self.fetch_immediate();
                self.regs.set_d(self.regs.d() & operand);
            }
            Opcode::Xri => {
                let operand = self.fetch_immediate();
                self.regs.set_d(self.regs.d() ^ operand);
            }
            Opcode::Adi => {
                let operand = self.fetch_immediate();
                self.add(operand, false);
            }
            Opcode::Sdi => {
                let operand = self.fetch_immediate();
                self.subtract_d_from(operand, true);
            }
            Opcode::Shl => self.shift_left(false),
            Opcode::Smi => {
                let operand = self.fetch_immediate();
                self.subtract_from_d(operand, true);
            }
        }
    }

    fn condition_met(&self, condition: Condition) -> bool {
        match condition {
            Condition::Always => true,
            Condition::Q => self.output.is_q_on(),
            Condition::NotQ => !self.output.is_q_on(),
            Condition::Zero => self.regs.d() == 0,
            Condition::NotZero => self.regs.d() != 0,
            Condition::Df => self.regs.df(),
            Condition::NotDf => !self.regs.df(),
            Condition::Ef(flag) => self.control.external_flag(usize::from(flag)),
            Condition::NotEf(flag) => !self.control.external_flag(usize::from(flag)),
            Condition::InterruptsEnabled => self.regs.ie(),
        }
    }

    /// Reads the memory byte addressed through R(X).
    fn load_via_rx(&self) -> u8 {
        self.memory.get_byte(self.regs.r(self.regs.x()))
    }

    /// Reads the instruction's trailing operand byte and advances R(P)
    /// past it.
    fn fetch_immediate(&mut self) -> u8 {
        let p = self.regs.p();
        let addr = self.regs.r(p);
        let value = self.memory.get_byte(addr);
        self.regs.set_r(p, addr.wrapping_add(1));
        value
    }

    fn advance_pc(&mut self, bytes: u16) {
        let p = self.regs.p();
        self.regs.set_r(p, self.regs.r(p).wrapping_add(bytes));
    }

    /// Taken short branches load the fetched operand byte as the entire
    /// new R(P); fall-through advances past the operand instead.
    fn short_branch(&mut self, condition: Condition) {
        if self.condition_met(condition) {
            let target = self.memory.get_byte(self.regs.r(self.regs.p()));
            self.regs.set_r(self.regs.p(), u16::from(target));
        } else {
            self.advance_pc(1);
        }
    }

    /// Long branch targets are absolute 16-bit addresses, high byte first.
    fn long_branch(&mut self, condition: Condition) {
        if self.condition_met(condition) {
            let p = self.regs.p();
            let addr = self.regs.r(p);
            let high = self.memory.get_byte(addr);
            let low = self.memory.get_byte(addr.wrapping_add(1));
            self.regs.set_r(p, u16::from_be_bytes([high, low]));
        } else {
            self.advance_pc(2);
        }
    }

    /// `D + operand + carry_in`; DF receives the carry out of bit 7.
    fn add(&mut self, operand: u8, carry_in: bool) {
        let sum = u16::from(self.regs.d()) + u16::from(operand) + u16::from(carry_in);
        self.regs.set_d((sum & 0x00FF) as u8);
        self.regs.set_df(sum > 0x00FF);
    }

    /// `operand - D` as `(~D) + operand + carry_in`; DF=1 afterwards means
    /// no borrow occurred. The non-borrow forms pass `carry_in = true`
    /// (the plus-one of two's complement), the borrow forms pass DF.
    fn subtract_d_from(&mut self, operand: u8, carry_in: bool) {
        let sum = u16::from(!self.regs.d()) + u16::from(operand) + u16::from(carry_in);
        self.regs.set_d((sum & 0x00FF) as u8);
        self.regs.set_df(sum > 0x00FF);
    }

    /// `D - operand` as `D + (~operand) + carry_in`; DF=1 afterwards means
    /// no borrow occurred.
    fn subtract_from_d(&mut self, operand: u8, carry_in: bool) {
        let sum = u16::from(self.regs.d()) + u16::from(!operand) + u16::from(carry_in);
        self.regs.set_d((sum & 0x00FF) as u8);
        self.regs.set_df(sum > 0x00FF);
    }

    /// Left shift; bit 7 moves into DF and `carry_in` fills bit 0.
    fn shift_left(&mut self, carry_in: bool) {
        let value = (u16::from(self.regs.d()) << 1) | u16::from(carry_in);
        self.regs.set_df(value & 0x0100 != 0);
        self.regs.set_d((value & 0x00FF) as u8);
    }

    /// Right shift; bit 0 moves into DF and `carry_in` fills bit 7.
    fn shift_right(&mut self, carry_in: bool) {
        let d = self.regs.d();
        self.regs.set_df(d & 0x01 != 0);
        let mut value = d >> 1;
        if carry_in {
            value |= 0x80;
        }
        self.regs.set_d(value);
    }

    /// RET/DIS: read the byte at R(X), advance R(X), split it into new X
    /// (high nibble) and P (low nibble), and set IE.
    fn restore_x_p(&mut self, enable_interrupts: bool) {
        let value = self.load_via_rx();
        self.regs.inc_r(self.regs.x());
        self.regs.set_p(value & 0x0F);
        self.regs.set_x(value >> 4);
        self.regs.set_ie(enable_interrupts);
    }

    /// MARK: pack X and P into T, store T at R2, decrement R2, copy P
    /// into X.
    fn mark(&mut self) {
        let packed = (self.regs.x() << 4) | self.regs.p();
        self.regs.set_t(packed);
        self.memory.set_byte(self.regs.r(2), packed);
        self.regs.dec_r(2);
        self.regs.set_x(self.regs.p());
    }

    /// OUT: write the byte at R(X) to the port, then advance R(X).
    fn output_via_rx(&mut self, port: u8) {
        let value = self.load_via_rx();
        self.output.set_port(usize::from(port), value);
        self.regs.inc_r(self.regs.x());
    }

    /// INP: read the port into both the byte at R(X) and D; no advance.
    fn input_via_rx(&mut self, port: u8) {
        let value = self.input.get_port(usize::from(port));
        self.memory.set_byte(self.regs.r(self.regs.x()), value);
        self.regs.set_d(value);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Cpu;
    use crate::memory::Memory;
    use crate::ports::{InputPorts, OutputPorts};

    fn machine_with(program: &[u8]) -> Cpu {
        let mut memory = Memory::default();
        memory.load(0, program);
        Cpu::new(memory, Arc::new(InputPorts::new()), OutputPorts::new())
    }

    #[test]
    fn step_advances_the_selected_program_counter() {
        let mut cpu = machine_with(&[0xC4]);
        cpu.step().expect("NOP decodes");
        assert_eq!(cpu.r(0), 1);
        assert_eq!(cpu.cycles(), 3);
    }

    #[test]
    fn step_surfaces_the_decode_fault_for_the_undefined_byte() {
        let mut cpu = machine_with(&[0x68]);
        let fault = cpu.step().expect_err("0x68 has no handler");
        assert_eq!(fault.opcode(), 0x68);
        // R(P) already advanced past the fetched byte.
        assert_eq!(cpu.r(0), 1);
        assert_eq!(cpu.cycles(), 0);
    }

    #[test]
    fn subtraction_families_complement_the_documented_operand() {
        // SMI: D - immediate. 0x5A - 0xE2 borrows, so DF clears.
        let mut cpu = machine_with(&[0xF8, 0x5A, 0xFF, 0xE2, 0x00]);
        cpu.run().expect("defined opcodes only");
        assert_eq!(cpu.d(), 0x78);
        assert!(!cpu.df());

        // SDI: immediate - D. 0xE2 - 0x5A leaves no borrow, DF set.
        let mut cpu = machine_with(&[0xF8, 0x5A, 0xFD, 0xE2, 0x00]);
        cpu.run().expect("defined opcodes only");
        assert_eq!(cpu.d(), 0x88);
        assert!(cpu.df());
    }

    #[test]
    fn borrow_forms_consume_df_instead_of_the_plus_one() {
        // SHL of 0x0F leaves DF=0, then SMBI 0x5A with D=0x5A yields
        // 0xFF with a borrow (DF=0 means the chain owed one).
        let mut cpu = machine_with(&[0xF8, 0x0F, 0xFE, 0xF8, 0x5A, 0x7F, 0x5A, 0x00]);
        cpu.run().expect("defined opcodes only");
        assert_eq!(cpu.d(), 0xFF);
        assert!(!cpu.df());
    }

    #[test]
    fn shifts_capture_the_vacated_bit_in_df() {
        let mut cpu = machine_with(&[0xF8, 0xA5, 0xFE, 0x00]);
        cpu.run().expect("defined opcodes only");
        assert_eq!(cpu.d(), 0x4A);
        assert!(cpu.df());

        let mut cpu = machine_with(&[0xF8, 0xA5, 0xF6, 0x00]);
        cpu.run().expect("defined opcodes only");
        assert_eq!(cpu.d(), 0x52);
        assert!(cpu.df());
    }

    #[test]
    fn short_branch_falls_through_past_its_operand() {
        // BQ with Q off must not read the operand as code.
        let mut cpu = machine_with(&[0x31, 0x7B, 0x00]);
        cpu.run().expect("defined opcodes only");
        assert!(!cpu.output_ports().is_q_on());
        assert!(cpu.is_idle());
        assert_eq!(cpu.cycles(), 4);
    }

    #[test]
    fn sep_and_sex_repoint_the_selectors() {
        let mut cpu = machine_with(&[0xE7, 0x00]);
        cpu.run().expect("defined opcodes only");
        assert_eq!(cpu.x(), 0x7);
        assert_eq!(cpu.p(), 0x0);
    }
}
