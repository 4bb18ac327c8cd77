//! Instruction dispatch over the pre-decoded parallel streams.
//!
//! A program counter walks the opcode stream while an immediate pointer
//! walks the immediate buffer; every opcode advances both by fixed
//! widths. Wasm-to-wasm calls push frames onto an explicit stack; host
//! functions are invoked through their callable and may re-enter the
//! engine via [`execute`]. Traps are `Err` values threaded through every
//! call site and unwind the whole frame stack.

use std::rc::Rc;
use std::sync::Arc;

use crate::error::Trap;
use crate::model::{Code, FuncIdx, Instr, Module, Value};
use crate::runtime::Instance;

use super::stack::ValueStack;

/// Hard cap on nested wasm frames within one execution.
pub const CALL_DEPTH_LIMIT: usize = 1024;

/// One wasm call frame.
struct Frame {
    func_idx: FuncIdx,
    /// Index into the opcode stream.
    pc: usize,
    /// Byte offset into the immediate buffer.
    imm: usize,
    /// Arguments followed by zero-initialized declared locals.
    locals: Vec<Value>,
}

/// Execute the function at `func_idx` (imports first, then defined
/// functions) with the given arguments.
///
/// `Ok(Some(v))` / `Ok(None)` mirror the callee's result arity;
/// `Err(trap)` reports a fault with an empty result vector.
pub fn execute(
    instance: &mut Instance,
    func_idx: FuncIdx,
    args: &[Value],
) -> Result<Option<Value>, Trap> {
    let module = Arc::clone(&instance.module);

    let imported = instance.imported_functions.len() as u32;
    if func_idx < imported {
        return call_host(instance, func_idx, args);
    }

    let mut stack = ValueStack::new();
    let mut frames = vec![new_frame(&module, func_idx, args.to_vec())?];

    loop {
        let frame = frames
            .last_mut()
            .ok_or(Trap::Internal("empty frame stack"))?;
        let code = module
            .code(frame.func_idx)
            .ok_or(Trap::Internal("missing code body"))?;
        let instr = *code
            .instructions
            .get(frame.pc)
            .ok_or(Trap::Internal("instruction stream exhausted"))?;
        frame.pc += 1;

        match instr {
            Instr::Unreachable => return Err(Trap::Unreachable),
            Instr::Nop => {}

            Instr::End => {
                let ty = module
                    .function_type(frame.func_idx)
                    .ok_or(Trap::Internal("function type not found"))?;
                let ret = if ty.results.is_empty() {
                    None
                } else {
                    Some(stack.pop()?)
                };
                frames.pop();
                if frames.is_empty() {
                    return Ok(ret);
                }
                if let Some(v) = ret {
                    stack.push(v)?;
                }
            }

            Instr::Drop => {
                stack.pop()?;
            }
            Instr::Select => {
                let cond = stack.pop()? as u32;
                let v2 = stack.pop()?;
                let v1 = stack.pop()?;
                stack.push(if cond != 0 { v1 } else { v2 })?;
            }

            Instr::Call => {
                let callee = imm_u32(code, &mut frame.imm)?;
                let arity = module
                    .function_type(callee)
                    .ok_or(Trap::Internal("call target out of range"))?
                    .params
                    .len();
                let mut args = vec![0; arity];
                for slot in args.iter_mut().rev() {
                    *slot = stack.pop()?;
                }
                if callee < imported {
                    if let Some(v) = call_host(instance, callee, &args)? {
                        stack.push(v)?;
                    }
                } else {
                    if frames.len() >= CALL_DEPTH_LIMIT {
                        return Err(Trap::CallStackExhausted);
                    }
                    frames.push(new_frame(&module, callee, args)?);
                }
            }

            Instr::LocalGet => {
                let idx = imm_u32(code, &mut frame.imm)? as usize;
                let v = *frame
                    .locals
                    .get(idx)
                    .ok_or(Trap::Internal("local index out of range"))?;
                stack.push(v)?;
            }
            Instr::LocalSet => {
                let idx = imm_u32(code, &mut frame.imm)? as usize;
                let v = stack.pop()?;
                *frame
                    .locals
                    .get_mut(idx)
                    .ok_or(Trap::Internal("local index out of range"))? = v;
            }
            Instr::LocalTee => {
                let idx = imm_u32(code, &mut frame.imm)? as usize;
                let v = stack.pop()?;
                *frame
                    .locals
                    .get_mut(idx)
                    .ok_or(Trap::Internal("local index out of range"))? = v;
                stack.push(v)?;
            }

            Instr::GlobalGet => {
                let idx = imm_u32(code, &mut frame.imm)? as usize;
                let v = instance
                    .globals
                    .get(idx)
                    .ok_or(Trap::Internal("global index out of range"))?
                    .get();
                stack.push(v)?;
            }
            Instr::GlobalSet => {
                let idx = imm_u32(code, &mut frame.imm)? as usize;
                let v = stack.pop()?;
                instance
                    .globals
                    .get_mut(idx)
                    .ok_or(Trap::Internal("global index out of range"))?
                    .set(v)?;
            }

            Instr::I32Const => {
                let v = imm_u32(code, &mut frame.imm)?;
                stack.push(u64::from(v))?;
            }
            Instr::I64Const => {
                let v = imm_u64(code, &mut frame.imm)?;
                stack.push(v)?;
            }

            /* ----- memory access ----- */
            Instr::I32Load => {
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                let v = mem_access(instance.memory.load_u32(ea))?;
                stack.push(u64::from(v))?;
            }
            Instr::I64Load => {
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                let v = mem_access(instance.memory.load_u64(ea))?;
                stack.push(v)?;
            }
            Instr::I32Load8S => {
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                let v = mem_access(instance.memory.load_u8(ea))?;
                stack.push(u64::from(i32::from(v as i8) as u32))?;
            }
            Instr::I32Load8U => {
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                let v = mem_access(instance.memory.load_u8(ea))?;
                stack.push(u64::from(v))?;
            }
            Instr::I32Load16S => {
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                let v = mem_access(instance.memory.load_u16(ea))?;
                stack.push(u64::from(i32::from(v as i16) as u32))?;
            }
            Instr::I32Load16U => {
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                let v = mem_access(instance.memory.load_u16(ea))?;
                stack.push(u64::from(v))?;
            }
            Instr::I64Load8S => {
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                let v = mem_access(instance.memory.load_u8(ea))?;
                stack.push(i64::from(v as i8) as u64)?;
            }
            Instr::I64Load8U => {
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                let v = mem_access(instance.memory.load_u8(ea))?;
                stack.push(u64::from(v))?;
            }
            Instr::I64Load16S => {
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                let v = mem_access(instance.memory.load_u16(ea))?;
                stack.push(i64::from(v as i16) as u64)?;
            }
            Instr::I64Load16U => {
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                let v = mem_access(instance.memory.load_u16(ea))?;
                stack.push(u64::from(v))?;
            }
            Instr::I64Load32S => {
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                let v = mem_access(instance.memory.load_u32(ea))?;
                stack.push(i64::from(v as i32) as u64)?;
            }
            Instr::I64Load32U => {
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                let v = mem_access(instance.memory.load_u32(ea))?;
                stack.push(u64::from(v))?;
            }

            Instr::I32Store => {
                let v = stack.pop()? as u32;
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                mem_access(instance.memory.store_u32(ea, v))?;
            }
            Instr::I64Store => {
                let v = stack.pop()?;
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                mem_access(instance.memory.store_u64(ea, v))?;
            }
            Instr::I32Store8 => {
                let v = stack.pop()? as u8;
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                mem_access(instance.memory.store_u8(ea, v))?;
            }
            Instr::I32Store16 => {
                let v = stack.pop()? as u16;
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                mem_access(instance.memory.store_u16(ea, v))?;
            }
            Instr::I64Store8 => {
                let v = stack.pop()? as u8;
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                mem_access(instance.memory.store_u8(ea, v))?;
            }
            Instr::I64Store16 => {
                let v = stack.pop()? as u16;
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                mem_access(instance.memory.store_u16(ea, v))?;
            }
            Instr::I64Store32 => {
                let v = stack.pop()? as u32;
                let ea = effective_addr(&mut stack, code, &mut frame.imm)?;
                mem_access(instance.memory.store_u32(ea, v))?;
            }

            Instr::MemorySize => {
                stack.push(u64::from(instance.memory.size_pages()))?;
            }
            Instr::MemoryGrow => {
                let delta = stack.pop()? as u32;
                let result = match instance.memory.grow(delta) {
                    Some(prev) => u64::from(prev),
                    None => u64::from(u32::MAX),
                };
                stack.push(result)?;
            }

            /* ----- i32 tests, comparisons, arithmetic ----- */
            Instr::I32Eqz => unop32(&mut stack, |v| u32::from(v == 0))?,
            Instr::I32Eq => cmpop32(&mut stack, |a, b| a == b)?,
            Instr::I32Ne => cmpop32(&mut stack, |a, b| a != b)?,
            Instr::I32LtS => cmpop32(&mut stack, |a, b| (a as i32) < (b as i32))?,
            Instr::I32LtU => cmpop32(&mut stack, |a, b| a < b)?,
            Instr::I32GtS => cmpop32(&mut stack, |a, b| (a as i32) > (b as i32))?,
            Instr::I32GtU => cmpop32(&mut stack, |a, b| a > b)?,
            Instr::I32LeS => cmpop32(&mut stack, |a, b| (a as i32) <= (b as i32))?,
            Instr::I32LeU => cmpop32(&mut stack, |a, b| a <= b)?,
            Instr::I32GeS => cmpop32(&mut stack, |a, b| (a as i32) >= (b as i32))?,
            Instr::I32GeU => cmpop32(&mut stack, |a, b| a >= b)?,

            Instr::I32Clz => unop32(&mut stack, u32::leading_zeros)?,
            Instr::I32Ctz => unop32(&mut stack, u32::trailing_zeros)?,
            Instr::I32Popcnt => unop32(&mut stack, u32::count_ones)?,
            Instr::I32Add => binop32(&mut stack, u32::wrapping_add)?,
            Instr::I32Sub => binop32(&mut stack, u32::wrapping_sub)?,
            Instr::I32Mul => binop32(&mut stack, u32::wrapping_mul)?,
            Instr::I32DivS => binop32_try(&mut stack, |a, b| {
                let (a, b) = (a as i32, b as i32);
                if b == 0 {
                    Err(Trap::DivisionByZero)
                } else if a == i32::MIN && b == -1 {
                    Err(Trap::IntegerOverflow)
                } else {
                    Ok((a / b) as u32)
                }
            })?,
            Instr::I32DivU => binop32_try(&mut stack, |a, b| {
                if b == 0 {
                    Err(Trap::DivisionByZero)
                } else {
                    Ok(a / b)
                }
            })?,
            Instr::I32RemS => binop32_try(&mut stack, |a, b| {
                if b == 0 {
                    Err(Trap::DivisionByZero)
                } else {
                    // MIN % -1 wraps to 0 rather than trapping.
                    Ok((a as i32).wrapping_rem(b as i32) as u32)
                }
            })?,
            Instr::I32RemU => binop32_try(&mut stack, |a, b| {
                if b == 0 {
                    Err(Trap::DivisionByZero)
                } else {
                    Ok(a % b)
                }
            })?,
            Instr::I32And => binop32(&mut stack, |a, b| a & b)?,
            Instr::I32Or => binop32(&mut stack, |a, b| a | b)?,
            Instr::I32Xor => binop32(&mut stack, |a, b| a ^ b)?,
            Instr::I32Shl => binop32(&mut stack, u32::wrapping_shl)?,
            Instr::I32ShrS => binop32(&mut stack, |a, b| (a as i32).wrapping_shr(b) as u32)?,
            Instr::I32ShrU => binop32(&mut stack, u32::wrapping_shr)?,
            Instr::I32Rotl => binop32(&mut stack, u32::rotate_left)?,
            Instr::I32Rotr => binop32(&mut stack, u32::rotate_right)?,

            /* ----- i64 tests, comparisons, arithmetic ----- */
            Instr::I64Eqz => {
                let v = stack.pop()?;
                stack.push(u64::from(v == 0))?;
            }
            Instr::I64Eq => cmpop64(&mut stack, |a, b| a == b)?,
            Instr::I64Ne => cmpop64(&mut stack, |a, b| a != b)?,
            Instr::I64LtS => cmpop64(&mut stack, |a, b| (a as i64) < (b as i64))?,
            Instr::I64LtU => cmpop64(&mut stack, |a, b| a < b)?,
            Instr::I64GtS => cmpop64(&mut stack, |a, b| (a as i64) > (b as i64))?,
            Instr::I64GtU => cmpop64(&mut stack, |a, b| a > b)?,
            Instr::I64LeS => cmpop64(&mut stack, |a, b| (a as i64) <= (b as i64))?,
            Instr::I64LeU => cmpop64(&mut stack, |a, b| a <= b)?,
            Instr::I64GeS => cmpop64(&mut stack, |a, b| (a as i64) >= (b as i64))?,
            Instr::I64GeU => cmpop64(&mut stack, |a, b| a >= b)?,

            Instr::I64Clz => unop64(&mut stack, |v| u64::from(v.leading_zeros()))?,
            Instr::I64Ctz => unop64(&mut stack, |v| u64::from(v.trailing_zeros()))?,
            Instr::I64Popcnt => unop64(&mut stack, |v| u64::from(v.count_ones()))?,
            Instr::I64Add => binop64(&mut stack, u64::wrapping_add)?,
            Instr::I64Sub => binop64(&mut stack, u64::wrapping_sub)?,
            Instr::I64Mul => binop64(&mut stack, u64::wrapping_mul)?,
            Instr::I64DivS => binop64_try(&mut stack, |a, b| {
                let (a, b) = (a as i64, b as i64);
                if b == 0 {
                    Err(Trap::DivisionByZero)
                } else if a == i64::MIN && b == -1 {
                    Err(Trap::IntegerOverflow)
                } else {
                    Ok((a / b) as u64)
                }
            })?,
            Instr::I64DivU => binop64_try(&mut stack, |a, b| {
                if b == 0 {
                    Err(Trap::DivisionByZero)
                } else {
                    Ok(a / b)
                }
            })?,
            Instr::I64RemS => binop64_try(&mut stack, |a, b| {
                if b == 0 {
                    Err(Trap::DivisionByZero)
                } else {
                    Ok((a as i64).wrapping_rem(b as i64) as u64)
                }
            })?,
            Instr::I64RemU => binop64_try(&mut stack, |a, b| {
                if b == 0 {
                    Err(Trap::DivisionByZero)
                } else {
                    Ok(a % b)
                }
            })?,
            Instr::I64And => binop64(&mut stack, |a, b| a & b)?,
            Instr::I64Or => binop64(&mut stack, |a, b| a | b)?,
            Instr::I64Xor => binop64(&mut stack, |a, b| a ^ b)?,
            Instr::I64Shl => binop64(&mut stack, |a, b| a.wrapping_shl(b as u32))?,
            Instr::I64ShrS => {
                binop64(&mut stack, |a, b| (a as i64).wrapping_shr(b as u32) as u64)?
            }
            Instr::I64ShrU => binop64(&mut stack, |a, b| a.wrapping_shr(b as u32))?,
            Instr::I64Rotl => binop64(&mut stack, |a, b| a.rotate_left(b as u32))?,
            Instr::I64Rotr => binop64(&mut stack, |a, b| a.rotate_right(b as u32))?,

            /* ----- conversions ----- */
            Instr::I32WrapI64 => unop64(&mut stack, |v| u64::from(v as u32))?,
            Instr::I64ExtendI32S => unop64(&mut stack, |v| i64::from(v as u32 as i32) as u64)?,
            Instr::I64ExtendI32U => unop64(&mut stack, |v| u64::from(v as u32))?,
        }
    }
}

/// Build a frame for a defined function: arguments fill the first slots,
/// declared locals are zero-initialized.
fn new_frame(module: &Module, func_idx: FuncIdx, mut locals: Vec<Value>) -> Result<Frame, Trap> {
    let ty = module
        .function_type(func_idx)
        .ok_or(Trap::Internal("function index out of range"))?;
    if locals.len() != ty.params.len() {
        return Err(Trap::Internal("argument count mismatch"));
    }
    let code = module
        .code(func_idx)
        .ok_or(Trap::Internal("missing code body"))?;
    locals.resize(locals.len() + code.local_count as usize, 0);
    Ok(Frame {
        func_idx,
        pc: 0,
        imm: 0,
        locals,
    })
}

fn call_host(
    instance: &mut Instance,
    func_idx: FuncIdx,
    args: &[Value],
) -> Result<Option<Value>, Trap> {
    let f = Rc::clone(
        instance
            .imported_functions
            .get(func_idx as usize)
            .ok_or(Trap::Internal("imported function index out of range"))?,
    );
    f(instance, args)
}

/* ----- immediate readers ----- */

#[inline]
fn imm_u32(code: &Code, imm: &mut usize) -> Result<u32, Trap> {
    let bytes = code
        .immediates
        .get(*imm..*imm + 4)
        .ok_or(Trap::Internal("immediate stream exhausted"))?;
    *imm += 4;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
fn imm_u64(code: &Code, imm: &mut usize) -> Result<u64, Trap> {
    let bytes = code
        .immediates
        .get(*imm..*imm + 8)
        .ok_or(Trap::Internal("immediate stream exhausted"))?;
    *imm += 8;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(raw))
}

/// Effective address of a memory access: popped i32 address,
/// zero-extended, plus the pre-decoded offset. 64-bit so it cannot wrap
/// before the bounds check.
#[inline]
fn effective_addr(stack: &mut ValueStack, code: &Code, imm: &mut usize) -> Result<u64, Trap> {
    let offset = imm_u32(code, imm)?;
    let addr = stack.pop()? as u32;
    Ok(u64::from(addr) + u64::from(offset))
}

#[inline]
fn mem_access<T>(r: Result<T, ()>) -> Result<T, Trap> {
    r.map_err(|_| Trap::MemoryAccessOutOfBounds)
}

/* ----- operator helpers; i32 forms read low 32 bits and zero-extend ----- */

fn unop32(stack: &mut ValueStack, f: impl Fn(u32) -> u32) -> Result<(), Trap> {
    let v = stack.pop()? as u32;
    stack.push(u64::from(f(v)))
}

fn unop64(stack: &mut ValueStack, f: impl Fn(u64) -> u64) -> Result<(), Trap> {
    let v = stack.pop()?;
    stack.push(f(v))
}

fn binop32(stack: &mut ValueStack, f: impl Fn(u32, u32) -> u32) -> Result<(), Trap> {
    let rhs = stack.pop()? as u32;
    let lhs = stack.pop()? as u32;
    stack.push(u64::from(f(lhs, rhs)))
}

fn binop64(stack: &mut ValueStack, f: impl Fn(u64, u64) -> u64) -> Result<(), Trap> {
    let rhs = stack.pop()?;
    let lhs = stack.pop()?;
    stack.push(f(lhs, rhs))
}

fn binop32_try(
    stack: &mut ValueStack,
    f: impl Fn(u32, u32) -> Result<u32, Trap>,
) -> Result<(), Trap> {
    let rhs = stack.pop()? as u32;
    let lhs = stack.pop()? as u32;
    stack.push(u64::from(f(lhs, rhs)?))
}

fn binop64_try(
    stack: &mut ValueStack,
    f: impl Fn(u64, u64) -> Result<u64, Trap>,
) -> Result<(), Trap> {
    let rhs = stack.pop()?;
    let lhs = stack.pop()?;
    stack.push(f(lhs, rhs)?)
}

fn cmpop32(stack: &mut ValueStack, f: impl Fn(u32, u32) -> bool) -> Result<(), Trap> {
    let rhs = stack.pop()? as u32;
    let lhs = stack.pop()? as u32;
    stack.push(u64::from(f(lhs, rhs)))
}

fn cmpop64(stack: &mut ValueStack, f: impl Fn(u64, u64) -> bool) -> Result<(), Trap> {
    let rhs = stack.pop()?;
    let lhs = stack.pop()?;
    stack.push(u64::from(f(lhs, rhs)))
}
