// Residual row-condition evaluation.
//
// A compiled condition names a column, its type code, an operator, and the
// argument slots it consumes. Compilation validates operator/type
// compatibility and fixes the matcher lane; evaluation reads the row cell
// under the table seqlock and applies lane-form comparison semantics.
//
// Null semantics: on non-primitive columns an absent cell equals a null
// argument under EQ, compares unequal to everything else, and fails every
// ordering test; BETWEEN with a null bound never matches. On
// primitive-non-null columns IS_NULL is constant-false, NOT_NULL
// constant-true, and a null argument fails to match outright.

use crate::error::{MemrisError, Result};
use crate::table::typed::TypedTable;
use crate::types::{Lane, TypeCode};

use super::args::{decode_arg, ArgValue, DecodedArg};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    In,
    NotIn,
    IgnoreCaseEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
    IsNull,
    NotNull,
    Before,
    After,
}

impl Operator {
    /// Temporal aliases collapse onto their ordering operators.
    fn base(self) -> Operator {
        match self {
            Operator::Before => Operator::Lt,
            Operator::After => Operator::Gt,
            other => other,
        }
    }

    pub fn needs_argument(self) -> bool {
        !matches!(self, Operator::IsNull | Operator::NotNull)
    }

    fn is_ordering(self) -> bool {
        matches!(
            self.base(),
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte | Operator::Between
        )
    }
}

/// Condition shape produced by the query compiler.
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    pub column: usize,
    pub type_code: TypeCode,
    pub op: Operator,
    pub arg_slot: usize,
    pub upper_slot: Option<usize>,
    pub ignore_case: bool,
    pub primitive_non_null: bool,
}

impl CompiledCondition {
    pub fn new(column: usize, type_code: TypeCode, op: Operator, arg_slot: usize) -> Self {
        Self {
            column,
            type_code,
            op,
            arg_slot,
            upper_slot: None,
            ignore_case: false,
            primitive_non_null: false,
        }
    }

    pub fn between(column: usize, type_code: TypeCode, low_slot: usize, high_slot: usize) -> Self {
        Self {
            upper_slot: Some(high_slot),
            ..Self::new(column, type_code, Operator::Between, low_slot)
        }
    }

    pub fn with_ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    pub fn with_primitive_non_null(mut self) -> Self {
        self.primitive_non_null = true;
        self
    }
}

/// A condition compiled down to its matcher lane.
pub struct RowPredicate {
    condition: CompiledCondition,
    lane: Lane,
}

impl RowPredicate {
    pub fn compile(condition: CompiledCondition) -> Result<RowPredicate> {
        let lane = condition.type_code.lane();
        let op = condition.op;

        if op.is_ordering() && lane == Lane::Str {
            return Err(MemrisError::UnsupportedOperation(format!(
                "{op:?} is not applicable to {} columns",
                condition.type_code.name()
            )));
        }
        if matches!(op, Operator::Before | Operator::After) && !condition.type_code.is_temporal() {
            return Err(MemrisError::UnsupportedOperation(format!(
                "{op:?} requires a temporal column, got {}",
                condition.type_code.name()
            )));
        }
        if op == Operator::IgnoreCaseEq && lane != Lane::Str {
            return Err(MemrisError::UnsupportedOperation(format!(
                "IgnoreCaseEq is not applicable to {} columns",
                condition.type_code.name()
            )));
        }
        if op == Operator::Between && condition.upper_slot.is_none() {
            return Err(MemrisError::ArgumentShape(
                "BETWEEN requires two argument slots".to_string(),
            ));
        }
        Ok(RowPredicate { condition, lane })
    }

    pub fn condition(&self) -> &CompiledCondition {
        &self.condition
    }

    /// Evaluate the condition against one row.
    pub fn matches(&self, table: &TypedTable, row: u32, args: &[DecodedArg]) -> Result<bool> {
        let cond = &self.condition;
        match cond.op.base() {
            Operator::IsNull => {
                if cond.primitive_non_null {
                    return Ok(false);
                }
                Ok(!table.is_present(cond.column, row as usize)?)
            }
            Operator::NotNull => {
                if cond.primitive_non_null {
                    return Ok(true);
                }
                table.is_present(cond.column, row as usize)
            }
            _ => match self.lane {
                Lane::Long => self.matches_long(table, row, args),
                Lane::Int => self.matches_int(table, row, args),
                Lane::Str => self.matches_str(table, row, args),
            },
        }
    }

    /// Filter candidate rows through this predicate.
    pub fn filter(&self, table: &TypedTable, rows: &[u32], args: &[DecodedArg]) -> Result<Vec<u32>> {
        let mut out = Vec::with_capacity(rows.len());
        for &row in rows {
            if self.matches(table, row, args)? {
                out.push(row);
            }
        }
        Ok(out)
    }

    fn arg<'a>(&self, args: &'a [DecodedArg], slot: usize) -> Result<&'a DecodedArg> {
        args.get(slot).ok_or_else(|| {
            MemrisError::ArgumentShape(format!("missing argument slot {slot}"))
        })
    }

    fn matches_long(&self, table: &TypedTable, row: u32, args: &[DecodedArg]) -> Result<bool> {
        let cond = &self.condition;
        let (present, value) = table.read_long_cell(cond.column, row as usize)?;
        match cond.op.base() {
            Operator::Eq | Operator::Ne => {
                let target = self.arg(args, cond.arg_slot)?.as_long()?;
                if target.is_none() && cond.primitive_non_null {
                    return Ok(false);
                }
                let eq = match target {
                    None => !present,
                    Some(t) => present && value == t,
                };
                Ok(if cond.op.base() == Operator::Ne { !eq } else { eq })
            }
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                let Some(target) = self.arg(args, cond.arg_slot)?.as_long()? else {
                    return Ok(false);
                };
                if !present {
                    return Ok(false);
                }
                Ok(ordering_holds(cond.op.base(), value.cmp(&target)))
            }
            Operator::Between => {
                let upper_slot = cond.upper_slot.ok_or_else(|| {
                    MemrisError::ArgumentShape("BETWEEN requires two argument slots".to_string())
                })?;
                let low = self.arg(args, cond.arg_slot)?.as_long()?;
                let high = self.arg(args, upper_slot)?.as_long()?;
                let (Some(low), Some(high)) = (low, high) else {
                    return Ok(false);
                };
                Ok(present && value >= low && value <= high)
            }
            Operator::In | Operator::NotIn => {
                let list = self.arg(args, cond.arg_slot)?.as_long_list()?;
                let contained = present && list.contains(&value);
                Ok(if cond.op.base() == Operator::NotIn {
                    !contained
                } else {
                    contained
                })
            }
            op => Err(MemrisError::UnsupportedOperation(format!(
                "{op:?} on a long-lane column"
            ))),
        }
    }

    fn matches_int(&self, table: &TypedTable, row: u32, args: &[DecodedArg]) -> Result<bool> {
        let cond = &self.condition;
        let (present, value) = table.read_int_cell(cond.column, row as usize)?;
        match cond.op.base() {
            Operator::Eq | Operator::Ne => {
                let target = self.arg(args, cond.arg_slot)?.as_int()?;
                if target.is_none() && cond.primitive_non_null {
                    return Ok(false);
                }
                let eq = match target {
                    None => !present,
                    Some(t) => present && value == t,
                };
                Ok(if cond.op.base() == Operator::Ne { !eq } else { eq })
            }
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                let Some(target) = self.arg(args, cond.arg_slot)?.as_int()? else {
                    return Ok(false);
                };
                if !present {
                    return Ok(false);
                }
                Ok(ordering_holds(cond.op.base(), value.cmp(&target)))
            }
            Operator::Between => {
                let upper_slot = cond.upper_slot.ok_or_else(|| {
                    MemrisError::ArgumentShape("BETWEEN requires two argument slots".to_string())
                })?;
                let low = self.arg(args, cond.arg_slot)?.as_int()?;
                let high = self.arg(args, upper_slot)?.as_int()?;
                let (Some(low), Some(high)) = (low, high) else {
                    return Ok(false);
                };
                Ok(present && value >= low && value <= high)
            }
            Operator::In | Operator::NotIn => {
                let list = self.arg(args, cond.arg_slot)?.as_int_list()?;
                let contained = present && list.contains(&value);
                Ok(if cond.op.base() == Operator::NotIn {
                    !contained
                } else {
                    contained
                })
            }
            op => Err(MemrisError::UnsupportedOperation(format!(
                "{op:?} on an int-lane column"
            ))),
        }
    }

    fn matches_str(&self, table: &TypedTable, row: u32, args: &[DecodedArg]) -> Result<bool> {
        let cond = &self.condition;
        let value = table.read_string_cell(cond.column, row as usize)?;
        match cond.op.base() {
            Operator::Eq | Operator::Ne | Operator::IgnoreCaseEq => {
                let target = self.arg(args, cond.arg_slot)?.as_str()?;
                if target.is_none() && cond.primitive_non_null {
                    return Ok(false);
                }
                let fold_case = cond.ignore_case || cond.op.base() == Operator::IgnoreCaseEq;
                let eq = match (value.as_deref(), target) {
                    (None, None) => true,
                    (Some(v), Some(t)) => {
                        if fold_case {
                            v.eq_ignore_ascii_case(t)
                        } else {
                            v == t
                        }
                    }
                    _ => false,
                };
                Ok(if cond.op.base() == Operator::Ne { !eq } else { eq })
            }
            Operator::In | Operator::NotIn => {
                let list = self.arg(args, cond.arg_slot)?.as_str_list()?;
                let contained = value
                    .as_deref()
                    .is_some_and(|v| list.iter().any(|t| t == v));
                Ok(if cond.op.base() == Operator::NotIn {
                    !contained
                } else {
                    contained
                })
            }
            op => Err(MemrisError::UnsupportedOperation(format!(
                "{op:?} on a string-lane column"
            ))),
        }
    }
}

fn ordering_holds(op: Operator, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        Operator::Gt => ordering == Greater,
        Operator::Gte => ordering != Less,
        Operator::Lt => ordering == Less,
        Operator::Lte => ordering != Greater,
        _ => false,
    }
}

/// Decode the argument slots one condition consumes, leaving unrelated
/// slots as nulls.
pub fn decode_condition_args(
    condition: &CompiledCondition,
    raw: &[ArgValue],
) -> Result<Vec<DecodedArg>> {
    let mut decoded = vec![DecodedArg::Null; raw.len()];
    if !condition.op.needs_argument() {
        return Ok(decoded);
    }
    let mut slots = vec![condition.arg_slot];
    if let Some(upper) = condition.upper_slot {
        slots.push(upper);
    }
    for slot in slots {
        let arg = raw.get(slot).ok_or_else(|| {
            MemrisError::ArgumentShape(format!("missing argument slot {slot}"))
        })?;
        decoded[slot] = decode_arg(arg, condition.type_code, condition.column)?;
    }
    Ok(decoded)
}
