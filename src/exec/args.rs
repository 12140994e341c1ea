// Predicate-argument decoding.
//
// User-supplied arguments arrive as a typed variant: a scalar value, a
// typed array, or a heterogeneous list. Decoding normalizes them to the
// column's lane representation exactly once, at query-compile time; row
// evaluation only ever sees lane-typed data. Null elements inside IN lists
// are dropped; a list that decodes empty never matches.

use crate::error::{MemrisError, Result};
use crate::types::{int_lane_value, long_lane_value, str_lane_value, Lane, TypeCode, Value};

/// Raw predicate argument as produced by the query compiler.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Scalar(Value),
    LongArray(Vec<i64>),
    IntArray(Vec<i32>),
    StrArray(Vec<String>),
    List(Vec<Value>),
}

/// Lane-normalized argument.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedArg {
    Null,
    Long(i64),
    Int(i32),
    Str(String),
    LongList(Vec<i64>),
    IntList(Vec<i32>),
    StrList(Vec<String>),
}

impl DecodedArg {
    pub fn is_null(&self) -> bool {
        matches!(self, DecodedArg::Null)
    }

    pub fn as_long(&self) -> Result<Option<i64>> {
        match self {
            DecodedArg::Null => Ok(None),
            DecodedArg::Long(value) => Ok(Some(*value)),
            other => Err(shape_error("long scalar", other)),
        }
    }

    pub fn as_int(&self) -> Result<Option<i32>> {
        match self {
            DecodedArg::Null => Ok(None),
            DecodedArg::Int(value) => Ok(Some(*value)),
            other => Err(shape_error("int scalar", other)),
        }
    }

    pub fn as_str(&self) -> Result<Option<&str>> {
        match self {
            DecodedArg::Null => Ok(None),
            DecodedArg::Str(value) => Ok(Some(value)),
            other => Err(shape_error("string scalar", other)),
        }
    }

    pub fn as_long_list(&self) -> Result<&[i64]> {
        match self {
            DecodedArg::LongList(values) => Ok(values),
            other => Err(shape_error("long list", other)),
        }
    }

    pub fn as_int_list(&self) -> Result<&[i32]> {
        match self {
            DecodedArg::IntList(values) => Ok(values),
            other => Err(shape_error("int list", other)),
        }
    }

    pub fn as_str_list(&self) -> Result<&[String]> {
        match self {
            DecodedArg::StrList(values) => Ok(values),
            other => Err(shape_error("string list", other)),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            DecodedArg::Null => "null",
            DecodedArg::Long(_) => "long scalar",
            DecodedArg::Int(_) => "int scalar",
            DecodedArg::Str(_) => "string scalar",
            DecodedArg::LongList(_) => "long list",
            DecodedArg::IntList(_) => "int list",
            DecodedArg::StrList(_) => "string list",
        }
    }
}

fn shape_error(expected: &str, actual: &DecodedArg) -> MemrisError {
    MemrisError::ArgumentShape(format!(
        "expected {expected} argument, got {}",
        actual.kind_name()
    ))
}

/// Decode one raw argument against a column's type code.
pub fn decode_arg(arg: &ArgValue, type_code: TypeCode, column: usize) -> Result<DecodedArg> {
    match (arg, type_code.lane()) {
        (ArgValue::Scalar(value), Lane::Long) => Ok(long_lane_value(value, type_code, column)?
            .map(DecodedArg::Long)
            .unwrap_or(DecodedArg::Null)),
        (ArgValue::Scalar(value), Lane::Int) => Ok(int_lane_value(value, type_code, column)?
            .map(DecodedArg::Int)
            .unwrap_or(DecodedArg::Null)),
        (ArgValue::Scalar(value), Lane::Str) => Ok(str_lane_value(value, type_code, column)?
            .map(DecodedArg::Str)
            .unwrap_or(DecodedArg::Null)),

        // Typed arrays carry logical values; floating-point columns must
        // go through the List form so the sortable encoding applies.
        (ArgValue::LongArray(values), Lane::Long) if type_code != TypeCode::Double => {
            Ok(DecodedArg::LongList(values.clone()))
        }
        (ArgValue::IntArray(values), Lane::Int) if type_code != TypeCode::Float => {
            Ok(DecodedArg::IntList(values.clone()))
        }
        (ArgValue::StrArray(values), Lane::Str) => Ok(DecodedArg::StrList(values.clone())),

        (ArgValue::List(values), Lane::Long) => {
            let mut out = Vec::with_capacity(values.len());
            for value in values {
                if let Some(lane) = long_lane_value(value, type_code, column)? {
                    out.push(lane);
                }
            }
            Ok(DecodedArg::LongList(out))
        }
        (ArgValue::List(values), Lane::Int) => {
            let mut out = Vec::with_capacity(values.len());
            for value in values {
                if let Some(lane) = int_lane_value(value, type_code, column)? {
                    out.push(lane);
                }
            }
            Ok(DecodedArg::IntList(out))
        }
        (ArgValue::List(values), Lane::Str) => {
            let mut out = Vec::with_capacity(values.len());
            for value in values {
                if let Some(lane) = str_lane_value(value, type_code, column)? {
                    out.push(lane);
                }
            }
            Ok(DecodedArg::StrList(out))
        }

        (arg, lane) => Err(MemrisError::ArgumentShape(format!(
            "argument {} does not fit the {} lane of column {column}",
            arg_kind(arg),
            lane.name()
        ))),
    }
}

fn arg_kind(arg: &ArgValue) -> &'static str {
    match arg {
        ArgValue::Scalar(_) => "scalar",
        ArgValue::LongArray(_) => "long array",
        ArgValue::IntArray(_) => "int array",
        ArgValue::StrArray(_) => "string array",
        ArgValue::List(_) => "list",
    }
}
